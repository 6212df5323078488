//! The single configuration value threaded by reference through every
//! component (spec §9 "Global mutable state": "collect all configuration
//! into a single configuration value passed by reference into every
//! component").

use crate::stats::TallyBuckets;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// The mutually-exclusive primary mode for this run (spec §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryMode {
    /// Catalogue entries as a simple listing.
    List,
    /// Catalogue entries for XML output (formatting itself is external).
    Xml,
    /// Compare the source tree against a mirror target tree.
    Compare,
    /// Repair target timestamps to match source.
    TimeFix,
    /// Delete matched entries.
    Delete,
    /// Audit content without mutating anything (CRC/ACL/tally driven).
    Audit,
}

/// Orthogonal secondary modes (spec §1), each independently enable-able.
#[derive(Debug, Clone, Default)]
pub struct SecondaryOptions {
    /// Read this many leading bytes of each regular file, as a load
    /// generator, discarding the data (0 disables).
    pub prefix_read_bytes: usize,
    /// Compute a CRC32 over file contents.
    pub crc: bool,
    /// Probe for POSIX ACL presence.
    pub acl_probe: bool,
    /// Accumulate the size-bucket tally histogram.
    pub tally: bool,
}

/// A selection predicate of shape `(path, stat) -> bool` (spec §9 Open
/// Question, resolved): composition is left to the caller; the core only
/// calls it.
pub type SelectionPredicate = Arc<dyn Fn(&std::path::Path, &libc::stat) -> bool + Send + Sync>;

/// The single configuration value passed by reference into every component.
#[derive(Clone)]
pub struct Config {
    pub source_roots: Vec<PathBuf>,
    pub target_roots: Vec<PathBuf>,
    pub worker_count: NonZeroUsize,
    pub primary_mode: PrimaryMode,
    pub secondary: SecondaryOptions,
    pub cross_filesystem: bool,
    pub skip_names: Vec<String>,
    pub block_unit: u64,
    pub tally_buckets: TallyBuckets,
    pub max_path_len: usize,
    pub redact_paths: bool,
    pub detect_hardlinked_dir_revisits: bool,
    pub progress_interval_secs: u64,
    pub output_root: PathBuf,
    pub select: Option<SelectionPredicate>,
}

impl Config {
    /// True iff the named directory entry should never be pushed to the
    /// FIFO (spec §3 invariant, §4.C.3.f).
    #[must_use]
    pub fn is_skip_name(&self, name: &[u8]) -> bool {
        self.skip_names.iter().any(|skip| skip.as_bytes() == name)
    }

    #[must_use]
    pub fn has_target(&self) -> bool {
        !self.target_roots.is_empty()
    }
}
