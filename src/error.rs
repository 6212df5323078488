//! Error kinds used by the core engine (spec §7).
//!
//! Deliberately not `thiserror`-based: the teacher crate hand-writes
//! `Display`/`Error` impls for its error enums (see `glob::Error`), and this
//! crate follows the same convention.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Fatal setup errors (spec §7.1): invalid arguments, unopenable roots,
/// unmet rlimits, inode-equivalence failure, output directory creation
/// failure. Reported once and the process exits non-zero.
#[derive(Debug)]
pub enum SetupError {
    /// A configured root could not be opened or canonicalized.
    RootUnopenable { path: PathBuf, source: io::Error },
    /// Roots on one side do not all resolve to the same inode.
    RootsNotEquivalent { side: &'static str },
    /// Source and target root resolve to the same inode.
    SourceTargetIdentical,
    /// `setrlimit`/`getrlimit` failed or the hard limit is insufficient.
    RlimitUnavailable { needed: u64, hard_limit: u64 },
    /// The output directory could not be created after retrying.
    OutputDirUnavailable { path: PathBuf, source: io::Error },
    /// An argument combination is invalid (e.g. zero workers).
    InvalidArgument(String),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootUnopenable { path, source } => {
                write!(f, "cannot open root '{}': {source}", path.display())
            }
            Self::RootsNotEquivalent { side } => {
                write!(f, "{side} roots do not all resolve to the same inode")
            }
            Self::SourceTargetIdentical => {
                write!(f, "source and target roots resolve to the same inode")
            }
            Self::RlimitUnavailable { needed, hard_limit } => write!(
                f,
                "need {needed} open files but hard rlimit is {hard_limit}"
            ),
            Self::OutputDirUnavailable { path, source } => write!(
                f,
                "cannot create output directory '{}': {source}",
                path.display()
            ),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for SetupError {}

/// Fatal invariant violations (spec §7.2). These indicate the FIFO backing
/// store or the push/pop accounting is corrupted; the process logs a
/// diagnostic and aborts rather than continuing with inconsistent state.
#[derive(Debug)]
pub enum FatalInvariantError {
    /// A FIFO read came back short or failed while depth was non-zero.
    FifoReadFailure { depth: u64, source: io::Error },
    /// A FIFO append failed.
    FifoWriteFailure(io::Error),
    /// `pushes != pops` at program exit.
    PushPopMismatch { pushes: u64, pops: u64 },
    /// A worker reached program end while still `busy`.
    WorkerFinishedBusy { worker_id: usize },
}

impl fmt::Display for FatalInvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FifoReadFailure { depth, source } => {
                write!(f, "FIFO read failure at depth {depth}: {source}")
            }
            Self::FifoWriteFailure(source) => write!(f, "FIFO write failure: {source}"),
            Self::PushPopMismatch { pushes, pops } => {
                write!(f, "push/pop mismatch: {pushes} pushes, {pops} pops")
            }
            Self::WorkerFinishedBusy { worker_id } => {
                write!(f, "worker {worker_id} finished in state busy")
            }
        }
    }
}

impl std::error::Error for FatalInvariantError {}

/// Reasons a directory entry was skipped or a scan step failed without
/// aborting the walk (spec §7.3/§7.4). Each variant corresponds to exactly
/// one of the per-directory / per-worker warning counters.
#[derive(Debug, Clone)]
pub enum ScanWarning {
    /// The directory could not be opened (concurrent removal, permissions).
    DirUnopenable { path: PathBuf, errno: i32 },
    /// `fstatat` on a child entry failed.
    StatFailed { path: PathBuf, errno: i32 },
    /// The entry's name matches a configured skip-name.
    NameSkipped { path: PathBuf },
    /// The entry crosses a filesystem boundary and cross-fs mode is off.
    CrossFilesystemSkipped { path: PathBuf },
    /// The canonical path plus child name would exceed the maximum path length.
    PathTooLong { path: PathBuf },
    /// A redaction lookup for an intermediate path component failed.
    RedactionLookupFailed { path: PathBuf },
    /// A secondary-mode operation (prefix-read, CRC, compare, fix, delete)
    /// failed for one entry; isolated to that entry only.
    SecondaryModeFailed { path: PathBuf, detail: String },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirUnopenable { path, errno } => {
                write!(f, "cannot open directory '{}' (errno {errno})", path.display())
            }
            Self::StatFailed { path, errno } => {
                write!(f, "stat failed for '{}' (errno {errno})", path.display())
            }
            Self::NameSkipped { path } => write!(f, "'{}' matched skip-name policy", path.display()),
            Self::CrossFilesystemSkipped { path } => {
                write!(f, "'{}' crosses a filesystem boundary", path.display())
            }
            Self::PathTooLong { path } => write!(f, "'{}' exceeds the maximum path length", path.display()),
            Self::RedactionLookupFailed { path } => {
                write!(f, "redaction lookup failed for '{}'", path.display())
            }
            Self::SecondaryModeFailed { path, detail } => {
                write!(f, "secondary mode failed for '{}': {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for ScanWarning {}
