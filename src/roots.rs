//! Multi-root resolver (spec §4.B): opens the real, canonical form of each
//! configured root once, verifies cross-root inode equivalence, and exposes
//! the per-side `(root-fd, root-inode)` vectors.

use crate::dirent::{fstat_fd, open_root};
use crate::error::SetupError;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

/// One opened, canonicalized root directory (spec §3 "Root set").
pub struct Root {
    pub canonical: PathBuf,
    pub handle: OwnedFd,
    pub dev: u64,
    pub ino: u64,
}

impl Root {
    pub fn open(path: &Path) -> Result<Self, SetupError> {
        let canonical = std::fs::canonicalize(path).map_err(|source| SetupError::RootUnopenable {
            path: path.to_path_buf(),
            source,
        })?;
        if canonical != path {
            eprintln!(
                "notice: root '{}' canonicalizes to '{}'",
                path.display(),
                canonical.display()
            );
        }
        let handle = open_root(&canonical).map_err(|source| SetupError::RootUnopenable {
            path: canonical.clone(),
            source,
        })?;
        let stat = fstat_fd(handle.as_raw_fd()).map_err(|source| SetupError::RootUnopenable {
            path: canonical.clone(),
            source,
        })?;
        Ok(Self {
            canonical,
            handle,
            dev: stat.st_dev as u64,
            ino: stat.st_ino as u64,
        })
    }

    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// The 1..M equivalent roots on one side (source or target), all required
/// to resolve to the same inode (spec §3 "Root set" invariant).
pub struct RootSet {
    pub side: &'static str,
    pub roots: Vec<Root>,
}

impl RootSet {
    /// Open every path in `paths` and verify they all denote the same
    /// inode (spec §4.B "Equivalence check").
    pub fn open(side: &'static str, paths: &[PathBuf]) -> Result<Self, SetupError> {
        assert!(!paths.is_empty(), "RootSet::open requires at least one path");
        let roots: Vec<Root> = paths
            .iter()
            .map(|p| Root::open(p))
            .collect::<Result<_, _>>()?;
        let first = (roots[0].dev, roots[0].ino);
        if roots.iter().any(|r| (r.dev, r.ino) != first) {
            return Err(SetupError::RootsNotEquivalent { side });
        }
        Ok(Self { side, roots })
    }

    /// Select the root for worker `worker_id` (spec §3 "Relative-root
    /// selector": `w mod M`).
    #[must_use]
    pub fn select(&self, worker_id: usize) -> &Root {
        &self.roots[worker_id % self.roots.len()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    #[must_use]
    pub fn inode(&self) -> (u64, u64) {
        (self.roots[0].dev, self.roots[0].ino)
    }
}

/// Verify that a source and target side, if both present, do not denote
/// the same inode (spec §4.B: "their root inodes must differ").
pub fn verify_source_target_distinct(source: &RootSet, target: Option<&RootSet>) -> Result<(), SetupError> {
    if let Some(target) = target {
        if source.inode() == target.inode() {
            return Err(SetupError::SourceTargetIdentical);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_root_opens_and_selects_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let set = RootSet::open("source", &[tmp.path().to_path_buf()]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.select(0).canonical, set.select(7).canonical);
    }

    #[test]
    fn mismatched_roots_fail_equivalence_check() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let err = RootSet::open("source", &[a.path().to_path_buf(), b.path().to_path_buf()])
            .unwrap_err();
        assert!(matches!(err, SetupError::RootsNotEquivalent { side: "source" }));
    }

    #[test]
    fn worker_selector_distributes_round_robin() {
        let tmp = tempfile::tempdir().unwrap();
        let set = RootSet::open("source", &[tmp.path().to_path_buf()]).unwrap();
        // With a single root, every worker id maps to root 0.
        for w in 0..5 {
            assert_eq!(set.select(w).dev, set.roots[0].dev);
        }
    }

    #[test]
    fn identical_source_and_target_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let source = RootSet::open("source", &[tmp.path().to_path_buf()]).unwrap();
        let target = RootSet::open("target", &[tmp.path().to_path_buf()]).unwrap();
        let err = verify_source_target_distinct(&source, Some(&target)).unwrap_err();
        assert!(matches!(err, SetupError::SourceTargetIdentical));
    }
}
