//! Component C, the core per-directory scan (spec §4.C): enumerate one
//! directory's children, classify each by `st_mode`, apply skip/cross-fs
//! policy, run secondary behaviours on regular files, emit eligible
//! entries, and report subdirectories for the caller to push onward.
//!
//! This module never touches the FIFO or worker bookkeeping directly —
//! those live in [`crate::fifo`] and are driven by [`crate::worker`]. A
//! single call here scans exactly one directory level, matching the
//! original's per-directory work unit.

use crate::config::Config;
use crate::dirent::{fstat_fd, fstatat, read_dir_entries, FileType};
use crate::error::ScanWarning;
use crate::formatter::{EntryRecord, Formatter};
use crate::redact::redact_path;
use crate::secondary::run_secondary_for_file;
use crate::stats::{DirStats, WorkerStats};
use dashmap::DashSet;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

fn join_relative(parent: &[u8], name: &[u8]) -> Vec<u8> {
    if parent.is_empty() {
        name.to_vec()
    } else {
        let mut joined = Vec::with_capacity(parent.len() + 1 + name.len());
        joined.extend_from_slice(parent);
        joined.push(b'/');
        joined.extend_from_slice(name);
        joined
    }
}

/// Returns the display form of `relative` plus whether a redaction lookup
/// failed along the way (spec §4.C "Redaction": "lookups that fail
/// contribute a zero and a warning").
fn display_path(config: &Config, select_root_fd: RawFd, relative: &[u8], ino: u64) -> (Vec<u8>, bool) {
    if config.redact_paths {
        let (redacted, failed) = redact_path(select_root_fd, relative, ino);
        (redacted.into_bytes(), failed)
    } else {
        (relative.to_vec(), false)
    }
}

/// Scan exactly one directory. `select_root_fd` is the worker's chosen
/// root handle (spec §3 "Relative-root selector"); `relative_dir` is that
/// directory's path relative to the root, empty for the root itself.
/// `root_dev` is the device id of the root, used for the cross-filesystem
/// check (spec §4.C.3.e).
///
/// Returns the relative paths of subdirectories discovered (for the caller
/// to push onto the FIFO) plus any non-fatal warnings observed.
///
/// `visited` is the optional `(dev, ino)` set used to avoid rescanning a
/// directory reached twice through a hard link (spec §9 "Cyclic graphs /
/// hard links", resolved in SPEC_FULL.md §9 as an opt-in `DashSet` shared
/// across all workers). `None` reproduces the source's default behaviour
/// of scanning hard-linked directories twice.
pub fn scan_directory(
    config: &Config,
    select_root_fd: RawFd,
    select_target_root_fd: Option<RawFd>,
    relative_dir: &[u8],
    root_dev: u64,
    formatter: &mut dyn Formatter,
    stats: &mut WorkerStats,
    visited: Option<&DashSet<(u64, u64)>>,
) -> Result<(Vec<Vec<u8>>, Vec<ScanWarning>), ScanWarning> {
    let dir_fd: OwnedFd = if relative_dir.is_empty() {
        // SAFETY: dup() returns a fresh, independently-owned descriptor;
        // the original select_root_fd stays open for the root's lifetime.
        let duped = unsafe { libc::dup(select_root_fd) };
        if duped < 0 {
            return Err(ScanWarning::DirUnopenable {
                path: PathBuf::from("."),
                errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
            });
        }
        // SAFETY: duped is a freshly-dup'd, valid, owned descriptor.
        unsafe { OwnedFd::from_raw_fd(duped) }
    } else {
        crate::dirent::openat_dir(select_root_fd, relative_dir).map_err(|e| ScanWarning::DirUnopenable {
            path: PathBuf::from(String::from_utf8_lossy(relative_dir).into_owned()),
            errno: e.raw_os_error().unwrap_or(0),
        })?
    };

    // Mirror directory on the target side, opened at the same relative path
    // (spec §3 "Relative-root selector"); `None` when no target is
    // configured or the mirrored directory doesn't exist there, in which
    // case per-entry target-dependent behaviours (compare, timefix) count
    // a per-entry error rather than aborting this directory's scan.
    let target_dir_fd: Option<OwnedFd> = select_target_root_fd.and_then(|troot| {
        if relative_dir.is_empty() {
            // SAFETY: dup() returns a fresh, independently-owned descriptor.
            let duped = unsafe { libc::dup(troot) };
            if duped < 0 {
                None
            } else {
                // SAFETY: duped is a freshly-dup'd, valid, owned descriptor.
                Some(unsafe { OwnedFd::from_raw_fd(duped) })
            }
        } else {
            crate::dirent::openat_dir(troot, relative_dir).ok()
        }
    });

    let mut dir_stats = DirStats {
        open_dirs: 1,
        ..DirStats::default()
    };
    let mut warnings = Vec::new();
    let mut subdirs = Vec::new();

    let dir_raw_fd = dir_fd.as_raw_fd();
    let target_dir_raw_fd = target_dir_fd.as_ref().map(AsRawFd::as_raw_fd);
    let entries = match read_dir_entries(dir_fd) {
        Ok(entries) => entries,
        Err(e) => {
            dir_stats.open_errors += 1;
            stats.fold_dir(dir_stats);
            return Err(ScanWarning::DirUnopenable {
                path: PathBuf::from(String::from_utf8_lossy(relative_dir).into_owned()),
                errno: e.raw_os_error().unwrap_or(0),
            });
        }
    };

    for entry in entries {
        let child_relative = join_relative(relative_dir, &entry.name);
        let display = PathBuf::from(String::from_utf8_lossy(&child_relative).into_owned());

        if config.is_skip_name(&entry.name) {
            dir_stats.name_skipped += 1;
            warnings.push(ScanWarning::NameSkipped { path: display });
            continue;
        }
        if child_relative.len() > config.max_path_len {
            dir_stats.warnings += 1;
            warnings.push(ScanWarning::PathTooLong { path: display });
            continue;
        }

        let stat = match fstatat(dir_raw_fd, &entry.name) {
            Ok(stat) => {
                dir_stats.stat_calls += 1;
                stat
            }
            Err(e) => {
                dir_stats.stat_calls += 1;
                dir_stats.stat_errors += 1;
                warnings.push(ScanWarning::StatFailed {
                    path: display,
                    errno: e.raw_os_error().unwrap_or(0),
                });
                continue;
            }
        };

        let file_type = FileType::from_mode(stat.st_mode);

        if file_type == FileType::Directory && !config.cross_filesystem && stat.st_dev as u64 != root_dev {
            dir_stats.cross_fs_skipped += 1;
            warnings.push(ScanWarning::CrossFilesystemSkipped { path: display });
            continue;
        }

        match file_type {
            FileType::Directory => dir_stats.n_dirs += 1,
            FileType::RegularFile => dir_stats.n_files += 1,
            FileType::Symlink => dir_stats.n_symlinks += 1,
            _ => dir_stats.n_other += 1,
        }

        if file_type == FileType::RegularFile {
            dir_stats.bytes_nominal += stat.st_size;
            dir_stats.bytes_allocated += stat.st_blocks * config.block_unit as i64;
            if stat.st_size == 0 {
                dir_stats.zero_byte_files += 1;
            }
        }
        if stat.st_nlink > 1 {
            dir_stats.hardlink_bearing_files += 1;
            dir_stats.extra_hardlinks += (stat.st_nlink - 1) as u64;
        }

        let eligible = config
            .select
            .as_ref()
            .is_none_or(|predicate| predicate(&display, &stat));

        if eligible && file_type == FileType::RegularFile {
            let failures = run_secondary_for_file(config, stats, dir_raw_fd, target_dir_raw_fd, &entry.name, &stat);
            for detail in failures {
                warnings.push(ScanWarning::SecondaryModeFailed {
                    path: display.clone(),
                    detail,
                });
            }
        }

        if eligible {
            let (emit_path, redaction_failed) =
                display_path(config, select_root_fd, &child_relative, stat.st_ino as u64);
            if redaction_failed {
                dir_stats.warnings += 1;
                warnings.push(ScanWarning::RedactionLookupFailed { path: display.clone() });
            }
            let record = EntryRecord {
                path: emit_path,
                file_type,
                size: stat.st_size,
                mtime_secs: stat.st_mtime,
            };
            if let Err(e) = formatter.emit(&record) {
                warnings.push(ScanWarning::SecondaryModeFailed {
                    path: display.clone(),
                    detail: format!("formatter write failed: {e}"),
                });
            }
        }

        if file_type == FileType::Directory {
            let already_visited = visited.is_some_and(|set| {
                !set.insert((stat.st_dev as u64, stat.st_ino as u64))
            });
            if already_visited {
                dir_stats.hardlinked_dir_revisits += 1;
            } else {
                subdirs.push(child_relative);
            }
        }
    }

    stats.fold_dir(dir_stats);
    Ok((subdirs, warnings))
}

/// Fetch a directory's own metadata, used to seed `root_dev` for the first
/// call into [`scan_directory`] (spec §4.C.2).
pub fn root_device(select_root_fd: RawFd) -> std::io::Result<u64> {
    Ok(fstat_fd(select_root_fd)?.st_dev as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrimaryMode, SecondaryOptions};
    use crate::dirent::open_root;
    use crate::formatter::NullFormatter;
    use crate::stats::TallyBuckets;
    use std::fs;
    use std::num::NonZeroUsize;
    use std::path::PathBuf as StdPathBuf;

    fn test_config() -> Config {
        Config {
            source_roots: vec![StdPathBuf::from(".")],
            target_roots: vec![],
            worker_count: NonZeroUsize::new(1).unwrap(),
            primary_mode: PrimaryMode::List,
            secondary: SecondaryOptions::default(),
            cross_filesystem: false,
            skip_names: vec![".snapshot".to_string()],
            block_unit: 512,
            tally_buckets: TallyBuckets::default(),
            max_path_len: 4096,
            redact_paths: false,
            detect_hardlinked_dir_revisits: false,
            progress_interval_secs: 900,
            output_root: StdPathBuf::from("/tmp"),
            select: None,
        }
    }

    #[test]
    fn scan_counts_files_and_directories_and_returns_subdirs() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let root = open_root(tmp.path()).unwrap();
        let root_dev = root_device(root.as_raw_fd()).unwrap();

        let config = test_config();
        let mut stats = WorkerStats::new(&config.tally_buckets);
        let mut formatter = NullFormatter;
        let (subdirs, _warnings) = scan_directory(&config, root.as_raw_fd(), None, b"", root_dev, &mut formatter, &mut stats, None).unwrap();

        assert_eq!(subdirs, vec![b"sub".to_vec()]);
        assert_eq!(stats.dirs.n_files, 1);
        assert_eq!(stats.dirs.n_dirs, 1);
        assert_eq!(stats.dirs.bytes_nominal, 5);
    }

    #[test]
    fn skip_name_prevents_recursion_and_counts_as_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(".snapshot")).unwrap();
        fs::write(tmp.path().join(".snapshot").join("hidden"), b"x").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let root_dev = root_device(root.as_raw_fd()).unwrap();

        let config = test_config();
        let mut stats = WorkerStats::new(&config.tally_buckets);
        let mut formatter = NullFormatter;
        let (subdirs, _warnings) = scan_directory(&config, root.as_raw_fd(), None, b"", root_dev, &mut formatter, &mut stats, None).unwrap();

        assert!(subdirs.is_empty());
        assert_eq!(stats.dirs.name_skipped, 1);
        assert_eq!(stats.dirs.n_dirs, 0);
    }

    #[test]
    fn zero_byte_file_is_counted() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("empty"), b"").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let root_dev = root_device(root.as_raw_fd()).unwrap();

        let config = test_config();
        let mut stats = WorkerStats::new(&config.tally_buckets);
        let mut formatter = NullFormatter;
        let (_subdirs, _warnings) = scan_directory(&config, root.as_raw_fd(), None, b"", root_dev, &mut formatter, &mut stats, None).unwrap();

        assert_eq!(stats.dirs.zero_byte_files, 1);
    }

    #[test]
    fn nested_scan_joins_relative_paths_with_slash() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("f"), b"x").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let root_dev = root_device(root.as_raw_fd()).unwrap();

        let config = test_config();
        let mut stats = WorkerStats::new(&config.tally_buckets);
        let mut formatter = NullFormatter;
        let (_subdirs, _warnings) = scan_directory(&config, root.as_raw_fd(), None, b"", root_dev, &mut formatter, &mut stats, None).unwrap();
        let (sub_subdirs, _sub_warnings) =
            scan_directory(&config, root.as_raw_fd(), None, b"sub", root_dev, &mut formatter, &mut stats, None).unwrap();
        assert!(sub_subdirs.is_empty());
        assert_eq!(stats.dirs.n_files, 1);
    }
}
