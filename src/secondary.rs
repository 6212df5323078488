//! Orthogonal per-entry secondary behaviours (spec §4.C "Secondary
//! behaviours", §7.5: each is isolated so a failure warns instead of
//! aborting the scan). The primary mode decides *which* entries these run
//! against; this module only supplies the mechanics.

use crate::config::{Config, PrimaryMode};
use crate::dirent::{openat_file, utimensat};
use crate::dirent::unlinkat as dirent_unlinkat;
use crate::stats::WorkerStats;
use std::io::Read;
use std::os::unix::io::RawFd;

const READ_CHUNK: usize = 64 * 1024;

/// Read and discard up to `bytes` leading bytes of a regular file, as a
/// load generator (spec §4.C "prefix-read"). Returns bytes actually read.
pub fn prefix_read(dir_fd: RawFd, relative: &[u8], bytes: usize) -> std::io::Result<u64> {
    if bytes == 0 {
        return Ok(0);
    }
    let file = openat_file(dir_fd, relative)?;
    let mut handle = std::fs::File::from(file);
    let mut remaining = bytes;
    let mut total = 0u64;
    let mut buf = [0u8; READ_CHUNK];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = handle.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        total += n as u64;
        remaining -= n;
    }
    Ok(total)
}

/// Compute a CRC32 over a regular file's full contents (spec §4.C "CRC").
/// The checksum algorithm itself is delegated to `crc32fast`; only the
/// read-and-feed loop is this crate's responsibility.
pub fn crc32_file(dir_fd: RawFd, relative: &[u8]) -> std::io::Result<(u32, u64)> {
    let file = openat_file(dir_fd, relative)?;
    let mut handle = std::fs::File::from(file);
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = handle.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize(), total))
}

/// Probe whether this entry carries a POSIX ACL (spec §4.C "ACL-presence").
/// Only presence is reported; POSIX-to-NFSv4 translation is out of scope.
pub fn acl_present(dir_fd: RawFd, relative: &[u8]) -> std::io::Result<bool> {
    crate::dirent::has_posix_acl(dir_fd, relative)
}

/// Outcome of comparing one source entry against its target counterpart
/// (spec §4.C "Compare" primary mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOutcome {
    Match,
    Mismatch,
    TargetMissing,
}

/// Compare a source entry's `(size, mtime)` against the corresponding
/// target entry, resolved relative to `target_dir_fd` (spec §4.C "Compare"
/// grounded in the original's stat-only comparison — content is never
/// read for this mode).
pub fn compare_against_target(
    target_dir_fd: RawFd,
    relative: &[u8],
    source_size: i64,
    source_mtime: i64,
) -> CompareOutcome {
    match crate::dirent::fstatat(target_dir_fd, relative) {
        Ok(stat) => {
            if stat.st_size == source_size && stat.st_mtime == source_mtime {
                CompareOutcome::Match
            } else {
                CompareOutcome::Mismatch
            }
        }
        Err(_) => CompareOutcome::TargetMissing,
    }
}

/// Repair a target entry's timestamps to match the source (spec §4.C
/// "TimeFix" primary mode).
pub fn apply_timefix(
    target_dir_fd: RawFd,
    relative: &[u8],
    atime: (i64, i64),
    mtime: (i64, i64),
) -> std::io::Result<()> {
    utimensat(target_dir_fd, relative, atime, mtime)
}

/// Remove a matched entry (spec §4.C "Delete" primary mode).
pub fn apply_delete(dir_fd: RawFd, relative: &[u8], is_dir: bool) -> std::io::Result<()> {
    dirent_unlinkat(dir_fd, relative, is_dir)
}

/// Run every secondary behaviour enabled in `config` against one regular
/// file, folding results into `stats`. Each behaviour's failure is isolated
/// to that behaviour — the caller decides whether to emit a `ScanWarning`.
///
/// `target_dir_fd` is the directory handle mirroring `dir_fd` on the
/// target side, already opened at the same relative path by the caller
/// (spec §3 "Relative-root selector"); `None` if no target is configured
/// or the mirrored directory could not be opened there. The primary modes
/// that need a target (`Compare`, `TimeFix`) fold a `*_errors` count when
/// it is absent, rather than failing the whole directory scan (spec §7.5:
/// "isolated to the individual entry").
#[allow(clippy::too_many_arguments)]
pub fn run_secondary_for_file(
    config: &Config,
    stats: &mut WorkerStats,
    dir_fd: RawFd,
    target_dir_fd: Option<RawFd>,
    relative: &[u8],
    stat: &libc::stat,
) -> Vec<String> {
    let mut failures = Vec::new();
    let size = stat.st_size as u64;
    let allocated = stat.st_blocks as u64;

    if config.secondary.prefix_read_bytes > 0 {
        match prefix_read(dir_fd, relative, config.secondary.prefix_read_bytes) {
            Ok(n) => stats.prefix_bytes_read += n,
            Err(e) => failures.push(format!("prefix-read: {e}")),
        }
    }

    if config.secondary.crc {
        match crc32_file(dir_fd, relative) {
            Ok((_crc, n)) => stats.crc_bytes_read += n,
            Err(e) => failures.push(format!("crc: {e}")),
        }
    }

    if config.secondary.acl_probe {
        match acl_present(dir_fd, relative) {
            Ok(true) => stats.dirs.acl_present += 1,
            Ok(false) => {}
            Err(e) => failures.push(format!("acl-probe: {e}")),
        }
    }

    if config.secondary.tally {
        stats.tally_file(&config.tally_buckets, size, allocated, config.block_unit);
    }

    match config.primary_mode {
        PrimaryMode::Compare => match target_dir_fd {
            Some(tfd) => match compare_against_target(tfd, relative, stat.st_size, stat.st_mtime) {
                CompareOutcome::Match => stats.compare_matches += 1,
                CompareOutcome::Mismatch => stats.compare_mismatches += 1,
                CompareOutcome::TargetMissing => {
                    stats.compare_errors += 1;
                    failures.push("compare: target entry missing".to_string());
                }
            },
            None => {
                stats.compare_errors += 1;
                failures.push("compare: target directory unavailable".to_string());
            }
        },
        PrimaryMode::TimeFix => match target_dir_fd {
            Some(tfd) => {
                let atime = (stat.st_atime, stat.st_atime_nsec);
                let mtime = (stat.st_mtime, stat.st_mtime_nsec);
                match apply_timefix(tfd, relative, atime, mtime) {
                    Ok(()) => stats.timefix_applied += 1,
                    Err(e) => {
                        stats.timefix_errors += 1;
                        failures.push(format!("timefix: {e}"));
                    }
                }
            }
            None => {
                stats.timefix_errors += 1;
                failures.push("timefix: target directory unavailable".to_string());
            }
        },
        PrimaryMode::Delete => match apply_delete(dir_fd, relative, false) {
            Ok(()) => stats.deletes_applied += 1,
            Err(e) => {
                stats.delete_errors += 1;
                failures.push(format!("delete: {e}"));
            }
        },
        PrimaryMode::List | PrimaryMode::Xml | PrimaryMode::Audit => {}
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::open_root;
    use std::fs;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn prefix_read_stops_at_requested_length() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), vec![b'x'; 1000]).unwrap();
        let root = open_root(tmp.path()).unwrap();
        let n = prefix_read(root.as_raw_fd(), b"f", 100).unwrap();
        assert_eq!(n, 100);
    }

    #[test]
    fn prefix_read_shorter_file_returns_actual_length() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), b"hi").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let n = prefix_read(root.as_raw_fd(), b"f", 4096).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn crc32_matches_known_value_for_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("empty"), b"").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let (crc, n) = crc32_file(root.as_raw_fd(), b"empty").unwrap();
        assert_eq!(n, 0);
        assert_eq!(crc, 0);
    }

    #[test]
    fn crc32_is_consistent_across_two_reads() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), b"hello world").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let (crc1, _) = crc32_file(root.as_raw_fd(), b"f").unwrap();
        let (crc2, _) = crc32_file(root.as_raw_fd(), b"f").unwrap();
        assert_eq!(crc1, crc2);
    }

    #[test]
    fn compare_reports_missing_target() {
        let tmp = tempfile::tempdir().unwrap();
        let root = open_root(tmp.path()).unwrap();
        let outcome = compare_against_target(root.as_raw_fd(), b"nonexistent", 10, 0);
        assert_eq!(outcome, CompareOutcome::TargetMissing);
    }

    #[test]
    fn compare_matches_identical_size_and_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), b"hello").unwrap();
        let root = open_root(tmp.path()).unwrap();
        let stat = crate::dirent::fstatat(root.as_raw_fd(), b"f").unwrap();
        let outcome = compare_against_target(root.as_raw_fd(), b"f", stat.st_size, stat.st_mtime);
        assert_eq!(outcome, CompareOutcome::Match);
    }

    #[test]
    fn apply_delete_removes_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), b"x").unwrap();
        let root = open_root(tmp.path()).unwrap();
        apply_delete(root.as_raw_fd(), b"f", false).unwrap();
        assert!(!tmp.path().join("f").exists());
    }
}
