//! Exercises the timestamp-repair secondary behaviour (spec §4.C "TimeFix")
//! against real on-disk mtimes, using `filetime` for the fixture (teacher's
//! dev-dependency, carried over for exactly this kind of precise timestamp
//! fixture rather than trusting `SystemTime` truncation).

use filetime::{set_file_mtime, FileTime};
use parawalk::dirent::{fstatat, open_root};
use parawalk::secondary::apply_timefix;
use std::fs;
use std::os::unix::io::AsRawFd;

#[test]
fn apply_timefix_repairs_target_mtime_to_match_source() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();

    fs::write(source.path().join("f"), b"source contents").unwrap();
    fs::write(target.path().join("f"), b"stale target contents").unwrap();

    // Give the source a distinctive, deliberately-old mtime so the test
    // can't pass by coincidence.
    let stamp = FileTime::from_unix_time(1_000_000_000, 0);
    set_file_mtime(source.path().join("f"), stamp).unwrap();

    let source_root = open_root(source.path()).unwrap();
    let target_root = open_root(target.path()).unwrap();
    let source_stat = fstatat(source_root.as_raw_fd(), b"f").unwrap();

    apply_timefix(
        target_root.as_raw_fd(),
        b"f",
        (source_stat.st_atime, 0),
        (source_stat.st_mtime, 0),
    )
    .unwrap();

    let repaired = FileTime::from_last_modification_time(&fs::metadata(target.path().join("f")).unwrap());
    assert_eq!(repaired.unix_seconds(), 1_000_000_000);
}

#[test]
fn apply_timefix_on_missing_target_entry_surfaces_an_error() {
    let target = tempfile::tempdir().unwrap();
    let target_root = open_root(target.path()).unwrap();
    let err = apply_timefix(target_root.as_raw_fd(), b"missing", (0, 0), (0, 0));
    assert!(err.is_err());
}
