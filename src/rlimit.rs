//! `RLIMIT_NOFILE` management (spec §4.F "Resource limits"): compute the
//! file descriptors this run will need and raise the soft limit toward the
//! hard limit, failing fast if the hard limit can't cover it.

use crate::error::SetupError;

/// Fixed descriptors the process itself holds open regardless of worker
/// count (stdio, the primary log, the FIFO's two handles).
const CONSTANT_OVERHEAD: u64 = 8;
/// Descriptors a single worker can hold concurrently: its root dir handle,
/// the directory it's scanning, one open regular file for CRC/prefix-read,
/// and its lazily-created output file.
const PER_WORKER: u64 = 4;

#[must_use]
pub fn required_fd_count(worker_count: usize, root_count: usize) -> u64 {
    CONSTANT_OVERHEAD + PER_WORKER * worker_count as u64 + root_count as u64
}

/// Raise `RLIMIT_NOFILE`'s soft limit to at least `needed`, up to the hard
/// limit. Fails with [`SetupError::RlimitUnavailable`] if the hard limit
/// itself is insufficient.
pub fn ensure_rlimit(needed: u64) -> Result<(), SetupError> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: limit is a valid, writable rlimit struct.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &raw mut limit) };
    if rc != 0 {
        return Err(SetupError::RlimitUnavailable {
            needed,
            hard_limit: 0,
        });
    }

    if limit.rlim_cur >= needed {
        return Ok(());
    }
    if limit.rlim_max != libc::RLIM_INFINITY && limit.rlim_max < needed {
        return Err(SetupError::RlimitUnavailable {
            needed,
            hard_limit: limit.rlim_max,
        });
    }

    let raised = libc::rlimit {
        rlim_cur: needed.min(limit.rlim_max.max(needed)),
        rlim_max: limit.rlim_max,
    };
    // SAFETY: raised is a valid rlimit struct within the permitted range.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &raw const raised) };
    if rc != 0 {
        return Err(SetupError::RlimitUnavailable {
            needed,
            hard_limit: limit.rlim_max,
        });
    }
    Ok(())
}
