//! Privilege detection and ownership lowering (spec §4.F "Privilege"):
//! when running with an elevated effective uid/gid (e.g. under `sudo`),
//! files this process creates should be owned by the invoking real
//! user/group, not root.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

/// The invoking real identity versus the process's effective identity.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub real_uid: u32,
    pub real_gid: u32,
    pub effective_uid: u32,
    pub effective_gid: u32,
}

impl Identity {
    #[must_use]
    pub fn current() -> Self {
        // SAFETY: these getters take no arguments and cannot fail.
        unsafe {
            Self {
                real_uid: libc::getuid(),
                real_gid: libc::getgid(),
                effective_uid: libc::geteuid(),
                effective_gid: libc::getegid(),
            }
        }
    }

    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.effective_uid != self.real_uid || self.effective_gid != self.real_gid
    }
}

/// Lower a newly-created file's ownership to the invoking real user/group
/// (spec §4.F: only meaningful when [`Identity::is_elevated`] is true).
pub fn lower_ownership(fd: RawFd, identity: &Identity) -> std::io::Result<()> {
    if !identity.is_elevated() {
        return Ok(());
    }
    // SAFETY: fd is a valid, open file descriptor for the caller's lifetime.
    let rc = unsafe { libc::fchown(fd, identity.real_uid, identity.real_gid) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Lower a newly-created path's ownership (file or directory) to the
/// invoking real user/group (spec §4.F), for the handful of call sites
/// (the output directory itself, the primary log, the FIFO backing file)
/// that create the path via a higher-level API rather than already
/// holding a raw fd.
pub fn lower_ownership_path(path: &Path, identity: &Identity) -> std::io::Result<()> {
    if !identity.is_elevated() {
        return Ok(());
    }
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "NUL byte in path"))?;
    // SAFETY: c_path is a valid NUL-terminated C string.
    let rc = unsafe { libc::chown(c_path.as_ptr(), identity.real_uid, identity.real_gid) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprivileged_process_is_not_elevated() {
        let identity = Identity::current();
        assert_eq!(identity.real_uid, identity.effective_uid);
        assert!(!identity.is_elevated());
    }

    #[test]
    fn lower_ownership_is_a_no_op_when_not_elevated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let identity = Identity::current();
        assert!(!identity.is_elevated());
        lower_ownership(std::os::unix::io::AsRawFd::as_raw_fd(tmp.as_file()), &identity).unwrap();
    }

    #[test]
    fn lower_ownership_path_is_a_no_op_when_not_elevated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let identity = Identity::current();
        assert!(!identity.is_elevated());
        lower_ownership_path(tmp.path(), &identity).unwrap();
    }
}
