//! Path redaction (spec §4.C "Redaction"): replace every path component
//! with the hex form of its inode id, so output need not disclose names.

use crate::dirent::fstatat;
use std::os::unix::io::RawFd;

#[must_use]
fn inode_hex(ino: u64) -> String {
    format!("{ino:x}")
}

/// Build the redacted form of `relative_path` (already joined with `/`),
/// resolving each intermediate component's inode relative to `root_fd`.
/// A failed lookup contributes a literal `0` component and signals the
/// caller should count a warning (spec §4.C "Redaction").
pub fn redact_path(root_fd: RawFd, relative_path: &[u8], leaf_ino: u64) -> (String, bool) {
    let mut components: Vec<&[u8]> = relative_path.split(|&b| b == b'/').collect();
    if components.last().is_some_and(|c| c.is_empty()) {
        components.pop();
    }
    if components.is_empty() {
        return (inode_hex(leaf_ino), false);
    }

    let mut redacted = Vec::with_capacity(components.len());
    let mut had_failure = false;
    let mut prefix = Vec::new();
    for (idx, component) in components.iter().enumerate() {
        if !prefix.is_empty() {
            prefix.push(b'/');
        }
        prefix.extend_from_slice(component);

        if idx + 1 == components.len() {
            redacted.push(inode_hex(leaf_ino));
            continue;
        }
        match fstatat(root_fd, &prefix) {
            Ok(stat) => redacted.push(inode_hex(stat.st_ino as u64)),
            Err(_) => {
                redacted.push("0".to_string());
                had_failure = true;
            }
        }
    }
    (redacted.join("/"), had_failure)
}
