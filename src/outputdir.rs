//! Output directory creation (spec §4.F): `<outroot>/<progname>-<timestamp>`,
//! retrying on `EEXIST` since two runs started in the same second would
//! otherwise collide.

use crate::error::SetupError;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 32;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Create `<outroot>/<progname>-YYYY-MM-DD_HH_MM_SS`, retrying once per
/// second up to [`MAX_ATTEMPTS`] times if the directory already exists.
pub fn create_output_dir(outroot: &Path, progname: &str) -> Result<PathBuf, SetupError> {
    for attempt in 0..MAX_ATTEMPTS {
        let stamp = Local::now().format("%Y-%m-%d_%H_%M_%S");
        let candidate = outroot.join(format!("{progname}-{stamp}"));
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt + 1 < MAX_ATTEMPTS => {
                sleep(RETRY_DELAY);
            }
            Err(e) => {
                return Err(SetupError::OutputDirUnavailable {
                    path: candidate,
                    source: e,
                })
            }
        }
    }
    Err(SetupError::OutputDirUnavailable {
        path: outroot.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exhausted retry attempts"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_a_timestamped_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        let created = create_output_dir(tmp.path(), "parawalk").unwrap();
        assert!(created.is_dir());
        assert!(created
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("parawalk-"));
    }

    #[test]
    fn parent_missing_surfaces_as_setup_error() {
        let missing = Path::new("/nonexistent-root-for-parawalk-test/sub");
        let err = create_output_dir(missing, "parawalk").unwrap_err();
        assert!(matches!(err, SetupError::OutputDirUnavailable { .. }));
    }
}
