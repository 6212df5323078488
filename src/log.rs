//! Primary run log (spec §4.F "Primary log"): a mutex-serialized writer to
//! `<progname>.log`, auto-timestamping lines more than a second apart and
//! emitting a periodic progress line.

use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

struct Inner {
    file: BufWriter<File>,
    last_timestamp: Instant,
}

/// Serializes writes from every worker and the manager into one log file.
/// Block-buffered (spec §6 "Primary log": "block-buffered"), not flushed
/// per line; `Drop` on the underlying `BufWriter` best-effort flushes
/// whatever's still pending when the log is dropped at program end.
pub struct PrimaryLog {
    inner: Mutex<Inner>,
    started: Instant,
}

impl PrimaryLog {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file: BufWriter::new(file),
                last_timestamp: Instant::now(),
            }),
            started: Instant::now(),
        })
    }

    /// Write one line, prefixed with a fresh timestamp if more than a
    /// second has elapsed since the last line (spec §4.F: "avoid
    /// timestamping every single line under high throughput").
    pub fn line(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if now.duration_since(inner.last_timestamp).as_secs() >= 1 {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(inner.file, "[{stamp}] {message}");
            inner.last_timestamp = now;
        } else {
            let _ = writeln!(inner.file, "{message}");
        }
    }

    /// Force pending buffered lines to disk (called at the end of a run,
    /// after the join barrier, so the final summary line is visible even
    /// though ordinary lines aren't flushed per-write).
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let _ = inner.file.flush();
    }

    /// Emit a progress summary (spec §4.F "progress line"): workers busy,
    /// FIFO depth, elapsed wall time.
    pub fn progress(&self, busy: usize, idle: usize, depth: u64) {
        let elapsed = self.started.elapsed().as_secs();
        self.line(&format!(
            "progress: busy={busy} idle={idle} depth={depth} elapsed={elapsed}s"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn writes_are_timestamped_and_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("run.log");
        let log = PrimaryLog::create(&log_path).unwrap();
        log.line("started");
        log.progress(2, 1, 5);
        log.flush();

        let mut contents = String::new();
        File::open(&log_path).unwrap().read_to_string(&mut contents).unwrap();
        assert!(contents.contains("started"));
        assert!(contents.contains("busy=2"));
        assert!(contents.contains("depth=5"));
    }
}
