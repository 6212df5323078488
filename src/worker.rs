//! Worker thread (spec §4.D): drains the path FIFO, scans one directory
//! per pop, pushes discovered subdirectories back, and parks on a private
//! wakeup primitive whenever the FIFO is empty.

use crate::config::Config;
use crate::fifo::PathFifo;
use crate::formatter::Formatter;
use crate::roots::RootSet;
use crate::scanner::{root_device, scan_directory};
use crate::stats::WorkerStats;
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// A worker's own parking primitive, distinct from the FIFO's shared
/// manager condvar (spec §4.D: "a private wakeup primitive per worker").
/// The `pending` flag guards against the lost-wakeup race a bare condvar
/// wait without a predicate would suffer if the wake arrives just before
/// the worker parks.
#[derive(Default)]
pub struct Wakeup {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl Wakeup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = true;
        self.cv.notify_one();
    }

    /// Park until woken, consuming the pending flag.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while !*pending {
            pending = self.cv.wait(pending).unwrap_or_else(|e| e.into_inner());
        }
        *pending = false;
    }
}

/// One worker's run-to-completion body. Returns its accumulated stats and
/// any non-fatal warnings observed, once `stop` is set and the FIFO is
/// observed empty (spec §4.E drives `stop` via the manager's quiescence
/// check).
#[allow(clippy::too_many_arguments)]
pub fn run_worker(
    id: usize,
    config: &Config,
    fifo: &PathFifo,
    roots: &RootSet,
    target_roots: Option<&RootSet>,
    wakeup: &Wakeup,
    stop: &AtomicBool,
    formatter: &mut dyn Formatter,
    visited: Option<&DashSet<(u64, u64)>>,
) -> (WorkerStats, Vec<crate::error::ScanWarning>) {
    let mut stats = WorkerStats::new(&config.tally_buckets);
    let mut warnings = Vec::new();
    let root = roots.select(id);
    let root_dev = root_device(root.fd()).unwrap_or(root.dev);
    let target_root_fd = target_roots.map(|t| t.select(id).fd());

    fifo.set_idle(id);

    loop {
        match fifo.pop() {
            Ok(Some(relative_dir)) => {
                fifo.set_busy(id);
                match scan_directory(
                    config,
                    root.fd(),
                    target_root_fd,
                    &relative_dir,
                    root_dev,
                    formatter,
                    &mut stats,
                    visited,
                ) {
                    Ok((subdirs, mut dir_warnings)) => {
                        warnings.append(&mut dir_warnings);
                        for subdir in subdirs {
                            if let Err(e) = fifo.push(&subdir) {
                                // A push failure here is a fatal invariant
                                // violation (spec §7.2); surface it by
                                // aborting rather than silently dropping
                                // the discovered subdirectory.
                                panic!("worker {id} failed to push discovered subdirectory: {e}");
                            }
                        }
                    }
                    Err(warning) => warnings.push(warning),
                }
                fifo.set_idle(id);
            }
            Ok(None) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                wakeup.wait();
            }
            Err(e) => panic!("worker {id} hit a fatal FIFO error: {e}"),
        }
    }

    let _ = formatter.flush();
    (stats, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeup_wait_returns_immediately_after_a_prior_wake() {
        let wakeup = Wakeup::new();
        wakeup.wake();
        wakeup.wait(); // must not block
    }

    #[test]
    fn wakeup_wait_blocks_until_woken_from_another_thread() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let wakeup = Arc::new(Wakeup::new());
        let waiter = wakeup.clone();
        let handle = thread::spawn(move || {
            waiter.wait();
        });
        thread::sleep(Duration::from_millis(20));
        wakeup.wake();
        handle.join().unwrap();
    }
}
