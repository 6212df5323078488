//! The manager thread (spec §4.E), translated directly from the original's
//! `manage_workers()` loop: watch (idle, busy, depth), wake exactly enough
//! idle workers to drain the FIFO, and declare quiescence once no worker
//! is busy and the FIFO is empty.

use crate::fifo::PathFifo;
use crate::worker::Wakeup;
use std::sync::atomic::AtomicBool;

/// Run the manager loop until quiescence (spec §4.E: `busy == 0 && depth
/// == 0`), then set `stop` and wake every worker so each observes it and
/// exits its own drain loop.
///
/// The decide/signal/park cycle itself lives on [`PathFifo::run_manager`],
/// under one continuous lock hold (spec §5) — this is just the thread
/// entry point.
pub fn run_manager(fifo: &PathFifo, worker_wakeups: &[Wakeup], stop: &AtomicBool) {
    fifo.run_manager(worker_wakeups, stop);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn make_fifo(worker_count: usize) -> PathFifo {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.into_temp_path();
        let fifo = PathFifo::open(&path, worker_count).unwrap();
        std::mem::forget(path);
        fifo
    }

    #[test]
    fn manager_declares_quiescence_on_an_empty_idle_fifo() {
        let fifo = make_fifo(2);
        fifo.set_idle(0);
        fifo.set_idle(1);
        let wakeups = [Wakeup::new(), Wakeup::new()];
        let stop = AtomicBool::new(false);
        run_manager(&fifo, &wakeups, &stop);
        assert!(stop.load(Ordering::Acquire));
    }

    #[test]
    fn manager_wakes_idle_workers_when_depth_is_nonzero() {
        let fifo = make_fifo(2);
        fifo.set_idle(0);
        fifo.set_idle(1);
        fifo.push(b"some/dir").unwrap();

        std::thread::scope(|scope| {
            let stop = AtomicBool::new(false);
            let wakeups = [Wakeup::new(), Wakeup::new()];
            scope.spawn(|| {
                // Simulate a worker draining the one pushed entry, then
                // going idle again so the manager can observe quiescence.
                std::thread::sleep(std::time::Duration::from_millis(10));
                fifo.set_busy(0);
                fifo.pop().unwrap();
                fifo.set_idle(0);
            });
            run_manager(&fifo, &wakeups, &stop);
            assert!(stop.load(Ordering::Acquire));
        });
    }
}
