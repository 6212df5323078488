//! Ties every component together (spec §4, §5): opens the root sets,
//! raises the file descriptor limit, creates the output directory and
//! primary log, seeds the FIFO, spawns the manager and worker threads, and
//! performs the final invariant checks after the join barrier.

use crate::config::Config;
use crate::error::{FatalInvariantError, SetupError};
use crate::fifo::PathFifo;
use crate::formatter::{ChannelFormatter, EntryRecord, Formatter, LazyFormatter, LsFormatter, NullFormatter, XmlFormatter};
use crate::log::PrimaryLog;
use crate::manager::run_manager;
use crate::outputdir::create_output_dir;
use crate::privilege::{lower_ownership_path, Identity};
use crate::rlimit::{ensure_rlimit, required_fd_count};
use crate::roots::{verify_source_target_distinct, RootSet};
use crate::stats::GlobalStats;
use crate::worker::{run_worker, Wakeup};
use crossbeam_channel::bounded;
use dashmap::DashSet;
use std::fs::File;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

/// Any of the ways a run can fail outright (spec §7.1/§7.2).
#[derive(Debug)]
pub enum RunError {
    Setup(SetupError),
    FatalInvariant(FatalInvariantError),
}

impl From<SetupError> for RunError {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

impl From<FatalInvariantError> for RunError {
    fn from(e: FatalInvariantError) -> Self {
        Self::FatalInvariant(e)
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "{e}"),
            Self::FatalInvariant(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Emit a progress line (workers busy, FIFO depth, elapsed wall time) every
/// `interval_secs` seconds until `stop` is set (spec §6 "Primary log":
/// "a periodic progress line ... emitted every P seconds"). Polls `stop` on
/// a short cadence so the walk's own join barrier isn't held up waiting on
/// a long sleep once quiescence is reached.
fn run_progress_reporter(fifo: &PathFifo, log: &PrimaryLog, stop: &AtomicBool, interval_secs: u64) {
    const POLL: std::time::Duration = std::time::Duration::from_millis(250);
    let interval = std::time::Duration::from_secs(interval_secs.max(1));
    let mut elapsed = std::time::Duration::ZERO;
    while !stop.load(std::sync::atomic::Ordering::Acquire) {
        std::thread::sleep(POLL);
        elapsed += POLL;
        if elapsed >= interval {
            elapsed = std::time::Duration::ZERO;
            let snapshot = fifo.snapshot();
            log.progress(snapshot.busy, snapshot.idle, snapshot.depth);
        }
    }
}

/// Bounded channel depth between a worker's scanning thread and its
/// writer thread, in batches (each up to 256 records) rather than records
/// (teacher pattern: `walk/finder.rs`'s `RESULT_CHANNEL_FACTOR`).
const WRITER_CHANNEL_DEPTH: usize = 4;

/// Drains batched records from the scanning thread until every sender
/// clone is dropped, writing each through `inner`, then flushes. A write
/// failure here isn't attributable to any one worker's stats, so it's
/// swallowed rather than surfaced as a `ScanWarning` (teacher convention:
/// `BatchSender`'s `Drop` also swallows a failed final flush).
fn run_writer_thread(rx: crossbeam_channel::Receiver<Vec<EntryRecord>>, mut inner: Box<dyn Formatter>) {
    for batch in rx {
        for record in &batch {
            let _ = inner.emit(record);
        }
    }
    let _ = inner.flush();
}

/// Builds the `Formatter` a worker scans into. For the listing modes this
/// spawns a dedicated writer thread and hands back a [`ChannelFormatter`]
/// so the scanning thread never blocks on the writer's disk I/O (spec
/// §4.G, §4.D); modes with no listing output skip the channel entirely.
fn spawn_output_formatter<'scope, 'env>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    config: &Config,
    output_dir: std::path::PathBuf,
    worker_id: usize,
    identity: Identity,
) -> Box<dyn Formatter> {
    use crate::config::PrimaryMode;
    use std::os::unix::io::AsRawFd;
    // Lazily-created per-worker output files are privileged if the process
    // itself is (spec §4.F): downgrade ownership to the invoking real user
    // right after creation, before any worker writes to it.
    fn create_and_downgrade(path: &std::path::Path, identity: Identity) -> std::io::Result<File> {
        let file = File::create(path)?;
        let _ = crate::privilege::lower_ownership(file.as_raw_fd(), &identity);
        Ok(file)
    }
    let inner: Box<dyn Formatter> = match config.primary_mode {
        PrimaryMode::List => {
            let path = output_dir.join(format!("worker-{worker_id}.out"));
            Box::new(LazyFormatter::new(move || {
                create_and_downgrade(&path, identity).map(LsFormatter::new)
            }))
        }
        PrimaryMode::Xml => {
            let path = output_dir.join(format!("worker-{worker_id}.xml"));
            Box::new(LazyFormatter::new(move || {
                create_and_downgrade(&path, identity).map(XmlFormatter::new)
            }))
        }
        PrimaryMode::Compare | PrimaryMode::TimeFix | PrimaryMode::Delete | PrimaryMode::Audit => {
            return Box::new(NullFormatter);
        }
    };
    let (tx, rx) = bounded(WRITER_CHANNEL_DEPTH);
    scope.spawn(move || run_writer_thread(rx, inner));
    Box::new(ChannelFormatter::new(tx))
}

/// Run a full scan to completion and return the summed statistics.
pub fn run(config: &Config) -> Result<GlobalStats, RunError> {
    let source = RootSet::open("source", &config.source_roots)?;
    let target = if config.has_target() {
        Some(RootSet::open("target", &config.target_roots)?)
    } else {
        None
    };
    verify_source_target_distinct(&source, target.as_ref())?;

    let worker_count = config.worker_count.get();
    let needed_fds = required_fd_count(worker_count, source.len() + target.as_ref().map_or(0, RootSet::len));
    ensure_rlimit(needed_fds)?;

    // Privilege downgrade (spec §4.F/§5): every file this run creates is
    // chowned to the invoking real user/group when running elevated. A
    // no-op identity comparison when not running setuid/setgid.
    let identity = Identity::current();

    let output_dir = create_output_dir(&config.output_root, "parawalk")?;
    let _ = lower_ownership_path(&output_dir, &identity);
    let log_path = output_dir.join("parawalk.log");
    let log = PrimaryLog::create(&log_path).map_err(|e| SetupError::OutputDirUnavailable {
        path: output_dir.clone(),
        source: e,
    })?;
    let _ = lower_ownership_path(&log_path, &identity);

    let fifo_path = output_dir.join("fifo.queue");
    let fifo = PathFifo::open(&fifo_path, worker_count).map_err(|e| SetupError::OutputDirUnavailable {
        path: fifo_path.clone(),
        source: e,
    })?;
    let _ = lower_ownership_path(&fifo_path, &identity);
    fifo.push(b"").map_err(RunError::from)?;

    let wakeups: Vec<Wakeup> = (0..worker_count).map(|_| Wakeup::new()).collect();
    let stop = AtomicBool::new(false);
    // Opt-in hard-linked-directory dedup (spec §9 "Cyclic graphs"); shared
    // across all workers so a directory reached through two different
    // hard links is still scanned only once.
    let visited: Option<DashSet<(u64, u64)>> = config
        .detect_hardlinked_dir_revisits
        .then(DashSet::new);
    let worker_results: Mutex<Vec<(crate::stats::WorkerStats, Vec<crate::error::ScanWarning>)>> =
        Mutex::new(Vec::new());

    log.line("scan starting");

    std::thread::scope(|scope| {
        scope.spawn(|| run_manager(&fifo, &wakeups, &stop));
        scope.spawn(|| run_progress_reporter(&fifo, &log, &stop, config.progress_interval_secs));

        let mut handles = Vec::with_capacity(worker_count);
        for (id, wakeup) in wakeups.iter().enumerate() {
            let fifo = &fifo;
            let source = &source;
            let target = target.as_ref();
            let output_dir = output_dir.clone();
            let visited = visited.as_ref();
            let mut formatter = spawn_output_formatter(scope, config, output_dir, id, identity);
            handles.push(scope.spawn(move || {
                run_worker(id, config, fifo, source, target, wakeup, &stop, formatter.as_mut(), visited)
            }));
        }

        let mut results = worker_results.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles {
            results.push(handle.join().expect("worker thread panicked"));
        }
    });

    log.line("scan complete, verifying invariants");

    let (pushes, pops) = fifo.pushes_pops();
    if pushes != pops {
        return Err(FatalInvariantError::PushPopMismatch { pushes, pops }.into());
    }
    if !fifo.all_workers_idle_or_embryonic() {
        return Err(FatalInvariantError::WorkerFinishedBusy { worker_id: usize::MAX }.into());
    }

    let results = worker_results.into_inner().unwrap_or_else(|e| e.into_inner());
    let worker_stats: Vec<crate::stats::WorkerStats> = results.into_iter().map(|(stats, _)| stats).collect();
    let global = GlobalStats::sum(&config.tally_buckets, &worker_stats);

    log.line(&format!(
        "totals: dirs={} files={} symlinks={}",
        global.totals.dirs.open_dirs, global.totals.dirs.n_files, global.totals.dirs.n_symlinks
    ));
    log.flush();

    Ok(global)
}
