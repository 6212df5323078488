//! Three-tier statistics aggregation (spec §3, §4.F): directory-local `DirStats`
//! fold into worker-owned `WorkerStats`, which are summed into `GlobalStats`
//! only after every worker has joined. No lock is taken at any tier; the
//! owning thread is the only writer until the final single-threaded sum.

use std::path::PathBuf;

/// Maximum number of tally buckets (spec §3: "≤64 buckets").
pub const MAX_TALLY_BUCKETS: usize = 64;

/// Monotonic, non-decreasing size thresholds with an implicit final
/// overflow bucket (spec §3 "Tally bucket definition").
#[derive(Debug, Clone)]
pub struct TallyBuckets {
    /// Thresholds in ascending order. The overflow bucket is
    /// `thresholds.len()`, one past the last explicit threshold.
    thresholds: Vec<u64>,
}

impl TallyBuckets {
    /// Build a bucket list, asserting it is sorted and within the ≤64 budget
    /// (63 explicit thresholds + 1 overflow bucket).
    #[must_use]
    pub fn new(thresholds: Vec<u64>) -> Self {
        assert!(
            thresholds.len() < MAX_TALLY_BUCKETS,
            "at most {} explicit tally thresholds (one slot reserved for overflow)",
            MAX_TALLY_BUCKETS - 1
        );
        assert!(
            thresholds.windows(2).all(|w| w[0] <= w[1]),
            "tally thresholds must be monotonic non-decreasing"
        );
        Self { thresholds }
    }

    /// Index of the smallest bucket whose threshold ≥ `size`, or the
    /// overflow bucket (`self.thresholds.len()`) if none qualifies.
    #[must_use]
    pub fn bucket_for(&self, size: u64) -> usize {
        self.thresholds
            .iter()
            .position(|&threshold| threshold >= size)
            .unwrap_or(self.thresholds.len())
    }

    /// Total bucket count including the overflow bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.thresholds.len() + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false // overflow bucket always exists
    }
}

impl Default for TallyBuckets {
    /// A reasonable default ladder: 4KiB .. 1GiB, doubling, plus overflow.
    fn default() -> Self {
        let mut thresholds = Vec::new();
        let mut size: u64 = 4 * 1024;
        while size < 1024 * 1024 * 1024 {
            thresholds.push(size);
            size *= 2;
        }
        Self::new(thresholds)
    }
}

/// One tally bucket's running totals.
#[derive(Debug, Default, Clone, Copy)]
pub struct TallyBucketCounters {
    pub count: u64,
    pub size_sum: i64,
    pub allocated_sum: i64,
}

/// Directory-scan-local counters (spec §3 "DS"). Lives only on the scanning
/// thread's stack; folded into `WorkerStats` once the scan completes.
#[derive(Debug, Default, Clone)]
pub struct DirStats {
    pub open_dirs: u64,
    pub stat_calls: u64,
    pub stat_errors: u64,
    pub warnings: u64,
    pub n_dirs: u64,
    pub n_files: u64,
    pub n_symlinks: u64,
    pub n_other: u64,
    pub bytes_nominal: i64,
    pub bytes_allocated: i64,
    pub acl_present: u64,
    pub hardlink_bearing_files: u64,
    pub extra_hardlinks: u64,
    pub zero_byte_files: u64,
    pub name_skipped: u64,
    pub cross_fs_skipped: u64,
    pub open_errors: u64,
    /// Directories not re-pushed because their `(dev, ino)` was already
    /// visited through another hard link (spec §9 "Cyclic graphs").
    pub hardlinked_dir_revisits: u64,
}

/// Per-worker accumulator (spec §3 "WS"), owned exclusively by the worker
/// thread that updates it; no locking required.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub dirs: DirStats,
    pub readonly_opens: u64,
    pub readonly_open_errors: u64,
    pub crc_bytes_read: u64,
    pub prefix_bytes_read: u64,
    pub compare_matches: u64,
    pub compare_mismatches: u64,
    pub compare_errors: u64,
    pub timefix_applied: u64,
    pub timefix_errors: u64,
    pub deletes_applied: u64,
    pub delete_errors: u64,
    pub max_interesting_inode: u64,
    pub tally: Vec<TallyBucketCounters>,
}

impl WorkerStats {
    #[must_use]
    pub fn new(buckets: &TallyBuckets) -> Self {
        Self {
            dirs: DirStats::default(),
            readonly_opens: 0,
            readonly_open_errors: 0,
            crc_bytes_read: 0,
            prefix_bytes_read: 0,
            compare_matches: 0,
            compare_mismatches: 0,
            compare_errors: 0,
            timefix_applied: 0,
            timefix_errors: 0,
            deletes_applied: 0,
            delete_errors: 0,
            max_interesting_inode: 0,
            tally: vec![TallyBucketCounters::default(); buckets.len()],
        }
    }

    /// Fold one directory's local counters into this worker's totals
    /// (spec §4.C.4: "fold DS into WS under no lock").
    pub fn fold_dir(&mut self, dir: DirStats) {
        self.dirs.open_dirs += dir.open_dirs;
        self.dirs.stat_calls += dir.stat_calls;
        self.dirs.stat_errors += dir.stat_errors;
        self.dirs.warnings += dir.warnings;
        self.dirs.n_dirs += dir.n_dirs;
        self.dirs.n_files += dir.n_files;
        self.dirs.n_symlinks += dir.n_symlinks;
        self.dirs.n_other += dir.n_other;
        self.dirs.bytes_nominal += dir.bytes_nominal;
        self.dirs.bytes_allocated += dir.bytes_allocated;
        self.dirs.acl_present += dir.acl_present;
        self.dirs.hardlink_bearing_files += dir.hardlink_bearing_files;
        self.dirs.extra_hardlinks += dir.extra_hardlinks;
        self.dirs.zero_byte_files += dir.zero_byte_files;
        self.dirs.name_skipped += dir.name_skipped;
        self.dirs.cross_fs_skipped += dir.cross_fs_skipped;
        self.dirs.open_errors += dir.open_errors;
        self.dirs.hardlinked_dir_revisits += dir.hardlinked_dir_revisits;
    }

    /// Record one regular file into the size-bucket histogram (spec
    /// §4.F "Tally behaviour").
    pub fn tally_file(&mut self, buckets: &TallyBuckets, size: u64, allocated: u64, block_unit: u64) {
        let idx = buckets.bucket_for(size);
        let bucket = &mut self.tally[idx];
        bucket.count += 1;
        bucket.size_sum += size as i64;
        bucket.allocated_sum += (allocated * block_unit) as i64;
    }
}

/// Process-global totals (spec §3 "GS"): identical shape to `WorkerStats`,
/// populated only by summing every `WorkerStats` after all workers join.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub worker_count: usize,
    pub totals: WorkerStats,
}

impl GlobalStats {
    /// Sum every worker's stats. Runs single-threaded, strictly after the
    /// join barrier (spec §5: "read-after-join barrier").
    #[must_use]
    pub fn sum(buckets: &TallyBuckets, workers: &[WorkerStats]) -> Self {
        let mut totals = WorkerStats::new(buckets);
        for worker in workers {
            totals.fold_dir(worker.dirs.clone());
            totals.readonly_opens += worker.readonly_opens;
            totals.readonly_open_errors += worker.readonly_open_errors;
            totals.crc_bytes_read += worker.crc_bytes_read;
            totals.prefix_bytes_read += worker.prefix_bytes_read;
            totals.compare_matches += worker.compare_matches;
            totals.compare_mismatches += worker.compare_mismatches;
            totals.compare_errors += worker.compare_errors;
            totals.timefix_applied += worker.timefix_applied;
            totals.timefix_errors += worker.timefix_errors;
            totals.deletes_applied += worker.deletes_applied;
            totals.delete_errors += worker.delete_errors;
            totals.max_interesting_inode = totals.max_interesting_inode.max(worker.max_interesting_inode);
            for (idx, bucket) in worker.tally.iter().enumerate() {
                totals.tally[idx].count += bucket.count;
                totals.tally[idx].size_sum += bucket.size_sum;
                totals.tally[idx].allocated_sum += bucket.allocated_sum;
            }
        }
        Self {
            worker_count: workers.len(),
            totals,
        }
    }
}

/// A warning or error observed while scanning, paired with the directory
/// it occurred in, for forensic reporting (not itself part of DS/WS/GS
/// counters, which only carry aggregate totals).
#[derive(Debug, Clone)]
pub struct WarningRecord {
    pub dir: PathBuf,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_for_picks_smallest_qualifying_threshold() {
        let buckets = TallyBuckets::new(vec![100, 1_000, 10_000]);
        assert_eq!(buckets.bucket_for(0), 0);
        assert_eq!(buckets.bucket_for(100), 0);
        assert_eq!(buckets.bucket_for(101), 1);
        assert_eq!(buckets.bucket_for(10_000), 2);
        assert_eq!(buckets.bucket_for(10_001), 3); // overflow
    }

    #[test]
    fn seven_byte_file_with_no_buckets_lands_in_overflow() {
        let buckets = TallyBuckets::new(vec![]);
        let mut ws = WorkerStats::new(&buckets);
        ws.tally_file(&buckets, 7, 8, 512);
        assert_eq!(ws.tally[0].count, 1);
        assert_eq!(ws.tally[0].size_sum, 7);
        assert_eq!(ws.tally[0].allocated_sum, 8 * 512);
    }

    #[test]
    fn global_sum_matches_sum_of_workers() {
        let buckets = TallyBuckets::default();
        let mut w1 = WorkerStats::new(&buckets);
        let mut w2 = WorkerStats::new(&buckets);
        w1.dirs.n_files = 3;
        w2.dirs.n_files = 5;
        w1.tally_file(&buckets, 10, 1, 512);
        w2.tally_file(&buckets, 20, 1, 512);
        let gs = GlobalStats::sum(&buckets, &[w1, w2]);
        assert_eq!(gs.totals.dirs.n_files, 8);
        assert_eq!(gs.totals.tally[0].count, 2);
    }

    #[test]
    #[should_panic(expected = "monotonic")]
    fn rejects_non_monotonic_thresholds() {
        TallyBuckets::new(vec![10, 5]);
    }
}
