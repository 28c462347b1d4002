//! Aggregate counters for the worker pool

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ProcessorStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    active_workers: AtomicU64,
}

/// Point-in-time copy of [`ProcessorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Attempts that reached an outcome
    pub processed: u64,
    pub succeeded: u64,
    /// Jobs moved to the dead-letter state
    pub failed: u64,
    /// Failed attempts that were scheduled for another try
    pub retried: u64,
    pub active_workers: u64,
}

impl ProcessorStats {
    /// Mark a worker busy until the guard drops
    pub(crate) fn busy(&self) -> BusyGuard<'_> {
        let active = self.active_workers.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        publish_active(active);
        BusyGuard { stats: self }
    }

    pub(crate) fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn active_workers(&self) -> u64 {
        self.active_workers.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            active_workers: self.active_workers(),
        }
    }
}

pub(crate) struct BusyGuard<'a> {
    stats: &'a ProcessorStats,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let active = self.stats.active_workers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        publish_active(active);
    }
}

fn publish_active(active: u64) {
    if let Some(metrics) = herald_metrics::metrics() {
        metrics.jobs.set_active_workers(active);
    }
}
