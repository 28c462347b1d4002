//! Health check logic

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use herald_common::HealthReport;
use parking_lot::RwLock;

/// Thread-safe view of the engine's health
///
/// The processor side publishes a [`HealthReport`] periodically through
/// [`HealthChecker::update`]; the HTTP handlers only ever read.
#[derive(Debug)]
pub struct HealthChecker {
    /// Whether the job store answered its last ping
    store_ready: AtomicBool,

    /// Whether the worker pool is running
    processor_ready: AtomicBool,

    /// Whether at least one provider's last send succeeded (or none was tried)
    providers_ready: AtomicBool,

    /// Queued jobs, immediate and scheduled
    queue_size: AtomicU64,

    max_queue_size: u64,

    report: RwLock<Option<HealthReport>>,
}

impl HealthChecker {
    #[must_use]
    pub fn new(max_queue_size: u64) -> Self {
        Self {
            store_ready: AtomicBool::new(false),
            processor_ready: AtomicBool::new(false),
            providers_ready: AtomicBool::new(false),
            queue_size: AtomicU64::new(0),
            max_queue_size,
            report: RwLock::new(None),
        }
    }

    pub fn set_store_ready(&self, ready: bool) {
        self.store_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "Store readiness updated");
    }

    /// Mark the worker pool as running (or stopped)
    pub fn set_processor_ready(&self, ready: bool) {
        self.processor_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "Processor readiness updated");
    }

    pub fn set_queue_size(&self, size: u64) {
        self.queue_size.store(size, Ordering::Relaxed);
    }

    /// Take in a fresh report from the processor
    pub fn update(&self, report: HealthReport) {
        self.store_ready.store(report.store_healthy, Ordering::Relaxed);
        self.providers_ready
            .store(report.providers.iter().any(|p| p.healthy), Ordering::Relaxed);
        self.set_queue_size(report.queue_size.saturating_add(report.scheduled_size));
        *self.report.write() = Some(report);
    }

    /// The last report published, if any
    #[must_use]
    pub fn report(&self) -> Option<HealthReport> {
        self.report.read().clone()
    }

    /// Liveness needs nothing but a response; a dead server is caught by
    /// the probe timing out.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        true
    }

    /// Whether the engine should be handed new jobs
    ///
    /// Requires a reachable store, a running worker pool, at least one
    /// healthy provider and a queue below the threshold.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let status = self.get_status();
        if !status.ready {
            tracing::debug!(
                store_ready = status.store_ready,
                processor_ready = status.processor_ready,
                providers_ready = status.providers_ready,
                queue_size = status.queue_size,
                max_queue_size = status.max_queue_size,
                "Readiness check failed"
            );
        }
        status.ready
    }

    #[must_use]
    pub fn get_status(&self) -> HealthStatus {
        let store_ready = self.store_ready.load(Ordering::Relaxed);
        let processor_ready = self.processor_ready.load(Ordering::Relaxed);
        let providers_ready = self.providers_ready.load(Ordering::Relaxed);
        let queue_size = self.queue_size.load(Ordering::Relaxed);

        HealthStatus {
            alive: self.is_alive(),
            ready: store_ready
                && processor_ready
                && providers_ready
                && queue_size < self.max_queue_size,
            store_ready,
            processor_ready,
            providers_ready,
            queue_size,
            max_queue_size: self.max_queue_size,
        }
    }
}

/// Flattened readiness inputs, returned by a failing readiness probe
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "One flag per readiness input"
)]
pub struct HealthStatus {
    pub alive: bool,
    pub ready: bool,
    pub store_ready: bool,
    pub processor_ready: bool,
    pub providers_ready: bool,
    pub queue_size: u64,
    pub max_queue_size: u64,
}
