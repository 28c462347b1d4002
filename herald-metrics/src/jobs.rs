//! Job lifecycle metrics
//!
//! Tracks submissions, delivery attempts by outcome, terminal states and
//! the live size of the queue.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Job metrics collector
#[derive(Debug)]
pub struct JobMetrics {
    /// Jobs accepted by priority and kind
    created_total: Counter<u64>,

    /// Delivery attempts by outcome
    attempts_total: Counter<u64>,

    completed_total: Counter<u64>,

    /// Jobs moved to the dead-letter state, by reason
    failed_total: Counter<u64>,

    retried_total: Counter<u64>,

    /// Time from first claim to completion
    processing_seconds: Histogram<f64>,

    /// Attempts a job needed before it was sent
    attempts_before_success: Histogram<u64>,

    // Shared with the observable gauge callback
    queue_immediate: Arc<AtomicU64>,
    queue_scheduled: Arc<AtomicU64>,
    active_workers: Arc<AtomicU64>,
}

impl JobMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        let created_total = meter
            .u64_counter("herald.jobs.created.total")
            .with_description("Total number of jobs accepted by priority and kind")
            .build();

        let attempts_total = meter
            .u64_counter("herald.jobs.attempts.total")
            .with_description("Total number of delivery attempts by outcome")
            .build();

        let completed_total = meter
            .u64_counter("herald.jobs.completed.total")
            .with_description("Total number of jobs sent successfully")
            .build();

        let failed_total = meter
            .u64_counter("herald.jobs.failed.total")
            .with_description("Total number of jobs moved to the dead-letter state")
            .build();

        let retried_total = meter
            .u64_counter("herald.jobs.retried.total")
            .with_description("Total number of retries scheduled")
            .build();

        let processing_seconds = meter
            .f64_histogram("herald.jobs.processing.seconds")
            .with_description("Time from the first claim of a job to its completion")
            .build();

        let attempts_before_success = meter
            .u64_histogram("herald.jobs.attempts.before_success")
            .with_description("Distribution of attempts needed before a job was sent")
            .build();

        let queue_immediate = Arc::new(AtomicU64::new(0));
        let queue_scheduled = Arc::new(AtomicU64::new(0));
        let active_workers = Arc::new(AtomicU64::new(0));

        let immediate = queue_immediate.clone();
        let scheduled = queue_scheduled.clone();
        meter
            .u64_observable_gauge("herald.queue.size")
            .with_description("Current queue size by space")
            .with_callback(move |observer| {
                observer.observe(
                    immediate.load(Ordering::Relaxed),
                    &[KeyValue::new("space", "immediate")],
                );
                observer.observe(
                    scheduled.load(Ordering::Relaxed),
                    &[KeyValue::new("space", "scheduled")],
                );
            })
            .build();

        let workers = active_workers.clone();
        meter
            .u64_observable_gauge("herald.workers.active")
            .with_description("Workers currently processing a job")
            .with_callback(move |observer| {
                observer.observe(workers.load(Ordering::Relaxed), &[]);
            })
            .build();

        Self {
            created_total,
            attempts_total,
            completed_total,
            failed_total,
            retried_total,
            processing_seconds,
            attempts_before_success,
            queue_immediate,
            queue_scheduled,
            active_workers,
        }
    }

    pub fn record_created(&self, priority: &str, kind: &str) {
        self.created_total.add(
            1,
            &[
                KeyValue::new("priority", priority.to_string()),
                KeyValue::new("kind", kind.to_string()),
            ],
        );
    }

    /// Record the outcome of one delivery attempt
    pub fn record_attempt(&self, outcome: &str) {
        self.attempts_total
            .add(1, &[KeyValue::new("outcome", outcome.to_string())]);
    }

    pub fn record_completed(&self, processing_secs: f64, attempts: u64) {
        self.completed_total.add(1, &[]);
        self.processing_seconds.record(processing_secs, &[]);
        self.attempts_before_success.record(attempts, &[]);
        self.record_attempt("success");
    }

    pub fn record_failed(&self, reason: &str) {
        self.failed_total
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
        self.record_attempt("failed");
    }

    pub fn record_retry(&self) {
        self.retried_total.add(1, &[]);
        self.record_attempt("retry");
    }

    pub fn set_queue_size(&self, immediate: u64, scheduled: u64) {
        self.queue_immediate.store(immediate, Ordering::Relaxed);
        self.queue_scheduled.store(scheduled, Ordering::Relaxed);
    }

    pub fn set_active_workers(&self, active: u64) {
        self.active_workers.store(active, Ordering::Relaxed);
    }

    #[must_use]
    pub fn queue_size(&self) -> (u64, u64) {
        (
            self.queue_immediate.load(Ordering::Relaxed),
            self.queue_scheduled.load(Ordering::Relaxed),
        )
    }

    #[must_use]
    pub fn active_workers(&self) -> u64 {
        self.active_workers.load(Ordering::Relaxed)
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.jobs")
}
