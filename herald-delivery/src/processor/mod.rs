//! Worker pool orchestration

pub mod cleanup;
mod process;
pub mod recovery;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use herald_common::{Signal, internal};
use herald_store::{JobStore, Store};
use rand::Rng;
use serde::Deserialize;
use tokio::{sync::Notify, task::JoinSet};
use tracing::{error, warn};

use crate::{
    error::{DeliveryError, SystemError},
    message::Sender,
    policy::RetryPolicy,
    provider::ProviderChain,
    queue::JobQueue,
    stats::ProcessorStats,
    tracking::TrackingRecorder,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const fn default_workers() -> usize {
    4
}

const fn default_poll_interval() -> u64 {
    500
}

const fn default_poll_jitter() -> u64 {
    100
}

const fn default_process_timeout() -> u64 {
    30_000
}

const fn default_retention_days() -> u64 {
    30
}

const fn default_cleanup_interval() -> u64 {
    3600
}

const fn default_max_queue_size() -> usize {
    10_000
}

/// Pulls jobs off the queue and delivers them with a fixed pool of workers
///
/// ```ron
/// processor: (
///     workers: 8,
///     process_timeout_ms: 20000,
///     retry: (max_retries: 5, base_delay_ms: 30000),
/// ),
/// ```
#[derive(Debug, Deserialize)]
pub struct JobProcessor {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Longest an idle worker sleeps before polling again (in milliseconds)
    ///
    /// Workers also wake as soon as a job is enqueued or a scheduled job
    /// becomes due, so this only bounds latency for missed wakeups.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Random extra idle time per poll, so idle workers do not wake in lockstep
    #[serde(default = "default_poll_jitter")]
    pub poll_jitter_ms: u64,

    /// Bound on rendering plus delivery of one attempt (in milliseconds)
    ///
    /// Exceeding it counts as a failed send.
    #[serde(default = "default_process_timeout")]
    pub process_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Terminal jobs last updated longer ago than this are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// How often the retention sweep runs (in seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Above this many queued jobs the queue reports unhealthy
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default)]
    pub sender: Sender,

    #[serde(skip)]
    pub(crate) store: Option<Arc<dyn Store>>,

    #[serde(skip)]
    pub(crate) tracking: Option<TrackingRecorder>,

    #[serde(skip)]
    pub(crate) chain: ProviderChain,

    #[serde(skip)]
    pub(crate) queue: JobQueue,

    #[serde(skip)]
    pub(crate) stats: ProcessorStats,

    #[serde(skip)]
    stopping: AtomicBool,

    #[serde(skip)]
    stop: Notify,
}

impl Default for JobProcessor {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
            poll_jitter_ms: default_poll_jitter(),
            process_timeout_ms: default_process_timeout(),
            retry: RetryPolicy::default(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_queue_size: default_max_queue_size(),
            sender: Sender::default(),
            store: None,
            tracking: None,
            chain: ProviderChain::default(),
            queue: JobQueue::new(),
            stats: ProcessorStats::default(),
            stopping: AtomicBool::new(false),
            stop: Notify::new(),
        }
    }
}

impl JobProcessor {
    /// Attach the store and the provider chain
    pub fn init(&mut self, store: Arc<dyn Store>, chain: ProviderChain) {
        internal!(
            "Initialising job processor with {} workers and providers {:?}",
            self.workers,
            chain.names()
        );
        self.tracking = Some(TrackingRecorder::new(Arc::clone(&store)));
        self.store = Some(store);
        self.chain = chain;
    }

    pub(crate) fn store(&self) -> Result<&Arc<dyn Store>, SystemError> {
        self.store.as_ref().ok_or_else(|| {
            SystemError::NotInitialized("Job processor not initialized. Call init() first.".into())
        })
    }

    /// Run the worker pool until a shutdown signal arrives
    ///
    /// Refuses to start if the store cannot be reached. On startup the queue
    /// is rebuilt from the store, then `workers` workers and the retention
    /// sweep are spawned.
    ///
    /// ## Graceful Shutdown
    ///
    /// On shutdown, workers stop taking new jobs and finish the one in hand.
    /// Workers still busy after 30 seconds are aborted; their jobs stay
    /// `processing` in the store and are released on the next start.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor is not initialized or the store is
    /// unreachable at startup.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn serve(
        self: &Arc<Self>,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!(level = INFO, "Job processor starting");

        let store = Arc::clone(self.store()?);
        if let Err(e) = store.ping().await {
            error!(error = %e, "Job store unreachable, refusing to start the worker pool");
            return Err(SystemError::Store(e).into());
        }

        if self.chain.is_empty() {
            warn!("No providers configured, every delivery attempt will fail");
        }

        let recovered = recovery::recover(self, store.as_ref()).await?;
        internal!(level = INFO, "Restored {} jobs from the store", recovered);

        let mut tasks = JoinSet::new();
        for worker in 0..self.workers.max(1) {
            let processor = Arc::clone(self);
            let store = Arc::clone(&store);
            tasks.spawn(async move { processor.worker(worker, store).await });
        }

        let processor = Arc::clone(self);
        let sweeper = tokio::spawn(async move { processor.retention_loop().await });

        match shutdown.recv().await {
            Ok(Signal::Shutdown | Signal::Finalised) => {
                internal!(level = INFO, "Job processor received shutdown signal");
            }
            Err(e) => {
                error!("Job processor shutdown channel error: {e}");
            }
        }

        self.shutdown();
        sweeper.abort();

        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("Worker task ended abnormally: {e}");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "Shutdown timeout exceeded, in-flight jobs will be recovered on restart"
            );
            tasks.abort_all();
        }

        internal!(level = INFO, "Job processor shutdown complete");
        Ok(())
    }

    /// Ask workers to stop after their current job
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Resolves once [`JobProcessor::shutdown`] has been called
    pub(crate) async fn stopped(&self) {
        loop {
            let notified = self.stop.notified();
            if self.is_stopping() {
                return;
            }
            notified.await;
        }
    }

    async fn worker(self: Arc<Self>, worker: usize, store: Arc<dyn Store>) {
        internal!("Worker {} started", worker);

        while !self.is_stopping() {
            let now = SystemTime::now();

            if let Some(job) = self.queue.poll(now) {
                let _busy = self.stats.busy();
                self.process_job(store.as_ref(), job).await;
                self.publish_queue_size();
                continue;
            }

            let idle = self.idle_delay(now);
            tokio::select! {
                () = tokio::time::sleep(idle) => {}
                () = self.queue.wait() => {}
                () = self.stopped() => {}
            }
        }

        internal!("Worker {} stopped", worker);
    }

    /// Poll interval plus jitter, cut short by the next scheduled job
    fn idle_delay(&self, now: SystemTime) -> Duration {
        let jitter = if self.poll_jitter_ms > 0 {
            rand::rng().random_range(0..=self.poll_jitter_ms)
        } else {
            0
        };
        let idle = Duration::from_millis(self.poll_interval_ms.saturating_add(jitter));

        self.queue
            .next_due()
            .map_or(idle, |due| idle.min(due.duration_since(now).unwrap_or_default()))
    }

    async fn retention_loop(self: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.cleanup_interval_secs.max(1)));

        loop {
            interval.tick().await;
            if let Err(e) = cleanup::sweep(&self).await {
                warn!(error = %e, "Retention sweep failed");
            }
        }
    }

    pub(crate) fn publish_queue_size(&self) {
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.jobs.set_queue_size(
                self.queue.len() as u64,
                self.queue.scheduled_len() as u64,
            );
        }
    }

    pub(crate) const fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    pub(crate) const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(86_400))
    }

    /// The queue workers pull from
    #[must_use]
    pub const fn queue(&self) -> &JobQueue {
        &self.queue
    }

    #[must_use]
    pub const fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    #[must_use]
    pub const fn stats(&self) -> &ProcessorStats {
        &self.stats
    }
}
