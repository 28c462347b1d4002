//! One delivery attempt, from claim to outcome

use std::time::{Duration, Instant, SystemTime};

use herald_common::{EmailJob, JobStatus, audit};
use herald_store::{JobStore, Store, StoreError};
use tracing::{debug, info, warn};

use crate::{
    error::{DeliveryError, TemporaryError},
    policy::RetryDecision,
    processor::JobProcessor,
    provider::Sent,
    render,
};

/// First wait before retrying a store write
const STORE_RETRY_MIN: Duration = Duration::from_millis(50);

/// Longest wait between store write retries
const STORE_RETRY_MAX: Duration = Duration::from_secs(5);

/// How long a job waits in the queue after a store outage interrupted it
const STORE_OUTAGE_BACKOFF: Duration = Duration::from_secs(1);

impl JobProcessor {
    /// Claim, render, send and settle one job
    ///
    /// Claiming is a compare-and-update from `pending` to `processing`; a
    /// worker that loses the race (or finds the job cancelled) drops it.
    #[tracing::instrument(level = "debug", skip_all, fields(job_id = %queued.id))]
    pub(crate) async fn process_job(&self, store: &dyn Store, queued: EmailJob) {
        let now = SystemTime::now();
        let mut job = queued.clone();

        if let Err(e) = job.start_processing(now) {
            debug!(error = %e, "Queued job is not pending, dropping it");
            return;
        }

        if job.tracked {
            match store.update_job_if(&job, JobStatus::Pending).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Job was claimed or cancelled elsewhere, dropping it");
                    return;
                }
                Err(e) if e.is_not_found() => {
                    warn!("Queued job no longer exists in the store, dropping it");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Could not claim job, requeueing it");
                    self.queue.defer(queued, now + STORE_OUTAGE_BACKOFF);
                    return;
                }
            }
        }

        audit::log_delivery_attempt(&job.id, job.attempts);

        let started = Instant::now();
        let timeout = self.process_timeout();
        let outcome = match tokio::time::timeout(timeout, self.attempt(store, &job)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TemporaryError::Timeout(timeout).into()),
        };

        match outcome {
            Ok(sent) => self.succeeded(store, job, &sent, started).await,
            Err(DeliveryError::System(e)) => {
                warn!(error = %e, "System error during delivery, releasing job");
                self.release(store, job, queued.attempts).await;
            }
            Err(e @ DeliveryError::Permanent(_)) => self.failed(store, job, &e).await,
            Err(e @ DeliveryError::Temporary(_)) => match self.retry.decide(&job, SystemTime::now()) {
                RetryDecision::RetryAt(at) => self.retry_later(store, job, &e, at).await,
                RetryDecision::GiveUp => self.failed(store, job, &e).await,
            },
        }
    }

    async fn attempt(&self, store: &dyn Store, job: &EmailJob) -> Result<Sent, DeliveryError> {
        let email = render::resolve(store, job, &self.sender).await?;
        Ok(self.chain.send(&email).await?)
    }

    async fn succeeded(&self, store: &dyn Store, mut job: EmailJob, sent: &Sent, started: Instant) {
        let now = SystemTime::now();
        if let Err(e) = job.complete(now) {
            warn!(error = %e, "Could not complete job");
            return;
        }

        if !self.write_back(store, &job).await {
            return;
        }

        self.stats.record_success();
        audit::log_delivery_success(
            &job.id,
            &sent.provider,
            &sent.message_id,
            job.attempts,
            started.elapsed().as_millis(),
        );
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.jobs.record_attempt("success");
            metrics.jobs.record_completed(
                job.processing_duration().unwrap_or_default().as_secs_f64(),
                u64::from(job.attempts),
            );
        }

        if !job.tracked {
            return;
        }

        if let Some(tracking) = &self.tracking {
            let id = job.id;
            let provider = sent.provider.as_str();
            let message_id = sent.message_id.as_str();
            if let Err(e) = self
                .persist(move || tracking.record_sent(id, provider, message_id, now))
                .await
            {
                warn!(error = %e, "Could not record sent event");
            }
        }
    }

    async fn retry_later(
        &self,
        store: &dyn Store,
        mut job: EmailJob,
        error: &DeliveryError,
        at: SystemTime,
    ) {
        let message = error.to_string();
        if let Err(e) = job.schedule_retry(SystemTime::now(), at, &message) {
            warn!(error = %e, "Could not schedule retry");
            return;
        }

        if !self.write_back(store, &job).await {
            return;
        }

        self.stats.record_retry();
        audit::log_delivery_failure(&job.id, &message, job.attempts, JobStatus::Pending.as_str());
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.jobs.record_attempt("retry");
            metrics.jobs.record_retry();
        }

        info!(
            attempt = job.attempts,
            max_retries = job.max_retries,
            retry_in_ms = at
                .duration_since(SystemTime::now())
                .unwrap_or_default()
                .as_millis(),
            error = %message,
            "Delivery failed, retrying later"
        );

        self.queue.defer(job, at);
    }

    async fn failed(&self, store: &dyn Store, mut job: EmailJob, error: &DeliveryError) {
        let message = error.to_string();
        if let Err(e) = job.fail(SystemTime::now(), &message) {
            warn!(error = %e, "Could not fail job");
            return;
        }

        if !self.write_back(store, &job).await {
            return;
        }

        self.stats.record_failure();
        audit::log_delivery_failure(&job.id, &message, job.attempts, JobStatus::Failed.as_str());
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.jobs.record_attempt("failure");
            metrics.jobs.record_failed(error.reason());
        }

        warn!(attempts = job.attempts, error = %message, "Job failed permanently");
    }

    /// Hand the job back without an outcome, restoring its attempt count
    async fn release(&self, store: &dyn Store, mut job: EmailJob, attempts: u32) {
        let now = SystemTime::now();
        if let Err(e) = job.release(now) {
            warn!(error = %e, "Could not release job");
            return;
        }
        job.attempts = attempts;

        if self.write_back(store, &job).await {
            self.queue.defer(job, now + STORE_OUTAGE_BACKOFF);
        }
    }

    /// Persist the outcome of an attempt on a claimed job
    ///
    /// A job left `processing` because the processor stopped mid-outage is
    /// released by startup recovery. Returns whether the outcome stands.
    async fn write_back(&self, store: &dyn Store, job: &EmailJob) -> bool {
        if !job.tracked {
            return true;
        }

        match self
            .persist(move || store.update_job_if(job, JobStatus::Processing))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!("Claimed job changed underneath its worker, dropping outcome");
                false
            }
            Err(e) if e.is_not_found() => {
                warn!("Claimed job vanished from the store, dropping outcome");
                false
            }
            Err(e) => {
                warn!(error = %e, "Store unavailable while stopping, job will be recovered on restart");
                false
            }
        }
    }

    /// Run a store write until it lands
    ///
    /// Transient errors are retried with backoff. `NotFound` is returned
    /// straight away, as is any error once the processor is stopping.
    async fn persist<T, F, Fut>(&self, mut write: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut delay = STORE_RETRY_MIN;
        loop {
            match write().await {
                Err(e) if !e.is_not_found() && !self.is_stopping() => {
                    warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "Store write failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.stopped() => {}
                    }
                    delay = delay.saturating_mul(2).min(STORE_RETRY_MAX);
                }
                result => return result,
            }
        }
    }
}
