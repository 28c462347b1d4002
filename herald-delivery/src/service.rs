//! The narrow interface external services use to submit and inspect jobs
//!
//! Callers depend on [`JobService`] rather than on the processor, so
//! request handlers can be tested against a mock.

use std::time::SystemTime;

use async_trait::async_trait;
use herald_common::{
    DeliveryEvent, EmailJob, EmailTemplate, HealthReport, JobId, JobStatus, TemplateId,
    TrackingRecord, TransitionError, audit,
};
use herald_store::{JobStore, StoreError, TemplateStore};
use tracing::{debug, info};

use crate::{
    error::ServiceError,
    processor::JobProcessor,
    render,
    types::{CreateJobRequest, JobStats, JobStatusView, QueueStats, TimeRange},
};

#[async_trait]
pub trait JobService: Send + Sync {
    /// Validate and enqueue a job
    ///
    /// Only validation fails synchronously; delivery errors are recorded on
    /// the job and surface through [`JobService::get_job_status`].
    ///
    /// # Errors
    /// `Validation` for a malformed request, `Store` if a tracked job cannot be persisted.
    async fn create_job(&self, request: CreateJobRequest) -> Result<JobId, ServiceError>;

    /// Cancel a job that has not been claimed yet
    ///
    /// # Errors
    /// `Transition` if the job already left `pending`, `JobNotFound` if unknown.
    async fn cancel_job(&self, id: &JobId) -> Result<(), ServiceError>;

    /// # Errors
    /// `JobNotFound` for unknown and untracked jobs.
    async fn get_job_status(&self, id: &JobId) -> Result<JobStatusView, ServiceError>;

    /// # Errors
    /// If the store cannot be read.
    async fn get_job_stats(&self, range: TimeRange) -> Result<JobStats, ServiceError>;

    fn get_queue_stats(&self) -> QueueStats;

    async fn health_check(&self) -> HealthReport;

    /// # Errors
    /// `Validation` or `Template` for bad content, `Store` if the name is taken.
    async fn create_template(&self, template: EmailTemplate) -> Result<TemplateId, ServiceError>;

    /// # Errors
    /// `Store(NotFound)` for an unknown name.
    async fn get_template(&self, name: &str) -> Result<EmailTemplate, ServiceError>;

    /// # Errors
    /// `Validation` or `Template` for bad content, `Store` for an unknown id.
    async fn update_template(&self, template: EmailTemplate) -> Result<(), ServiceError>;

    /// # Errors
    /// `Store(NotFound)` for an unknown id.
    async fn delete_template(&self, id: &TemplateId) -> Result<(), ServiceError>;

    /// # Errors
    /// If the store cannot be read.
    async fn list_templates(&self) -> Result<Vec<EmailTemplate>, ServiceError>;

    /// Dead-lettered jobs, oldest first
    ///
    /// # Errors
    /// If the store cannot be read.
    async fn list_failed(&self, limit: usize) -> Result<Vec<EmailJob>, ServiceError>;

    /// # Errors
    /// If the store cannot be read.
    async fn list_pending(&self, limit: usize) -> Result<Vec<EmailJob>, ServiceError>;

    /// # Errors
    /// `Store(NotFound)` if the job has no trail.
    async fn get_tracking(&self, id: &JobId) -> Result<TrackingRecord, ServiceError>;

    /// Record a delivery event reported by a provider webhook
    ///
    /// # Errors
    /// `Store(NotFound)` if the job was never sent.
    async fn record_event(
        &self,
        id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> Result<TrackingRecord, ServiceError>;
}

fn check_template(template: &EmailTemplate) -> Result<(), ServiceError> {
    template.validate()?;
    render::check_template(template)
        .map_err(|(field, source)| ServiceError::Template { field, source })
}

fn job_not_found(id: &JobId, error: StoreError) -> ServiceError {
    if error.is_not_found() {
        ServiceError::JobNotFound(*id)
    } else {
        ServiceError::Store(error)
    }
}

impl JobProcessor {
    fn service_store(&self) -> Result<&dyn herald_store::Store, ServiceError> {
        self.store
            .as_deref()
            .ok_or(ServiceError::NotInitialized)
    }
}

#[async_trait]
impl JobService for JobProcessor {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn create_job(&self, request: CreateJobRequest) -> Result<JobId, ServiceError> {
        let store = self.service_store()?;
        let job = request.into_job(self.retry.max_retries, SystemTime::now())?;

        if job.tracked {
            store.create_job(&job).await?;
        }

        audit::log_job_created(&job);
        if let Some(metrics) = herald_metrics::metrics() {
            metrics
                .jobs
                .record_created(job.priority.as_str(), job.kind.as_str());
        }

        let id = job.id;
        self.queue.enqueue(job);
        self.publish_queue_size();
        Ok(id)
    }

    async fn cancel_job(&self, id: &JobId) -> Result<(), ServiceError> {
        let store = self.service_store()?;
        let now = SystemTime::now();

        let mut job = match store.get_job(id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                // Untracked jobs only exist in the queue
                return match self.queue.remove(id) {
                    Some(_) => {
                        audit::log_job_cancelled(id);
                        Ok(())
                    }
                    None => Err(ServiceError::JobNotFound(*id)),
                };
            }
            Err(e) => return Err(e.into()),
        };

        job.cancel(now)?;
        if !store.update_job_if(&job, JobStatus::Pending).await? {
            let current = store.get_job(id).await.map_err(|e| job_not_found(id, e))?;
            return Err(TransitionError {
                job_id: *id,
                from: current.status,
                to: JobStatus::Cancelled,
            }
            .into());
        }

        self.queue.remove(id);
        self.publish_queue_size();
        audit::log_job_cancelled(id);
        info!(job_id = %id, "Job cancelled");
        Ok(())
    }

    async fn get_job_status(&self, id: &JobId) -> Result<JobStatusView, ServiceError> {
        let store = self.service_store()?;
        let job = store.get_job(id).await.map_err(|e| job_not_found(id, e))?;
        Ok(JobStatusView::from(&job))
    }

    async fn get_job_stats(&self, range: TimeRange) -> Result<JobStats, ServiceError> {
        let store = self.service_store()?;
        let jobs = store.list_created_between(range.from, range.to).await?;
        Ok(JobStats::from_jobs(&jobs))
    }

    fn get_queue_stats(&self) -> QueueStats {
        let stats = self.stats.snapshot();
        QueueStats {
            queue_size: self.queue.len() as u64,
            scheduled_size: self.queue.scheduled_len() as u64,
            active_workers: stats.active_workers,
            processed: stats.processed,
            succeeded: stats.succeeded,
            failed: stats.failed,
            retried: stats.retried,
        }
    }

    async fn health_check(&self) -> HealthReport {
        let store_healthy = match self.service_store() {
            Ok(store) => match store.ping().await {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Store ping failed");
                    false
                }
            },
            Err(_) => false,
        };

        let queue = self.get_queue_stats();
        let queue_healthy = self.queue.total() < self.max_queue_size;

        HealthReport::new(queue_healthy, store_healthy, self.chain.health()).with_queue(
            queue.queue_size,
            queue.scheduled_size,
            queue.active_workers,
        )
    }

    async fn create_template(&self, template: EmailTemplate) -> Result<TemplateId, ServiceError> {
        let store = self.service_store()?;
        check_template(&template)?;
        Ok(store.create_template(&template).await?)
    }

    async fn get_template(&self, name: &str) -> Result<EmailTemplate, ServiceError> {
        Ok(self.service_store()?.get_template(name).await?)
    }

    async fn update_template(&self, mut template: EmailTemplate) -> Result<(), ServiceError> {
        let store = self.service_store()?;
        check_template(&template)?;
        template.updated_at = SystemTime::now();
        Ok(store.update_template(&template).await?)
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<(), ServiceError> {
        Ok(self.service_store()?.delete_template(id).await?)
    }

    async fn list_templates(&self) -> Result<Vec<EmailTemplate>, ServiceError> {
        Ok(self.service_store()?.list_templates().await?)
    }

    async fn list_failed(&self, limit: usize) -> Result<Vec<EmailJob>, ServiceError> {
        Ok(self.service_store()?.list_failed(limit).await?)
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<EmailJob>, ServiceError> {
        Ok(self.service_store()?.list_pending(limit).await?)
    }

    async fn get_tracking(&self, id: &JobId) -> Result<TrackingRecord, ServiceError> {
        let tracking = self.tracking.as_ref().ok_or(ServiceError::NotInitialized)?;
        Ok(tracking.get(id).await?)
    }

    async fn record_event(
        &self,
        id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> Result<TrackingRecord, ServiceError> {
        let tracking = self.tracking.as_ref().ok_or(ServiceError::NotInitialized)?;
        Ok(tracking.record_event(id, event, at, detail).await?)
    }
}
