use std::{fmt::Debug, time::SystemTime};

use async_trait::async_trait;
use herald_common::{
    DeliveryEvent, EmailJob, EmailTemplate, JobId, JobStatus, TemplateId, TrackingRecord,
};

use crate::Result;

/// Durable record of every tracked job
///
/// All writes are atomic per job row. Status transitions made by workers go
/// through [`JobStore::update_job_if`], a compare-and-update on the current
/// status, so two workers racing on the same job cannot both claim it.
#[async_trait]
pub trait JobStore: Send + Sync + Debug {
    /// Persist a new job
    ///
    /// # Errors
    /// `AlreadyExists` if a job with the same id is stored.
    async fn create_job(&self, job: &EmailJob) -> Result<JobId>;

    /// # Errors
    /// `NotFound` if no job has this id.
    async fn get_job(&self, id: &JobId) -> Result<EmailJob>;

    /// Unconditionally set the status of a job
    ///
    /// `at` stamps the matching lifecycle timestamp (processing-started for
    /// `processing`, completion for `completed`/`failed`) and defaults to now.
    /// The last-updated timestamp always moves.
    ///
    /// # Errors
    /// `NotFound` if no job has this id.
    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
        at: Option<SystemTime>,
    ) -> Result<()>;

    /// Replace the stored job with `job` only if its stored status is `expected`
    ///
    /// Returns `Ok(false)` when the stored status differs, which means another
    /// worker (or a cancellation) got there first.
    ///
    /// # Errors
    /// `NotFound` if no job has this id.
    async fn update_job_if(&self, job: &EmailJob, expected: JobStatus) -> Result<bool>;

    /// Pending jobs by priority, then creation time
    ///
    /// # Errors
    /// If the backing store cannot be read.
    async fn list_pending(&self, limit: usize) -> Result<Vec<EmailJob>>;

    /// Dead-lettered jobs, oldest first
    ///
    /// # Errors
    /// If the backing store cannot be read.
    async fn list_failed(&self, limit: usize) -> Result<Vec<EmailJob>>;

    /// All jobs currently in `status`, oldest first
    ///
    /// # Errors
    /// If the backing store cannot be read.
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<EmailJob>>;

    /// Jobs created in `[from, to)`
    ///
    /// # Errors
    /// If the backing store cannot be read.
    async fn list_created_between(&self, from: SystemTime, to: SystemTime)
    -> Result<Vec<EmailJob>>;

    /// Bump the attempt counter, returning the new value
    ///
    /// # Errors
    /// `NotFound` if no job has this id.
    async fn increment_retry(&self, id: &JobId) -> Result<u32>;

    /// Delete terminal jobs last updated before `cutoff`, with their tracking records
    ///
    /// # Errors
    /// If the backing store cannot be written.
    async fn cleanup_older_than(&self, cutoff: SystemTime) -> Result<u64>;

    /// Cheap reachability check
    ///
    /// # Errors
    /// `Unavailable` if the store cannot be reached.
    async fn ping(&self) -> Result<()>;
}

/// Named templates, unique by name
#[async_trait]
pub trait TemplateStore: Send + Sync + Debug {
    /// # Errors
    /// `AlreadyExists` if the name is taken.
    async fn create_template(&self, template: &EmailTemplate) -> Result<TemplateId>;

    /// Look a template up by name, whether or not it is active
    ///
    /// # Errors
    /// `NotFound` if no template has this name.
    async fn get_template(&self, name: &str) -> Result<EmailTemplate>;

    /// # Errors
    /// `NotFound` if no template has this id.
    async fn get_template_by_id(&self, id: &TemplateId) -> Result<EmailTemplate>;

    /// Replace the template with the same id, renaming it if needed
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `AlreadyExists` if renamed onto a taken name.
    async fn update_template(&self, template: &EmailTemplate) -> Result<()>;

    /// # Errors
    /// `NotFound` if no template has this id.
    async fn delete_template(&self, id: &TemplateId) -> Result<()>;

    /// All templates sorted by name
    ///
    /// # Errors
    /// If the backing store cannot be read.
    async fn list_templates(&self) -> Result<Vec<EmailTemplate>>;
}

/// Delivery trails, one per tracked job
#[async_trait]
pub trait TrackingStore: Send + Sync + Debug {
    /// Insert or replace the record for `record.job_id`
    ///
    /// # Errors
    /// `NotFound` if the referenced job does not exist.
    async fn put_tracking(&self, record: &TrackingRecord) -> Result<()>;

    /// Atomically apply one delivery event to an existing record
    ///
    /// # Errors
    /// `NotFound` if the job has no tracking record yet.
    async fn apply_tracking_event(
        &self,
        job_id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> Result<TrackingRecord>;

    /// # Errors
    /// `NotFound` if the job has no tracking record.
    async fn get_tracking(&self, job_id: &JobId) -> Result<TrackingRecord>;
}

/// A backend holding all three tables
pub trait Store: JobStore + TemplateStore + TrackingStore {}

impl<T: JobStore + TemplateStore + TrackingStore> Store for T {}
