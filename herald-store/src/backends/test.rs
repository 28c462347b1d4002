use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use herald_common::{
    DeliveryEvent, EmailJob, EmailTemplate, JobId, JobStatus, TemplateId, TrackingRecord,
};
use tokio::sync::Notify;

use super::memory::MemoryStore;
use crate::{
    StoreError,
    store::{JobStore, TemplateStore, TrackingStore},
};

/// Testing utilities for the memory store
///
/// Adds waiting on job state changes and an outage switch that makes every
/// operation fail with [`StoreError::Unavailable`]. Tracking writes can also
/// be failed on their own.
#[derive(Debug, Clone, Default)]
pub struct TestStore {
    pub(crate) inner: MemoryStore,
    notify: Arc<Notify>,
    unavailable: Arc<AtomicBool>,
    tracking_failures: Arc<AtomicU32>,
    writes: Arc<AtomicU64>,
}

impl TestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing store going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Fail the next `count` tracking writes as if the store were offline
    pub fn fail_tracking_writes(&self, count: u32) {
        self.tracking_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful job writes so far
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Get the number of stored jobs
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.inner.len()
    }

    /// Wait until the stored job reaches `status`
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first.
    pub async fn wait_for_status(
        &self,
        id: &JobId,
        status: JobStatus,
        timeout: Duration,
    ) -> crate::Result<EmailJob> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if let Some(job) = self.inner.jobs.get(id).map(|job| job.clone())
                    && job.status == status
                {
                    return job;
                }
                notified.await;
            }
        })
        .await
        .map_err(|e| StoreError::Internal(format!("Timeout waiting for {id} to be {status}: {e}")))
    }

    fn check(&self) -> crate::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("test store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn written(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl JobStore for TestStore {
    async fn create_job(&self, job: &EmailJob) -> crate::Result<JobId> {
        self.check()?;
        let id = self.inner.create_job(job).await?;
        self.written();
        Ok(id)
    }

    async fn get_job(&self, id: &JobId) -> crate::Result<EmailJob> {
        self.check()?;
        self.inner.get_job(id).await
    }

    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
        at: Option<SystemTime>,
    ) -> crate::Result<()> {
        self.check()?;
        self.inner.update_status(id, status, error_message, at).await?;
        self.written();
        Ok(())
    }

    async fn update_job_if(&self, job: &EmailJob, expected: JobStatus) -> crate::Result<bool> {
        self.check()?;
        let updated = self.inner.update_job_if(job, expected).await?;
        if updated {
            self.written();
        }
        Ok(updated)
    }

    async fn list_pending(&self, limit: usize) -> crate::Result<Vec<EmailJob>> {
        self.check()?;
        self.inner.list_pending(limit).await
    }

    async fn list_failed(&self, limit: usize) -> crate::Result<Vec<EmailJob>> {
        self.check()?;
        self.inner.list_failed(limit).await
    }

    async fn list_by_status(&self, status: JobStatus) -> crate::Result<Vec<EmailJob>> {
        self.check()?;
        self.inner.list_by_status(status).await
    }

    async fn list_created_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> crate::Result<Vec<EmailJob>> {
        self.check()?;
        self.inner.list_created_between(from, to).await
    }

    async fn increment_retry(&self, id: &JobId) -> crate::Result<u32> {
        self.check()?;
        let attempts = self.inner.increment_retry(id).await?;
        self.written();
        Ok(attempts)
    }

    async fn cleanup_older_than(&self, cutoff: SystemTime) -> crate::Result<u64> {
        self.check()?;
        self.inner.cleanup_older_than(cutoff).await
    }

    async fn ping(&self) -> crate::Result<()> {
        self.check()
    }
}

#[async_trait]
impl TemplateStore for TestStore {
    async fn create_template(&self, template: &EmailTemplate) -> crate::Result<TemplateId> {
        self.check()?;
        self.inner.create_template(template).await
    }

    async fn get_template(&self, name: &str) -> crate::Result<EmailTemplate> {
        self.check()?;
        self.inner.get_template(name).await
    }

    async fn get_template_by_id(&self, id: &TemplateId) -> crate::Result<EmailTemplate> {
        self.check()?;
        self.inner.get_template_by_id(id).await
    }

    async fn update_template(&self, template: &EmailTemplate) -> crate::Result<()> {
        self.check()?;
        self.inner.update_template(template).await
    }

    async fn delete_template(&self, id: &TemplateId) -> crate::Result<()> {
        self.check()?;
        self.inner.delete_template(id).await
    }

    async fn list_templates(&self) -> crate::Result<Vec<EmailTemplate>> {
        self.check()?;
        self.inner.list_templates().await
    }
}

#[async_trait]
impl TrackingStore for TestStore {
    async fn put_tracking(&self, record: &TrackingRecord) -> crate::Result<()> {
        self.check()?;
        if self
            .tracking_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("tracking writes are failing".to_string()));
        }
        self.inner.put_tracking(record).await?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn apply_tracking_event(
        &self,
        job_id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> crate::Result<TrackingRecord> {
        self.check()?;
        self.inner
            .apply_tracking_event(job_id, event, at, detail)
            .await
    }

    async fn get_tracking(&self, job_id: &JobId) -> crate::Result<TrackingRecord> {
        self.check()?;
        self.inner.get_tracking(job_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_common::{JobContent, JobKind};

    use super::*;

    #[tokio::test]
    async fn outage_switch_fails_everything() {
        let store = TestStore::new();
        let job = EmailJob::new(
            JobKind::General,
            vec!["a@example.com".to_string()],
            JobContent::template("t"),
        );

        store.set_unavailable(true);
        assert!(matches!(
            store.create_job(&job).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());

        store.set_unavailable(false);
        store.create_job(&job).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn tracking_writes_fail_on_request() {
        let store = TestStore::new();
        let job = EmailJob::new(
            JobKind::General,
            vec!["a@example.com".to_string()],
            JobContent::template("t"),
        );
        store.create_job(&job).await.unwrap();
        let record = TrackingRecord::sent(job.id, "log", "m-1", SystemTime::now());

        store.fail_tracking_writes(1);
        assert!(matches!(
            store.put_tracking(&record).await,
            Err(StoreError::Unavailable(_))
        ));
        store.put_tracking(&record).await.unwrap();
        assert_eq!(store.get_tracking(&job.id).await.unwrap().message_id, "m-1");
    }

    #[tokio::test]
    async fn wait_for_status_wakes_on_write() {
        let store = TestStore::new();
        let job = EmailJob::new(
            JobKind::General,
            vec!["a@example.com".to_string()],
            JobContent::template("t"),
        );
        store.create_job(&job).await.unwrap();

        let waiter = {
            let store = store.clone();
            let id = job.id;
            tokio::spawn(async move {
                store
                    .wait_for_status(&id, JobStatus::Cancelled, Duration::from_secs(5))
                    .await
            })
        };

        tokio::task::yield_now().await;
        store
            .update_status(&job.id, JobStatus::Cancelled, None, None)
            .await
            .unwrap();

        let cancelled = waiter.await.unwrap().unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
    }
}
