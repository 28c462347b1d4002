//! Retention sweep for finished jobs
//!
//! Terminal jobs (completed, failed, cancelled) whose last update is older
//! than the retention horizon are deleted together with their tracking
//! records. Jobs with work left are never touched.

use std::time::SystemTime;

use herald_store::JobStore;
use tracing::{debug, info};

use crate::{error::DeliveryError, processor::JobProcessor};

/// Run one sweep, returning the number of jobs deleted
///
/// # Errors
/// If the processor has no store or the store cannot be written.
#[tracing::instrument(level = "debug", skip(processor), ret, err)]
pub async fn sweep(processor: &JobProcessor) -> Result<u64, DeliveryError> {
    let store = processor.store()?;
    let cutoff = SystemTime::now()
        .checked_sub(processor.retention())
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let deleted = store.cleanup_older_than(cutoff).await?;

    if deleted > 0 {
        info!(
            deleted,
            retention_days = processor.retention_days,
            "Retention sweep removed finished jobs"
        );
    } else {
        debug!("Retention sweep found nothing to remove");
    }

    Ok(deleted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use herald_common::{EmailJob, JobContent, JobKind, JobStatus};
    use herald_store::{JobStore, MemoryStore};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::provider::ProviderChain;

    fn stored(status: JobStatus, updated_days_ago: u64) -> EmailJob {
        let mut job = EmailJob::new(
            JobKind::Payment,
            vec!["a@example.com".to_string()],
            JobContent::template("receipt"),
        );
        job.tracked = true;
        job.status = status;
        job.updated_at = SystemTime::now() - Duration::from_secs(updated_days_ago * 86_400);
        job
    }

    #[tokio::test]
    async fn removes_only_old_terminal_jobs() {
        let store = Arc::new(MemoryStore::new());
        let old_done = stored(JobStatus::Completed, 40);
        let old_failed = stored(JobStatus::Failed, 31);
        let recent_done = stored(JobStatus::Completed, 2);
        let old_pending = stored(JobStatus::Pending, 90);

        for job in [&old_done, &old_failed, &recent_done, &old_pending] {
            store.create_job(job).await.unwrap();
        }

        let mut processor = JobProcessor::default();
        processor.init(store.clone(), ProviderChain::default());

        assert_eq!(sweep(&processor).await.unwrap(), 2);
        assert!(store.get_job(&old_done.id).await.unwrap_err().is_not_found());
        assert!(store.get_job(&recent_done.id).await.is_ok());
        assert!(store.get_job(&old_pending.id).await.is_ok());
    }

    #[tokio::test]
    async fn sweep_needs_a_store() {
        assert!(sweep(&JobProcessor::default()).await.is_err());
    }
}
