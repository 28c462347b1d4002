//! Rebuild the queue from the job store at startup

use std::time::SystemTime;

use herald_common::JobStatus;
use herald_store::{JobStore, Store};
use tracing::{debug, warn};

use crate::{error::DeliveryError, processor::JobProcessor};

const INTERRUPTED_EXHAUSTED: &str = "Delivery interrupted on the last allowed attempt";

/// Enqueue every tracked job that still has work left
///
/// `pending` jobs go back in as they are, honouring `scheduled_at`. Jobs left
/// `processing` by a crash are released to `pending` first; the interrupted
/// attempt still counts towards their retry bound, so a job whose last
/// attempt was interrupted is failed instead of sent again.
///
/// # Errors
/// If the store cannot be read.
pub async fn recover(processor: &JobProcessor, store: &dyn Store) -> Result<usize, DeliveryError> {
    let now = SystemTime::now();
    let mut restored = 0;

    for mut job in store.list_by_status(JobStatus::Processing).await? {
        let exhausted = job.attempts_exhausted();
        let settled = if exhausted {
            job.fail(now, INTERRUPTED_EXHAUSTED)
        } else {
            job.release(now)
        };
        if settled.is_err() {
            continue;
        }

        match store.update_job_if(&job, JobStatus::Processing).await {
            Ok(true) if exhausted => {
                warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    max_retries = job.max_retries,
                    "Interrupted job has no attempts left, failing it"
                );
                processor.stats.record_failure();
            }
            Ok(true) => {
                debug!(job_id = %job.id, attempts = job.attempts, "Released interrupted job");
                if processor.queue.enqueue_at(job, now) {
                    restored += 1;
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not release interrupted job");
            }
        }
    }

    for job in store.list_by_status(JobStatus::Pending).await? {
        if processor.queue.enqueue_at(job, now) {
            restored += 1;
        }
    }

    processor.publish_queue_size();
    Ok(restored)
}
