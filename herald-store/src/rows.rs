//! Row-level helpers shared by every backend

use std::{cmp::Ordering, time::SystemTime};

use herald_common::{EmailJob, JobStatus};

/// Apply an unconditional status write to a job row
pub fn apply_status(
    job: &mut EmailJob,
    status: JobStatus,
    error_message: Option<String>,
    at: Option<SystemTime>,
) {
    let now = SystemTime::now();
    let at = at.unwrap_or(now);

    match status {
        JobStatus::Processing => {
            job.processing_started_at.get_or_insert(at);
        }
        JobStatus::Completed | JobStatus::Failed => {
            job.completed_at.get_or_insert(at);
        }
        JobStatus::Pending | JobStatus::Cancelled => {}
    }

    if error_message.is_some() {
        job.error_message = error_message;
    }

    job.status = status;
    job.updated_at = now.max(at);
}

/// Queue order: priority rank, then age
pub fn by_priority_then_age(a: &EmailJob, b: &EmailJob) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn by_age(a: &EmailJob, b: &EmailJob) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Whether the retention sweep may delete this row
pub fn is_expired(job: &EmailJob, cutoff: SystemTime) -> bool {
    job.status.is_terminal() && job.updated_at < cutoff
}
