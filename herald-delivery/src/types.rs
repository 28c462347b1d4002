//! Request and view types of the job service

use std::time::{Duration, SystemTime};

use herald_common::{
    EmailJob, JobContent, JobId, JobKind, JobStatus, Priority, ValidationError, VariableValue,
    Variables,
};
use serde::{Deserialize, Serialize};

/// Subject and bodies supplied with a job instead of a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InlineContent {
    pub subject: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A request to send one email
///
/// Exactly one of `template` and `content` must be set. A `scheduled_at`
/// that has already passed means "send now".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub kind: JobKind,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Option<Vec<String>>,
    #[serde(default)]
    pub bcc: Option<Vec<String>>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub content: Option<InlineContent>,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub priority: Priority,
    /// Falls back to the processor's retry policy
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub scheduled_at: Option<SystemTime>,
    /// Ask for the job to be persisted and queryable; some jobs are tracked regardless
    #[serde(default)]
    pub tracked: bool,
}

impl CreateJobRequest {
    /// Send the named template to `recipients`
    #[must_use]
    pub fn template<I, S>(recipients: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            template: Some(name.into()),
            ..Self::default()
        }
    }

    /// Send inline content to `recipients`
    #[must_use]
    pub fn inline<I, S>(recipients: I, subject: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            content: Some(InlineContent {
                subject: subject.into(),
                ..InlineContent::default()
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.content.get_or_insert_with(InlineContent::default).html = Some(html.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.get_or_insert_with(InlineContent::default).text = Some(text.into());
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_cc(mut self, cc: Vec<String>) -> Self {
        self.cc = Some(cc);
        self
    }

    #[must_use]
    pub fn with_bcc(mut self, bcc: Vec<String>) -> Self {
        self.bcc = Some(bcc);
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.variables.insert(key, value);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub const fn scheduled_at(mut self, at: SystemTime) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    #[must_use]
    pub const fn tracked(mut self) -> Self {
        self.tracked = true;
        self
    }

    /// Turn the request into a validated, pending job
    ///
    /// # Errors
    /// The first problem with the request; nothing is created.
    pub fn into_job(
        self,
        default_max_retries: u32,
        now: SystemTime,
    ) -> Result<EmailJob, ValidationError> {
        let content = match (self.template, self.content) {
            (Some(_), Some(_)) => return Err(ValidationError::ConflictingContent),
            (None, None) => return Err(ValidationError::MissingField("template or content")),
            (Some(name), None) => JobContent::Template { name },
            (None, Some(inline)) => JobContent::Inline {
                subject: inline.subject,
                html: inline.html,
                text: inline.text,
            },
        };

        let mut job = EmailJob::new(self.kind, self.recipients, content);
        job.cc = self.cc;
        job.bcc = self.bcc;
        job.variables = self.variables;
        job.priority = self.priority;
        job.max_retries = self.max_retries.unwrap_or(default_max_retries);
        job.scheduled_at = self.scheduled_at.filter(|at| *at > now);
        job.tracked = self.tracked;
        job.tracked = job.should_be_tracked();

        job.validate()?;
        Ok(job)
    }
}

/// What a caller may learn about a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub scheduled_at: Option<SystemTime>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub processing_started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

impl From<&EmailJob> for JobStatusView {
    fn from(job: &EmailJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            attempts: job.attempts,
            max_retries: job.max_retries,
            error_message: job.error_message.clone(),
            scheduled_at: job.scheduled_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            processing_started_at: job.processing_started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Creation-time window, `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: SystemTime,
    pub to: SystemTime,
}

impl TimeRange {
    #[must_use]
    pub const fn new(from: SystemTime, to: SystemTime) -> Self {
        Self { from, to }
    }

    /// The window ending now
    #[must_use]
    pub fn last(window: Duration) -> Self {
        let to = SystemTime::now();
        Self {
            from: to.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH),
            to,
        }
    }
}

/// Outcome statistics over the tracked jobs created in a [`TimeRange`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    /// Pending or processing
    pub pending: u64,
    pub cancelled: u64,
    /// Jobs that needed more than one attempt
    pub retried: u64,
    /// `completed / (completed + failed)`, zero when nothing has finished
    pub success_rate: f64,
    /// Mean time from first claim to completion of completed jobs
    pub avg_processing_time: Option<Duration>,
}

impl JobStats {
    #[must_use]
    pub fn from_jobs(jobs: &[EmailJob]) -> Self {
        let mut stats = Self::default();
        let mut processing_total = Duration::ZERO;
        let mut timed: u32 = 0;

        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Pending | JobStatus::Processing => stats.pending += 1,
                JobStatus::Completed => {
                    stats.completed += 1;
                    if let Some(duration) = job.processing_duration() {
                        processing_total += duration;
                        timed += 1;
                    }
                }
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            if job.attempts > 1 {
                stats.retried += 1;
            }
        }

        let finished = stats.completed + stats.failed;
        if finished > 0 {
            #[allow(clippy::cast_precision_loss)]
            let rate = stats.completed as f64 / finished as f64;
            stats.success_rate = rate;
        }
        if timed > 0 {
            stats.avg_processing_time = Some(processing_total / timed);
        }

        stats
    }
}

/// Current load of the queue and the worker pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs eligible to run now
    pub queue_size: u64,
    /// Jobs waiting for their scheduled instant
    pub scheduled_size: u64,
    pub active_workers: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}
