//! The email job and its lifecycle.
//!
//! ```text
//! pending --claim--> processing --success--> completed
//!                    processing --failure, attempts remain--> pending (scheduled)
//!                    processing --failure, attempts exhausted--> failed
//! pending --cancel--> cancelled
//! ```
//!
//! `completed`, `failed` and `cancelled` are terminal. Every transition goes
//! through a method on [`EmailJob`] so the timestamps stay consistent with the
//! status; stores persist the result with a compare-and-update on the status
//! the job had before the transition.

use std::{
    fmt,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

use crate::{JobId, TransitionError, ValidationError, Variables};

/// Default number of retries beyond the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job urgency, `Urgent` sorts first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];

    /// Sort rank, lower runs earlier
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// No further transitions occur from a terminal status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the email is for
///
/// Security, verification and payment related kinds are always tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Verification,
    PasswordReset,
    Payment,
    Booking,
    Invoice,
    Invitation,
    Welcome,
    Notification,
    #[default]
    General,
}

impl JobKind {
    #[must_use]
    pub const fn requires_tracking(self) -> bool {
        matches!(
            self,
            Self::Verification
                | Self::PasswordReset
                | Self::Payment
                | Self::Booking
                | Self::Invoice
                | Self::Invitation
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::PasswordReset => "password_reset",
            Self::Payment => "payment",
            Self::Booking => "booking",
            Self::Invoice => "invoice",
            Self::Invitation => "invitation",
            Self::Welcome => "welcome",
            Self::Notification => "notification",
            Self::General => "general",
        }
    }
}

/// Where the email content comes from, exactly one source per job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobContent {
    /// Resolve the named template at send time
    Template { name: String },
    /// Subject and bodies supplied with the job, still subject to substitution
    Inline {
        subject: String,
        html: Option<String>,
        text: Option<String>,
    },
}

impl JobContent {
    #[must_use]
    pub fn template(name: impl Into<String>) -> Self {
        Self::Template { name: name.into() }
    }

    /// Name of the template, if this job renders one
    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        match self {
            Self::Template { name } => Some(name),
            Self::Inline { .. } => None,
        }
    }
}

/// One requested email send with its own lifecycle and retry state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: JobId,
    pub kind: JobKind,
    pub recipients: Vec<String>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub content: JobContent,
    pub variables: Variables,
    pub priority: Priority,
    /// Absent means run as soon as possible
    pub scheduled_at: Option<SystemTime>,
    /// Number of delivery attempts started so far
    pub attempts: u32,
    /// Retries allowed beyond the first attempt
    pub max_retries: u32,
    pub status: JobStatus,
    /// Whether the job is persisted and its delivery events recorded
    pub tracked: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub processing_started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub error_message: Option<String>,
}

impl EmailJob {
    /// Create a pending, untracked job of normal priority
    #[must_use]
    pub fn new(kind: JobKind, recipients: Vec<String>, content: JobContent) -> Self {
        let now = SystemTime::now();
        Self {
            id: JobId::generate(),
            kind,
            recipients,
            cc: None,
            bcc: None,
            content,
            variables: Variables::new(),
            priority: Priority::default(),
            scheduled_at: None,
            attempts: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            status: JobStatus::Pending,
            tracked: false,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Whether lifecycle events for this job must be durably recorded
    ///
    /// Important kinds, high or urgent priority and scheduled jobs are always
    /// tracked; anything else follows the caller's flag.
    #[must_use]
    pub fn should_be_tracked(&self) -> bool {
        self.kind.requires_tracking()
            || self.priority <= Priority::High
            || self.scheduled_at.is_some()
            || self.tracked
    }

    /// Validate addressing and content
    ///
    /// # Errors
    ///
    /// Returns the first problem found with the job.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }
        validate_addresses(&self.recipients)?;

        for (label, list) in [("cc", &self.cc), ("bcc", &self.bcc)] {
            if let Some(list) = list {
                if list.is_empty() {
                    return Err(ValidationError::EmptyAddressList(label));
                }
                validate_addresses(list)?;
            }
        }

        match &self.content {
            JobContent::Template { name } if name.trim().is_empty() => {
                Err(ValidationError::MissingField("template name"))
            }
            JobContent::Template { .. } => Ok(()),
            JobContent::Inline { subject, .. } if subject.trim().is_empty() => {
                Err(ValidationError::MissingSubject)
            }
            JobContent::Inline { html, text, .. }
                if is_blank(html.as_deref()) && is_blank(text.as_deref()) =>
            {
                Err(ValidationError::MissingBody)
            }
            JobContent::Inline { .. } => Ok(()),
        }
    }

    /// Whether the job may run at `now`
    #[must_use]
    pub fn is_due(&self, now: SystemTime) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at.is_none_or(|at| at <= now)
    }

    /// Claim the job for a delivery attempt
    ///
    /// # Errors
    ///
    /// Fails unless the job is `pending`.
    pub fn start_processing(&mut self, now: SystemTime) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending, JobStatus::Processing, now)?;
        self.attempts = self.attempts.saturating_add(1);
        self.processing_started_at.get_or_insert(now);
        self.scheduled_at = None;
        Ok(())
    }

    /// Record a successful send
    ///
    /// # Errors
    ///
    /// Fails unless the job is `processing`.
    pub fn complete(&mut self, now: SystemTime) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Completed, now)?;
        self.completed_at.get_or_insert(now);
        Ok(())
    }

    /// Put the job back to `pending`, eligible again at `retry_at`
    ///
    /// # Errors
    ///
    /// Fails unless the job is `processing`.
    pub fn schedule_retry(
        &mut self,
        now: SystemTime,
        retry_at: SystemTime,
        error: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Pending, now)?;
        self.scheduled_at = Some(retry_at);
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Move the job to the dead-letter state
    ///
    /// # Errors
    ///
    /// Fails unless the job is `processing`.
    pub fn fail(&mut self, now: SystemTime, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Failed, now)?;
        self.completed_at.get_or_insert(now);
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Cancel a job that has not been claimed yet
    ///
    /// # Errors
    ///
    /// Fails unless the job is `pending`; a job already `processing` runs to completion.
    pub fn cancel(&mut self, now: SystemTime) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending, JobStatus::Cancelled, now)
    }

    /// Hand an interrupted job back to the queue
    ///
    /// The interrupted attempt still counts towards the retry bound.
    ///
    /// # Errors
    ///
    /// Fails unless the job is `processing`.
    pub fn release(&mut self, now: SystemTime) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Pending, now)
    }

    /// Whether a failure of the current attempt is terminal
    #[must_use]
    pub const fn attempts_exhausted(&self) -> bool {
        self.attempts > self.max_retries
    }

    /// Time from the first claim to completion
    #[must_use]
    pub fn processing_duration(&self) -> Option<Duration> {
        let started = self.processing_started_at?;
        self.completed_at?.duration_since(started).ok()
    }

    fn transition(
        &mut self,
        from: JobStatus,
        to: JobStatus,
        now: SystemTime,
    ) -> Result<(), TransitionError> {
        if self.status != from {
            return Err(TransitionError {
                job_id: self.id,
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn validate_addresses(addresses: &[String]) -> Result<(), ValidationError> {
    addresses
        .iter()
        .find(|address| !is_valid_address(address))
        .map_or(Ok(()), |bad| Err(ValidationError::InvalidAddress(bad.clone())))
}

/// Minimal `local@domain` syntax check
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}
