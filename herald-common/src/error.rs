//! Error types for the herald-common crate.

use thiserror::Error;

use crate::{JobId, JobStatus};

/// A creation or administration request was malformed.
///
/// These are returned synchronously to the caller; a job that fails
/// validation is never enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The recipient list is empty.
    #[error("At least one recipient is required")]
    NoRecipients,

    /// A CC or BCC list was supplied but is empty.
    #[error("The {0} list must not be empty when present")]
    EmptyAddressList(&'static str),

    /// An address is not of the form `local@domain`.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Inline content without a subject.
    #[error("A subject is required")]
    MissingSubject,

    /// Neither an HTML nor a plain-text body was supplied.
    #[error("At least one of the HTML or text body is required")]
    MissingBody,

    /// A required field was empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Both a template and inline content were supplied.
    #[error("A job takes either a template or inline content, not both")]
    ConflictingContent,
}

/// A status change was requested that the job state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job {job_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}
