//! Typed error handling for job processing.
//!
//! Failures are split by what the worker pool does with the job:
//! - Permanent failures fail the job without consuming a retry
//! - Temporary failures consume an attempt and are retried with backoff
//! - System failures leave the job unmarked until the store recovers

use std::time::Duration;

use herald_common::{JobId, TransitionError, ValidationError};
use herald_store::StoreError;
use thiserror::Error;

use crate::{provider::ProviderError, render::RenderError};

/// Top-level error for a single delivery attempt
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// The job can never succeed as submitted
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Unknown or inactive template
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to render {field}: {source}")]
    Render {
        field: &'static str,
        #[source]
        source: RenderError,
    },
}

/// Worth another attempt after a backoff
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Every provider in the chain failed
    #[error("All {attempted} providers failed, last error from {provider}: {source}")]
    AllProvidersFailed {
        attempted: usize,
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("No providers configured")]
    NoProviders,

    /// The attempt ran past the per-job processing timeout
    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job processor not initialized: {0}")]
    NotInitialized(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// Short label used for metrics attributes
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Permanent(PermanentError::TemplateNotFound(_)) => "template_not_found",
            Self::Permanent(PermanentError::Render { .. }) => "render",
            Self::Temporary(TemporaryError::Timeout(_)) => "timeout",
            Self::Temporary(_) => "provider",
            Self::System(_) => "system",
        }
    }
}

impl From<StoreError> for DeliveryError {
    fn from(error: StoreError) -> Self {
        Self::System(SystemError::Store(error))
    }
}

/// Errors returned to callers of the job service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rejected synchronously; nothing was enqueued
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A template pattern has unbalanced placeholders
    #[error("Invalid template {field}: {source}")]
    Template {
        field: &'static str,
        #[source]
        source: RenderError,
    },

    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Job processor not initialized")]
    NotInitialized,
}

impl ServiceError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::JobNotFound(_) | Self::Store(StoreError::NotFound { .. })
        )
    }
}
