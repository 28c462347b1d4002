//! Audit logging for job lifecycle events
//!
//! Events are emitted as structured `tracing` events with an `event` field so
//! they can be filtered out of the regular log stream.
//!
//! ## Audit Events
//!
//! - `JobCreated`: a job passed validation and was accepted
//! - `DeliveryAttempt`: a worker claimed the job and is about to send
//! - `DeliverySuccess`: a provider accepted the email
//! - `DeliveryFailure`: an attempt failed, with the resulting status
//! - `JobCancelled`: a pending job was cancelled
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::Deserialize;

use crate::{EmailJob, JobId};

/// Audit logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging for job lifecycle events
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redact the local part of recipient addresses
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Initialize audit logging with configuration
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current audit configuration
#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if !redact {
        return email.to_string();
    }

    email
        .split_once('@')
        .map_or_else(|| "[REDACTED]".to_string(), |(_, domain)| format!("[REDACTED]@{domain}"))
}

/// Redact multiple email addresses
#[must_use]
pub fn redact_emails(emails: &[String], redact: bool) -> Vec<String> {
    emails.iter().map(|e| redact_email(e, redact)).collect()
}

pub fn log_job_created(job: &EmailJob) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "JobCreated",
        job_id = %job.id,
        kind = job.kind.as_str(),
        priority = %job.priority,
        recipients = ?redact_emails(&job.recipients, config.redact_recipients),
        recipient_count = job.recipients.len(),
        tracked = job.tracked,
        scheduled = job.scheduled_at.is_some(),
        "Audit: Job accepted"
    );
}

/// `attempt` is 1-based
pub fn log_delivery_attempt(job_id: &JobId, attempt: u32) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryAttempt",
        job_id = %job_id,
        delivery_attempt = attempt,
        "Audit: Delivery attempt"
    );
}

pub fn log_delivery_success(
    job_id: &JobId,
    provider: &str,
    message_id: &str,
    attempt: u32,
    duration_ms: u128,
) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliverySuccess",
        job_id = %job_id,
        provider = %provider,
        message_id = %message_id,
        delivery_attempt = attempt,
        duration_ms = duration_ms,
        "Audit: Delivery successful"
    );
}

/// `status` is the job status the failure led to (`pending` or `failed`)
pub fn log_delivery_failure(job_id: &JobId, error: &str, attempt: u32, status: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "DeliveryFailure",
        job_id = %job_id,
        error = %error,
        delivery_attempt = attempt,
        status = %status,
        "Audit: Delivery failed"
    );
}

pub fn log_job_cancelled(job_id: &JobId) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "JobCancelled",
        job_id = %job_id,
        "Audit: Job cancelled"
    );
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_email() {
        assert_eq!(
            redact_email("user@example.com", true),
            "[REDACTED]@example.com"
        );
        assert_eq!(redact_email("user@example.com", false), "user@example.com");
        assert_eq!(redact_email("invalid", true), "[REDACTED]");
    }

    #[test]
    fn test_redact_emails() {
        let emails = vec![
            "user1@example.com".to_string(),
            "user2@example.org".to_string(),
        ];

        assert_eq!(
            redact_emails(&emails, true),
            vec!["[REDACTED]@example.com", "[REDACTED]@example.org"]
        );
        assert_eq!(redact_emails(&emails, false), emails);
    }

    #[test]
    fn config_defaults_from_ron() {
        let config: AuditConfig = ron::from_str("(redact_recipients: true)").expect("valid ron");
        assert!(config.enabled);
        assert!(config.redact_recipients);
    }
}
