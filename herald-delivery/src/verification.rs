//! Email verification flow: PIN codes and the emails that carry them

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use herald_common::{JobId, JobKind, Priority};
use rand::Rng;
use serde::Deserialize;

use crate::{error::ServiceError, service::JobService, types::CreateJobRequest};

pub const VERIFICATION_TEMPLATE: &str = "email_verification";
pub const REMINDER_TEMPLATE: &str = "email_verification_reminder";

const fn default_expiry_minutes() -> u64 {
    15
}

const fn default_reminder_expiry_minutes() -> u64 {
    30
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerificationConfig {
    /// Public URL of the site hosting `/verify-email`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u64,

    #[serde(default = "default_reminder_expiry_minutes")]
    pub reminder_expiry_minutes: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            expiry_minutes: default_expiry_minutes(),
            reminder_expiry_minutes: default_reminder_expiry_minutes(),
        }
    }
}

/// Who is being verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

/// A code that has been sent out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub job_id: JobId,
    pub pin: String,
    pub url: String,
    pub expires_at: SystemTime,
}

/// A random six digit PIN
#[must_use]
pub fn generate_pin() -> String {
    rand::rng().random_range(100_000..=999_999_u32).to_string()
}

/// Link the user follows instead of typing the PIN
#[must_use]
pub fn verification_url(base_url: &str, user_id: &str, pin: &str) -> String {
    format!(
        "{}/verify-email?user_id={user_id}&code={pin}",
        base_url.trim_end_matches('/')
    )
}

/// Whether `given` matches `expected` and has not expired at `now`
#[must_use]
pub fn validate_pin(given: &str, expected: &str, expires_at: SystemTime, now: SystemTime) -> bool {
    let matches = given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;

    matches && now <= expires_at
}

/// Submits verification emails through a [`JobService`]
///
/// Verification jobs are high priority and always tracked; reminders carry
/// a fresh PIN with a longer expiry.
#[derive(Clone)]
pub struct VerificationMailer {
    jobs: Arc<dyn JobService>,
    config: VerificationConfig,
}

impl std::fmt::Debug for VerificationMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationMailer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VerificationMailer {
    #[must_use]
    pub fn new(jobs: Arc<dyn JobService>, config: VerificationConfig) -> Self {
        Self { jobs, config }
    }

    /// Send a new verification PIN
    ///
    /// # Errors
    /// If the job service rejects the job.
    pub async fn send_verification(&self, recipient: &Recipient) -> Result<IssuedCode, ServiceError> {
        self.issue(
            recipient,
            VERIFICATION_TEMPLATE,
            Priority::High,
            self.config.expiry_minutes,
            false,
        )
        .await
    }

    /// Send a reminder with a fresh PIN to a user who has not verified yet
    ///
    /// # Errors
    /// If the job service rejects the job.
    pub async fn send_reminder(&self, recipient: &Recipient) -> Result<IssuedCode, ServiceError> {
        self.issue(
            recipient,
            REMINDER_TEMPLATE,
            Priority::Normal,
            self.config.reminder_expiry_minutes,
            true,
        )
        .await
    }

    async fn issue(
        &self,
        recipient: &Recipient,
        template: &str,
        priority: Priority,
        expiry_minutes: u64,
        reminder: bool,
    ) -> Result<IssuedCode, ServiceError> {
        let pin = generate_pin();
        let url = verification_url(&self.config.base_url, &recipient.user_id, &pin);

        let mut request = CreateJobRequest::template([recipient.email.as_str()], template)
            .with_kind(JobKind::Verification)
            .with_priority(priority)
            .with_variable("UserName", recipient.name.as_str())
            .with_variable("UserEmail", recipient.email.as_str())
            .with_variable("PinCode", pin.as_str())
            .with_variable("ExpiryTime", i64::try_from(expiry_minutes).unwrap_or(i64::MAX))
            .with_variable("VerificationURL", url.as_str())
            .tracked();
        if reminder {
            request = request.with_variable("IsReminder", true);
        }

        let job_id = self.jobs.create_job(request).await?;

        Ok(IssuedCode {
            job_id,
            pin,
            url,
            expires_at: SystemTime::now() + Duration::from_secs(expiry_minutes.saturating_mul(60)),
        })
    }
}
