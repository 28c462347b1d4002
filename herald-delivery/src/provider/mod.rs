//! Delivery backends
//!
//! Every backend implements [`EmailProvider`]; the [`ProviderChain`] tries
//! them in configured order until one accepts the email.

mod chain;
mod log;
mod sendgrid;
mod smtp;

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
pub use chain::{ProviderChain, Sent};
pub use log::LogProvider;
pub use sendgrid::{SendGridConfig, SendGridProvider};
use serde::Deserialize;
pub use smtp::{SmtpConfig, SmtpProvider, SmtpSecurity};
use thiserror::Error;

use crate::message::RenderedEmail;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The email could not be turned into something the backend accepts
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Network or protocol failure talking to the backend
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered but refused the email
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// One way of getting an email out of the door
#[async_trait]
pub trait EmailProvider: Send + Sync + Debug {
    /// Name reported in tracking records and health checks
    fn name(&self) -> &str;

    /// Hand the email to the backend, returning its message id
    ///
    /// # Errors
    /// Any failure to deliver; the chain moves on to the next provider.
    async fn try_send(&self, email: &RenderedEmail) -> Result<String, ProviderError>;
}

/// Configured providers, tried in the order they are listed
///
/// ```ron
/// providers: [
///     SendGrid(api_key: "SG.xxx"),
///     Smtp(host: "smtp.example.com", username: Some("herald"), password: Some("...")),
///     Log,
/// ],
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum ProviderConfig {
    Smtp(SmtpConfig),
    SendGrid(SendGridConfig),
    /// Log instead of sending; for development
    Log,
}

impl ProviderConfig {
    /// Build the provider
    ///
    /// # Errors
    /// If the configuration cannot produce a working client.
    pub fn build(&self) -> Result<Arc<dyn EmailProvider>, ProviderError> {
        Ok(match self {
            Self::Smtp(config) => Arc::new(SmtpProvider::new(config)?),
            Self::SendGrid(config) => Arc::new(SendGridProvider::new(config)?),
            Self::Log => Arc::new(LogProvider::default()),
        })
    }
}

/// A locally generated message id, `<ulid@domain-of-sender>`
pub(crate) fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map_or("herald.local", |(_, domain)| domain);
    format!("<{}@{domain}>", ulid::Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_use_the_sender_domain() {
        let id = generate_message_id("noreply@example.com");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
        assert_ne!(id, generate_message_id("noreply@example.com"));
    }

    #[test]
    fn log_provider_builds_from_config() {
        let provider = ProviderConfig::Log.build();
        assert!(matches!(provider, Ok(p) if p.name() == "log"));
    }
}
