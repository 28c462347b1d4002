use async_trait::async_trait;
use herald_common::outgoing;

use super::{EmailProvider, ProviderError, generate_message_id};
use crate::message::RenderedEmail;

/// Writes emails to the log instead of sending them
#[derive(Debug, Clone)]
pub struct LogProvider {
    name: String,
}

impl Default for LogProvider {
    fn default() -> Self {
        Self::new("log")
    }
}

impl LogProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl EmailProvider for LogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_send(&self, email: &RenderedEmail) -> Result<String, ProviderError> {
        let message_id = generate_message_id(&email.from.from);

        outgoing!(
            level = INFO,
            "[{}] {} -> {:?}: {} (job {})",
            message_id,
            email.from.mailbox(),
            email.to,
            email.subject,
            email.job_id
        );

        Ok(message_id)
    }
}
