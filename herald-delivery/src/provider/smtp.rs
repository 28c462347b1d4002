use std::{fmt, time::Duration};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Deserialize;

use super::{EmailProvider, ProviderError, generate_message_id};
use crate::message::RenderedEmail;

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587)
    #[default]
    StartTls,
    /// Implicit TLS (port 465)
    Tls,
    /// No encryption; only for local relays and tests
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_name")]
    pub name: String,

    pub host: String,

    /// Defaults to the standard port for `security`
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub security: SmtpSecurity,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Per-command timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_name() -> String {
    "smtp".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Sends through an SMTP relay
pub struct SmtpProvider {
    name: String,
    host: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for SmtpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpProvider")
            .field("name", &self.name)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SmtpProvider {
    /// Build the transport; connections are opened lazily on first send
    ///
    /// # Errors
    /// If the relay host cannot be used for TLS.
    pub fn new(config: &SmtpConfig) -> Result<Self, ProviderError> {
        let builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host),
            SmtpSecurity::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.host,
            )),
        }
        .map_err(|e| ProviderError::Configuration(format!("{}: {e}", config.host)))?;

        let mut builder = builder.timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let Some(port) = config.port {
            builder = builder.port(port);
        }

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            name: config.name.clone(),
            host: config.host.clone(),
            transport: builder.build(),
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, ProviderError> {
    address
        .parse()
        .map_err(|e| ProviderError::InvalidMessage(format!("{address}: {e}")))
}

/// Build the MIME message, `multipart/alternative` when both bodies are present
pub(crate) fn build_message(
    email: &RenderedEmail,
    message_id: &str,
) -> Result<Message, ProviderError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from.mailbox())?)
        .subject(email.subject.clone())
        .message_id(Some(message_id.to_string()));

    for to in &email.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in &email.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    for bcc in &email.bcc {
        builder = builder.bcc(parse_mailbox(bcc)?);
    }

    let message = match (&email.html, &email.text) {
        (Some(html), Some(text)) => {
            builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
        }
        (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
        (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
        (None, None) => builder.header(ContentType::TEXT_PLAIN).body(String::new()),
    };

    message.map_err(|e| ProviderError::InvalidMessage(e.to_string()))
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_send(&self, email: &RenderedEmail) -> Result<String, ProviderError> {
        let message_id = generate_message_id(&email.from.from);
        let message = build_message(email, &message_id)?;

        match self.transport.send(message).await {
            Ok(_) => Ok(message_id),
            Err(e) if e.is_permanent() => Err(ProviderError::Rejected {
                status: e
                    .status()
                    .and_then(|code| code.to_string().parse().ok())
                    .unwrap_or_default(),
                message: e.to_string(),
            }),
            Err(e) => Err(ProviderError::Transport(e.to_string())),
        }
    }
}
