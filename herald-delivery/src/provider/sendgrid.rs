use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{EmailProvider, ProviderError, generate_message_id};
use crate::message::RenderedEmail;

#[derive(Debug, Clone, Deserialize)]
pub struct SendGridConfig {
    #[serde(default = "default_name")]
    pub name: String,

    pub api_key: String,

    /// Override for testing against a mock API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_name() -> String {
    "sendgrid".to_string()
}

fn default_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Sends through the SendGrid v3 mail API
#[derive(Debug)]
pub struct SendGridProvider {
    name: String,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl SendGridProvider {
    /// # Errors
    /// If the HTTP client cannot be built.
    pub fn new(config: &SendGridConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "SendGrid api_key is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            api_key: config.api_key.clone(),
            endpoint: format!("{}/v3/mail/send", config.base_url.trim_end_matches('/')),
            client,
        })
    }
}

fn addresses(list: &[String]) -> Vec<Value> {
    list.iter().map(|email| json!({ "email": email })).collect()
}

/// Request body for `/v3/mail/send`
pub(crate) fn payload(email: &RenderedEmail) -> Value {
    let mut personalization = json!({ "to": addresses(&email.to) });
    if !email.cc.is_empty() {
        personalization["cc"] = Value::Array(addresses(&email.cc));
    }
    if !email.bcc.is_empty() {
        personalization["bcc"] = Value::Array(addresses(&email.bcc));
    }

    let mut from = json!({ "email": email.from.from });
    if let Some(name) = &email.from.name {
        from["name"] = Value::String(name.clone());
    }

    // text/plain must precede text/html
    let mut content = Vec::with_capacity(2);
    if let Some(text) = &email.text {
        content.push(json!({ "type": "text/plain", "value": text }));
    }
    if let Some(html) = &email.html {
        content.push(json!({ "type": "text/html", "value": html }));
    }

    json!({
        "personalizations": [personalization],
        "from": from,
        "subject": email.subject,
        "content": content,
    })
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_send(&self, email: &RenderedEmail) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload(email))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .map_or_else(|| generate_message_id(&email.from.from), str::to_string))
    }
}
