use herald_common::JobId;
use serde::Deserialize;

/// Identity emails are sent from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sender {
    #[serde(default = "default_from")]
    pub from: String,

    /// Display name, e.g. `Acme Bookings`
    #[serde(default)]
    pub name: Option<String>,
}

fn default_from() -> String {
    "noreply@localhost".to_string()
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            from: default_from(),
            name: None,
        }
    }
}

impl Sender {
    /// `Name <address>` or the bare address
    #[must_use]
    pub fn mailbox(&self) -> String {
        self.name.as_ref().map_or_else(
            || self.from.clone(),
            |name| format!("{name} <{}>", self.from),
        )
    }
}

/// A fully rendered email, ready for a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub job_id: JobId,
    pub from: Sender,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_formatting() {
        let mut sender = Sender::default();
        assert_eq!(sender.mailbox(), "noreply@localhost");

        sender.name = Some("Herald".to_string());
        assert_eq!(sender.mailbox(), "Herald <noreply@localhost>");
    }
}
