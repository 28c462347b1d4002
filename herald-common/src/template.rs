use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{TemplateId, ValidationError};

/// Named, reusable subject/body pattern with declared substitution variables
///
/// Inactive templates stay readable for audit but are not resolvable for new
/// sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: TemplateId,
    /// Unique, human-chosen name jobs refer to
    pub name: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    /// Declared variable names, used for validation only
    pub variables: Vec<String>,
    pub active: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl EmailTemplate {
    /// Create an active template with no bodies
    #[must_use]
    pub fn new(name: impl Into<String>, subject: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: TemplateId::generate(),
            name: name.into(),
            subject: subject.into(),
            html_body: None,
            text_body: None,
            variables: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    /// Check the template has a name, a subject and at least one body
    ///
    /// # Errors
    ///
    /// Returns the first missing piece of content.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }

        if self.subject.trim().is_empty() {
            return Err(ValidationError::MissingSubject);
        }

        let has_body = [&self.html_body, &self.text_body]
            .into_iter()
            .flatten()
            .any(|body| !body.trim().is_empty());

        if has_body {
            Ok(())
        } else {
            Err(ValidationError::MissingBody)
        }
    }
}
