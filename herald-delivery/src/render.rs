//! Template rendering
//!
//! Rendering is pure `{{name}}` substitution: nothing in a template body is
//! ever evaluated. A placeholder whose variable is missing renders as an empty
//! string, so an optional field never aborts a send. Only structurally broken
//! markup (an unclosed `{{`, a stray `}}` or an empty `{{ }}`) is an error.

use herald_common::{EmailJob, EmailTemplate, JobContent, Variables};
use herald_store::TemplateStore;
use thiserror::Error;
use tracing::debug;

use crate::{
    error::{DeliveryError, PermanentError},
    message::{RenderedEmail, Sender},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    #[error("Unexpected '}}}}' at byte {0}")]
    UnexpectedClose(usize),

    #[error("Empty placeholder at byte {0}")]
    EmptyName(usize),
}

enum Piece<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Walk `pattern`, handing each literal run and placeholder name to `emit`
fn scan<'a>(pattern: &'a str, mut emit: impl FnMut(Piece<'a>)) -> Result<(), RenderError> {
    let mut rest = pattern;
    let mut offset = 0;

    loop {
        let open = rest.find("{{");
        let close = rest.find("}}");

        let Some(start) = open else {
            if let Some(stray) = close {
                return Err(RenderError::UnexpectedClose(offset + stray));
            }
            emit(Piece::Literal(rest));
            return Ok(());
        };

        if let Some(stray) = close
            && stray < start
        {
            return Err(RenderError::UnexpectedClose(offset + stray));
        }

        emit(Piece::Literal(&rest[..start]));

        let inner_start = start + 2;
        let Some(len) = rest[inner_start..].find("}}") else {
            return Err(RenderError::Unclosed(offset + start));
        };

        let inner = &rest[inner_start..inner_start + len];
        if inner.contains("{{") {
            return Err(RenderError::Unclosed(offset + start));
        }

        let name = inner.trim();
        if name.is_empty() {
            return Err(RenderError::EmptyName(offset + start));
        }
        emit(Piece::Placeholder(name));

        let consumed = inner_start + len + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
}

/// Substitute `variables` into `pattern`
///
/// # Errors
/// If the placeholder syntax is unbalanced.
pub fn render(pattern: &str, variables: &Variables) -> Result<String, RenderError> {
    let mut out = String::with_capacity(pattern.len());

    scan(pattern, |piece| match piece {
        Piece::Literal(text) => out.push_str(text),
        Piece::Placeholder(name) => {
            if let Some(value) = variables.get(name) {
                out.push_str(&value.to_string());
            }
        }
    })?;

    Ok(out)
}

/// Names referenced by `pattern`, in order of appearance
///
/// # Errors
/// If the placeholder syntax is unbalanced.
pub fn placeholders(pattern: &str) -> Result<Vec<&str>, RenderError> {
    let mut names = Vec::new();
    scan(pattern, |piece| {
        if let Piece::Placeholder(name) = piece {
            names.push(name);
        }
    })?;
    Ok(names)
}

/// Check every pattern of a template for well-formed placeholders
///
/// # Errors
/// The first malformed field.
pub fn check_template(template: &EmailTemplate) -> Result<(), (&'static str, RenderError)> {
    let fields = [
        ("subject", Some(template.subject.as_str())),
        ("html body", template.html_body.as_deref()),
        ("text body", template.text_body.as_deref()),
    ];

    for (field, pattern) in fields {
        if let Some(pattern) = pattern {
            placeholders(pattern).map_err(|e| (field, e))?;
        }
    }

    Ok(())
}

fn render_field(
    field: &'static str,
    pattern: &str,
    variables: &Variables,
) -> Result<String, PermanentError> {
    render(pattern, variables).map_err(|source| PermanentError::Render { field, source })
}

fn render_optional(
    field: &'static str,
    pattern: Option<&str>,
    variables: &Variables,
) -> Result<Option<String>, PermanentError> {
    pattern
        .map(|pattern| render_field(field, pattern, variables))
        .transpose()
}

/// Resolve a job's content into a sendable email
///
/// # Errors
/// - `TemplateNotFound` if the named template is missing or inactive
/// - `Render` if a pattern is malformed
/// - a system error if the template store cannot be read
pub async fn resolve<S: TemplateStore + ?Sized>(
    store: &S,
    job: &EmailJob,
    sender: &Sender,
) -> Result<RenderedEmail, DeliveryError> {
    let variables = &job.variables;

    let (subject, html, text) = match &job.content {
        JobContent::Template { name } => {
            let template = match store.get_template(name).await {
                Ok(template) if template.active => template,
                Ok(_) => return Err(PermanentError::TemplateNotFound(name.clone()).into()),
                Err(e) if e.is_not_found() => {
                    return Err(PermanentError::TemplateNotFound(name.clone()).into());
                }
                Err(e) => return Err(e.into()),
            };

            let missing: Vec<_> = template
                .variables
                .iter()
                .filter(|declared| !variables.contains(declared))
                .collect();
            if !missing.is_empty() {
                debug!(
                    job_id = %job.id,
                    template = %name,
                    ?missing,
                    "Declared template variables missing, rendering them empty"
                );
            }

            (
                render_field("subject", &template.subject, variables)?,
                render_optional("html body", template.html_body.as_deref(), variables)?,
                render_optional("text body", template.text_body.as_deref(), variables)?,
            )
        }
        JobContent::Inline { subject, html, text } => (
            render_field("subject", subject, variables)?,
            render_optional("html body", html.as_deref(), variables)?,
            render_optional("text body", text.as_deref(), variables)?,
        ),
    };

    Ok(RenderedEmail {
        job_id: job.id,
        from: sender.clone(),
        to: job.recipients.clone(),
        cc: job.cc.clone().unwrap_or_default(),
        bcc: job.bcc.clone().unwrap_or_default(),
        subject,
        html,
        text,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_common::{JobKind, VariableValue};
    use herald_store::{MemoryStore, StoreError};
    use pretty_assertions::assert_eq;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs.iter().map(|(k, v)| ((*k).to_string(), VariableValue::from(*v))).collect()
    }

    #[test]
    fn substitutes_variables() {
        assert_eq!(
            render("Hello {{name}}", &vars(&[("name", "Ana")])).unwrap(),
            "Hello Ana"
        );
        assert_eq!(
            render("{{ greeting }}, {{name}}!", &vars(&[("greeting", "Hi"), ("name", "Bo")]))
                .unwrap(),
            "Hi, Bo!"
        );
    }

    #[test]
    fn missing_variable_renders_empty() {
        assert_eq!(render("Hello {{name}}", &Variables::new()).unwrap(), "Hello ");
    }

    #[test]
    fn non_text_values_use_their_string_form() {
        let variables = Variables::new()
            .with("count", 3_i64)
            .with("ratio", 0.5)
            .with("ok", true);
        assert_eq!(
            render("{{count}} {{ratio}} {{ok}}", &variables).unwrap(),
            "3 0.5 true"
        );
    }

    #[test]
    fn malformed_markup_is_rejected() {
        let none = Variables::new();
        assert_eq!(render("Hi {{name", &none), Err(RenderError::Unclosed(3)));
        assert_eq!(render("Hi name}}", &none), Err(RenderError::UnexpectedClose(7)));
        assert_eq!(render("Hi {{ }}", &none), Err(RenderError::EmptyName(3)));
        assert_eq!(render("{{a {{b}}", &none), Err(RenderError::Unclosed(0)));
    }

    #[test]
    fn templates_are_not_evaluated() {
        let variables = vars(&[("name", "<script>alert(1)</script>")]);
        assert_eq!(
            render("<p>{{name}}</p>", &variables).unwrap(),
            "<p><script>alert(1)</script></p>"
        );
        assert_eq!(render("{{ {name} }}", &Variables::new()).unwrap(), "");
    }

    #[test]
    fn lists_placeholders() {
        assert_eq!(
            placeholders("{{a}} and {{ b }} and {{a}}").unwrap(),
            vec!["a", "b", "a"]
        );
    }

    #[test]
    fn checks_every_template_field() {
        let template = EmailTemplate::new("t", "ok {{x}}").with_html("<p>{{oops</p>");
        let (field, _) = check_template(&template).unwrap_err();
        assert_eq!(field, "html body");
    }

    fn job(content: JobContent) -> EmailJob {
        let mut job = EmailJob::new(
            JobKind::Welcome,
            vec!["a@example.com".to_string()],
            content,
        );
        job.variables = vars(&[("name", "Ana")]);
        job.cc = Some(vec!["c@example.com".to_string()]);
        job
    }

    #[tokio::test]
    async fn resolves_a_stored_template() {
        let store = MemoryStore::new();
        store
            .create_template(
                &EmailTemplate::new("welcome", "Welcome {{name}}")
                    .with_text("Hi {{name}}, {{missing}}done")
                    .with_variables(["name", "missing"]),
            )
            .await
            .unwrap();

        let rendered = resolve(&store, &job(JobContent::template("welcome")), &Sender::default())
            .await
            .unwrap();

        assert_eq!(rendered.subject, "Welcome Ana");
        assert_eq!(rendered.text.as_deref(), Some("Hi Ana, done"));
        assert_eq!(rendered.html, None);
        assert_eq!(rendered.cc, vec!["c@example.com".to_string()]);
        assert!(rendered.bcc.is_empty());
    }

    #[tokio::test]
    async fn inactive_or_unknown_templates_are_not_found() {
        let store = MemoryStore::new();
        let mut inactive = EmailTemplate::new("old", "Old").with_text("body");
        inactive.active = false;
        store.create_template(&inactive).await.unwrap();

        for name in ["old", "unknown"] {
            let err = resolve(&store, &job(JobContent::template(name)), &Sender::default())
                .await
                .unwrap_err();
            assert!(
                matches!(err, DeliveryError::Permanent(PermanentError::TemplateNotFound(ref n)) if n == name),
                "{err}"
            );
        }
    }

    #[tokio::test]
    async fn inline_content_is_rendered_too() {
        let store = MemoryStore::new();
        let content = JobContent::Inline {
            subject: "For {{name}}".to_string(),
            html: Some("<b>{{name}}</b>".to_string()),
            text: None,
        };

        let rendered = resolve(&store, &job(content), &Sender::default())
            .await
            .unwrap();
        assert_eq!(rendered.subject, "For Ana");
        assert_eq!(rendered.html.as_deref(), Some("<b>Ana</b>"));
    }

    #[tokio::test]
    async fn malformed_template_is_permanent() {
        let store = MemoryStore::new();
        store
            .create_template(&EmailTemplate::new("broken", "Hi {{name").with_text("x"))
            .await
            .unwrap();

        let err = resolve(&store, &job(JobContent::template("broken")), &Sender::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Permanent(PermanentError::Render { field: "subject", .. })
        ));
    }

    #[tokio::test]
    async fn store_outage_is_a_system_error() {
        let store = herald_store::TestStore::new();
        store.set_unavailable(true);

        let err = resolve(&store, &job(JobContent::template("welcome")), &Sender::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::System(crate::error::SystemError::Store(StoreError::Unavailable(_)))
        ));
    }
}
