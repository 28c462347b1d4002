//! Locating and parsing `herald.config.ron`

use std::path::{Path, PathBuf};

use herald_common::{EmailTemplate, audit::AuditConfig};
use herald_delivery::{JobProcessor, ProviderConfig, Sender};
use herald_health::HealthConfig;
use herald_metrics::MetricsConfig;
use herald_store::StoreConfig;
use ron::extensions::Extensions;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "HERALD_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./herald.config.ron", "/etc/herald/herald.config.ron"];

/// A template installed at startup unless one with the same name exists
///
/// ```ron
/// (
///     name: "welcome",
///     subject: "Welcome {{name}}",
///     html: "<p>Hello {{name}}</p>",
///     variables: ["name"],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateSeed {
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
}

impl From<&TemplateSeed> for EmailTemplate {
    fn from(seed: &TemplateSeed) -> Self {
        let mut template = Self::new(seed.name.as_str(), seed.subject.as_str())
            .with_variables(seed.variables.iter().map(String::as_str));
        template.html_body.clone_from(&seed.html);
        template.text_body.clone_from(&seed.text);
        template
    }
}

/// Everything the engine needs to start
#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub processor: JobProcessor,

    /// Tried in order for every send
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Overrides `processor.sender` when present
    #[serde(default)]
    pub sender: Option<Sender>,

    #[serde(default)]
    pub templates: Vec<TemplateSeed>,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Herald {
    /// Parse a configuration document
    ///
    /// Newtype variants may be written without their inner parentheses
    /// (`Smtp(host: "...")`) and `Some(..)` may be left out.
    ///
    /// # Errors
    /// If the document is not valid RON for this structure.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let options = ron::Options::default().with_default_extension(
            Extensions::UNWRAP_VARIANT_NEWTYPES | Extensions::IMPLICIT_SOME,
        );
        Ok(options.from_str(content)?)
    }

    /// Read and parse the file at `path`
    ///
    /// # Errors
    /// If the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {}", path.display(), e))
    }
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
///
/// # Errors
/// If the variable names a missing file, or none of the defaults exist.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    find_config_in(
        std::env::var(CONFIG_ENV).ok().as_deref(),
        &DEFAULT_PATHS.map(PathBuf::from),
    )
}

pub(crate) fn find_config_in(env_path: Option<&str>, defaults: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        let chosen = dir.path().join("chosen.ron");
        let fallback = dir.path().join("fallback.ron");
        fs::write(&chosen, "()").unwrap();
        fs::write(&fallback, "()").unwrap();

        let found = find_config_in(chosen.to_str(), std::slice::from_ref(&fallback)).unwrap();
        assert_eq!(found, chosen);
    }

    #[test]
    fn missing_environment_file_is_an_error() {
        let err = find_config_in(Some("/definitely/not/here.ron"), &[]).unwrap_err();
        assert!(err.to_string().contains("HERALD_CONFIG points to non-existent file"));
    }

    #[test]
    fn first_existing_default_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ron");
        let present = dir.path().join("present.ron");
        fs::write(&present, "()").unwrap();

        let found = find_config_in(None, &[missing.clone(), present.clone()]).unwrap();
        assert_eq!(found, present);

        let err = find_config_in(None, &[missing]).unwrap_err();
        assert!(err.to_string().contains("missing.ron"));
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let herald = Herald::parse("()").unwrap();
        assert_eq!(herald.store, StoreConfig::default());
        assert_eq!(herald.processor.workers, 4);
        assert!(herald.providers.is_empty());
        assert!(herald.sender.is_none());
        assert!(herald.health.enabled);
        assert!(!herald.metrics.enabled);
    }

    #[test]
    fn seeds_become_templates() {
        let seed = TemplateSeed {
            name: "welcome".to_string(),
            subject: "Hi {{name}}".to_string(),
            html: None,
            text: Some("Hello {{name}}".to_string()),
            variables: vec!["name".to_string()],
        };
        let template = EmailTemplate::from(&seed);
        assert_eq!(template.name, "welcome");
        assert_eq!(template.subject, "Hi {{name}}");
        assert_eq!(template.html_body, None);
        assert_eq!(template.text_body.as_deref(), Some("Hello {{name}}"));
        assert_eq!(template.variables, vec!["name".to_string()]);
        assert!(template.active);
    }
}
