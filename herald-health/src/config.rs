//! Settings for the probe server

use serde::Deserialize;

/// Configuration for the health endpoints
///
/// ```ron
/// health: (
///     listen_address: "127.0.0.1:8081",
///     max_queue_size: 5000,
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthConfig {
    /// When disabled, the health server is not started
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// `host:port` to listen on; `[::]:8080` takes both address families
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Queued jobs (immediate and scheduled) above which readiness fails
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u64,
}

const fn default_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "[::]:8080".to_string()
}

const fn default_max_queue_size() -> u64 {
    10000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_listen_address(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let config: HealthConfig = ron::from_str("()").unwrap();
        assert_eq!(config, HealthConfig::default());
    }

    #[test]
    fn overrides() {
        let config: HealthConfig =
            ron::from_str(r#"(enabled: false, listen_address: "127.0.0.1:9000")"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.max_queue_size, 10000);
    }
}
