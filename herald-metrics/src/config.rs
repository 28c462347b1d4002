use serde::Deserialize;

/// Where and whether job metrics are pushed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    /// When disabled every recording call is a no-op
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// OTLP/HTTP collector endpoint, e.g. `http://otel-collector:4318/v1/metrics`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

const fn default_enabled() -> bool {
    false
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: MetricsConfig = ron::from_str("(enabled: true)").unwrap();
        assert!(config.enabled);
        assert_eq!(config.endpoint, default_endpoint());
    }
}
