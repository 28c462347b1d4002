//! OpenTelemetry metrics for herald
//!
//! Metrics are pushed over OTLP/HTTP to a collector:
//!
//! ```text
//! herald → OTLP/HTTP → OpenTelemetry Collector → Prometheus (scrape) → Grafana
//! ```
//!
//! Recording goes through [`metrics()`], which is `None` until [`init_metrics`]
//! has run with metrics enabled, so callers write
//!
//! ```rust,ignore
//! if let Some(metrics) = herald_metrics::metrics() {
//!     metrics.jobs.record_retry();
//! }
//! ```

mod config;
mod error;
mod exporter;
mod jobs;
mod provider;

pub use config::MetricsConfig;
pub use error::MetricsError;
pub use jobs::JobMetrics;
use once_cell::sync::OnceCell;
pub use provider::ProviderMetrics;

static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub jobs: JobMetrics,
    pub providers: ProviderMetrics,
}

/// Initialize the metrics system
///
/// Must run once at startup, inside a tokio runtime. Disabled config is a no-op.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or if called twice.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    tracing::info!(
        endpoint = %config.endpoint,
        "Initializing OpenTelemetry metrics with OTLP exporter"
    );

    let provider = exporter::init_otlp_exporter(&config.endpoint)?;
    opentelemetry::global::set_meter_provider(provider);

    METRICS_INSTANCE
        .set(Metrics {
            jobs: JobMetrics::new(),
            providers: ProviderMetrics::new(),
        })
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("Metrics collection initialized successfully");

    Ok(())
}

/// The global metrics instance, if metrics are enabled
#[must_use]
pub fn metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}
