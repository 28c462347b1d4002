//! Provider send metrics

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

#[derive(Debug)]
pub struct ProviderMetrics {
    /// Send calls by provider and outcome
    sends_total: Counter<u64>,

    /// Duration of a single provider send
    send_seconds: Histogram<f64>,
}

impl ProviderMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        let sends_total = meter
            .u64_counter("herald.provider.sends.total")
            .with_description("Total number of provider send calls by outcome")
            .build();

        let send_seconds = meter
            .f64_histogram("herald.provider.send.seconds")
            .with_description("Duration of a single provider send call")
            .build();

        Self {
            sends_total,
            send_seconds,
        }
    }

    pub fn record_send(&self, provider: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.sends_total.add(
            1,
            &[
                KeyValue::new("provider", provider.to_string()),
                KeyValue::new("outcome", outcome),
            ],
        );
        self.send_seconds.record(
            duration_secs,
            &[KeyValue::new("provider", provider.to_string())],
        );
    }
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("herald.provider")
}
