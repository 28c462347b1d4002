//! Health report shared between the processor and the health endpoints

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    /// Still delivering, but a provider is down or the queue is backed up
    Degraded,
    /// The store is unreachable or no provider can deliver
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub healthy: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub queue_healthy: bool,
    pub store_healthy: bool,
    pub providers: Vec<ProviderHealth>,
    pub queue_size: u64,
    pub scheduled_size: u64,
    pub active_workers: u64,
}

impl HealthReport {
    /// Build a report, deriving the overall state from the component flags
    #[must_use]
    pub fn new(
        queue_healthy: bool,
        store_healthy: bool,
        providers: Vec<ProviderHealth>,
    ) -> Self {
        let any_provider = providers.iter().any(|p| p.healthy);
        let all_providers = providers.iter().all(|p| p.healthy);

        let status = if !store_healthy || !any_provider {
            HealthState::Unhealthy
        } else if !queue_healthy || !all_providers {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        Self {
            status,
            queue_healthy,
            store_healthy,
            providers,
            queue_size: 0,
            scheduled_size: 0,
            active_workers: 0,
        }
    }

    #[must_use]
    pub const fn with_queue(mut self, queue_size: u64, scheduled_size: u64, active_workers: u64) -> Self {
        self.queue_size = queue_size;
        self.scheduled_size = scheduled_size;
        self.active_workers = active_workers;
        self
    }
}
