//! Delivery trail of tracked jobs

use std::{sync::Arc, time::SystemTime};

use herald_common::{DeliveryEvent, JobId, TrackingRecord};
use herald_store::{Store, StoreError, TrackingStore};
use tracing::debug;

/// Writes and reads tracking records
///
/// The record is created when a provider accepts the email; events that
/// arrive later (typically from provider webhooks) fill their slot in place.
#[derive(Debug, Clone)]
pub struct TrackingRecorder {
    store: Arc<dyn Store>,
}

impl TrackingRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Start the trail for a job a provider has accepted
    ///
    /// # Errors
    /// If the job does not exist or the store cannot be written.
    pub async fn record_sent(
        &self,
        job_id: JobId,
        provider: &str,
        message_id: &str,
        at: SystemTime,
    ) -> Result<TrackingRecord, StoreError> {
        let record = TrackingRecord::sent(job_id, provider, message_id, at);
        self.store.put_tracking(&record).await?;
        debug!(job_id = %job_id, provider, message_id, "Recorded sent event");
        Ok(record)
    }

    /// Record a later delivery event; recording the same event twice moves its timestamp
    ///
    /// # Errors
    /// `NotFound` if the job was never sent.
    pub async fn record_event(
        &self,
        job_id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> Result<TrackingRecord, StoreError> {
        let record = self
            .store
            .apply_tracking_event(job_id, event, at, detail)
            .await?;
        debug!(job_id = %job_id, %event, status = %record.status, "Recorded delivery event");
        Ok(record)
    }

    /// # Errors
    /// `NotFound` if the job has no trail.
    pub async fn get(&self, job_id: &JobId) -> Result<TrackingRecord, StoreError> {
        self.store.get_tracking(job_id).await
    }
}
