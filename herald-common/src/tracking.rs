use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Delivery lifecycle event, in order of progression
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryEvent {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
}

impl DeliveryEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Bounced => "bounced",
        }
    }
}

impl fmt::Display for DeliveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery trail of one job
///
/// One record per job, mutated in place: each event type owns a single slot,
/// so recording the same event twice overwrites its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub job_id: JobId,
    pub provider: String,
    pub message_id: String,
    /// Furthest event seen so far; a bounce overrides everything
    pub status: DeliveryEvent,
    pub sent_at: SystemTime,
    pub delivered_at: Option<SystemTime>,
    pub opened_at: Option<SystemTime>,
    pub clicked_at: Option<SystemTime>,
    pub bounced_at: Option<SystemTime>,
    pub bounce_reason: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl TrackingRecord {
    #[must_use]
    pub fn sent(
        job_id: JobId,
        provider: impl Into<String>,
        message_id: impl Into<String>,
        at: SystemTime,
    ) -> Self {
        Self {
            job_id,
            provider: provider.into(),
            message_id: message_id.into(),
            status: DeliveryEvent::Sent,
            sent_at: at,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            bounced_at: None,
            bounce_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Fill the slot for `event`, advancing the status if it moved forward
    pub fn apply(&mut self, event: DeliveryEvent, at: SystemTime, detail: Option<String>) {
        match event {
            DeliveryEvent::Sent => self.sent_at = at,
            DeliveryEvent::Delivered => self.delivered_at = Some(at),
            DeliveryEvent::Opened => self.opened_at = Some(at),
            DeliveryEvent::Clicked => self.clicked_at = Some(at),
            DeliveryEvent::Bounced => {
                self.bounced_at = Some(at);
                self.bounce_reason = detail;
            }
        }

        self.status = self.status.max(event);
        self.updated_at = self.updated_at.max(at);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn events_are_idempotent_per_slot() {
        let t0 = SystemTime::now();
        let mut record = TrackingRecord::sent(JobId::generate(), "smtp", "<id@x>", t0);

        record.apply(DeliveryEvent::Delivered, t0 + Duration::from_secs(1), None);
        record.apply(DeliveryEvent::Delivered, t0 + Duration::from_secs(2), None);

        assert_eq!(record.delivered_at, Some(t0 + Duration::from_secs(2)));
        assert_eq!(record.status, DeliveryEvent::Delivered);
    }

    #[test]
    fn status_never_regresses() {
        let t0 = SystemTime::now();
        let mut record = TrackingRecord::sent(JobId::generate(), "smtp", "<id@x>", t0);

        record.apply(DeliveryEvent::Clicked, t0, None);
        record.apply(DeliveryEvent::Delivered, t0, None);
        assert_eq!(record.status, DeliveryEvent::Clicked);

        record.apply(DeliveryEvent::Bounced, t0, Some("mailbox full".to_string()));
        assert_eq!(record.status, DeliveryEvent::Bounced);
        assert_eq!(record.bounce_reason.as_deref(), Some("mailbox full"));
    }
}
