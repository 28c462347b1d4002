//! Types shared by every herald crate: identifiers, the job/template/tracking
//! model, health reports, logging macros and the audit trail.

pub mod audit;
pub mod error;
pub mod health;
pub mod id;
pub mod job;
pub mod logging;
pub mod template;
pub mod tracking;
pub mod variables;

pub use tracing;

// Re-export the model at the crate root
pub use error::{TransitionError, ValidationError};
pub use health::{HealthReport, HealthState, ProviderHealth};
pub use id::{JobId, TemplateId};
pub use job::{EmailJob, JobContent, JobKind, JobStatus, Priority};
pub use template::EmailTemplate;
pub use tracking::{DeliveryEvent, TrackingRecord};
pub use variables::{VariableValue, Variables};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
