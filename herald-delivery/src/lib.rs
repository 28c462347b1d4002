//! Job queue, rendering, provider chain and worker pool for herald
//!
//! This crate provides functionality to:
//! - Order jobs by priority and hold scheduled jobs until they are due
//! - Render templates with `{{name}}` substitution
//! - Deliver through an ordered chain of providers with failover
//! - Retry failed deliveries with exponential backoff up to a bound
//! - Record a durable delivery trail for tracked jobs

mod error;
mod message;
pub mod policy;
pub mod processor;
pub mod provider;
pub mod queue;
pub mod render;
mod service;
mod stats;
mod tracking;
mod types;
pub mod verification;

pub use error::{DeliveryError, PermanentError, ServiceError, SystemError, TemporaryError};
pub use message::{RenderedEmail, Sender};
pub use policy::{RetryDecision, RetryPolicy};
pub use processor::JobProcessor;
pub use provider::{EmailProvider, ProviderChain, ProviderConfig, ProviderError, Sent};
pub use queue::JobQueue;
pub use service::JobService;
pub use stats::{ProcessorStats, StatsSnapshot};
pub use tracking::TrackingRecorder;
pub use types::{CreateJobRequest, InlineContent, JobStats, JobStatusView, QueueStats, TimeRange};
pub use verification::{VerificationConfig, VerificationMailer};
