//! Health check endpoints for herald
//!
//! This crate serves the probes an orchestrator uses to decide whether the
//! job engine should be restarted or sent traffic.
//!
//! # Endpoints
//!
//! - **`/health/live`** - Liveness probe: Returns 200 while the process can answer
//! - **`/health/ready`** - Readiness probe: Returns 200 if the engine can take new jobs
//! - **`/health/status`** - The last [`HealthReport`](herald_common::HealthReport) as JSON
//!
//! # Usage
//!
//! ```rust,no_run
//! use herald_health::{HealthServer, HealthConfig, HealthChecker};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HealthConfig {
//!     enabled: true,
//!     listen_address: "[::]:8080".to_string(),
//!     max_queue_size: 10000,
//! };
//!
//! let health_checker = Arc::new(HealthChecker::new(config.max_queue_size));
//! let server = HealthServer::new(&config, health_checker).await?;
//!
//! // Run the health server
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod checker;
mod config;
mod error;
mod server;

pub use checker::{HealthChecker, HealthStatus};
pub use config::HealthConfig;
pub use error::HealthError;
pub use server::{HealthServer, router};
