//! The herald email job engine: configuration and the controller that wires
//! the store, worker pool, providers and health endpoints together.

pub mod config;
pub mod controller;

pub use config::Herald;
