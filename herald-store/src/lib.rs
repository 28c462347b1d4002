//! Persistence for herald: jobs, templates and tracking records.
//!
//! The three logical tables are exposed as separate traits so callers only
//! depend on what they use; every backend implements all three and is
//! therefore a [`Store`].

pub mod backends;
pub mod config;
pub mod error;
mod rows;
pub mod store;

pub use backends::{FileStore, MemoryStore, TestStore};
pub use config::StoreConfig;
pub use error::{Result, SerializationError, StoreError};
pub use store::{JobStore, Store, TemplateStore, TrackingStore};
