use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{FileStore, MemoryStore, Store};

/// Which backend holds jobs, templates and tracking records
///
/// ```ron
/// store: File(path: "/var/lib/herald"),
/// ```
///
/// or, for development, an in-memory store with an optional job cap:
///
/// ```ron
/// store: Memory(capacity: Some(10000)),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// Durable, one bincode file per row
    File { path: PathBuf },
    /// Lost on restart
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/lib/herald"),
        }
    }
}

impl StoreConfig {
    /// Directory of a file-backed store
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory { .. } => None,
        }
    }

    /// Build and initialise the configured backend
    ///
    /// # Errors
    /// If the file store path is unsafe or cannot be prepared and loaded.
    pub fn open(&self) -> crate::Result<Arc<dyn Store>> {
        match self {
            Self::File { path } => {
                let mut store = FileStore::new(path.clone())?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory { capacity } => Ok(capacity.map_or_else(
                || Arc::new(MemoryStore::new()) as Arc<dyn Store>,
                |capacity| Arc::new(MemoryStore::with_capacity(capacity)),
            )),
        }
    }
}
