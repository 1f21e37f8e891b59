//! Master-side registry of cache-owned datasets.

use crate::partition::Partition;
use shoal_common::{EngineError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Named partition lists owned by the cache.
///
/// Handles handed out by [`lookup`](Self::lookup) remain owned by the cache:
/// consumers must not release them, and the same name can back any number of
/// `loadCache` resolutions.
#[derive(Default)]
pub struct DatasetCache {
    entries: RwLock<HashMap<String, Vec<Partition>>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a resolved partition list under a dataset name. Replacing an
    /// entry does not release the partitions it held.
    pub async fn publish<S: Into<String>>(&self, name: S, partitions: Vec<Partition>) {
        let name = name.into();
        info!(dataset = %name, partitions = partitions.len(), "published dataset");
        self.entries.write().await.insert(name, partitions);
    }

    /// Clone out the partition list registered under `name`.
    pub async fn lookup(&self, name: &str) -> Result<Vec<Partition>> {
        self.entries.read().await.get(name).cloned().ok_or_else(|| {
            EngineError::not_found_error(format!("no cached dataset named '{name}'"))
        })
    }
}
