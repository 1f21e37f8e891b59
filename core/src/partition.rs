//! Remote partition handles.

use crate::worker::WorkerClient;
use std::fmt;
use std::sync::Arc;

/// Worker-assigned partition identifier, unique within the owning worker.
pub type PartitionId = String;

/// An opaque handle to one partition of a dataset held by a remote worker.
///
/// A partition is live from the moment its worker returns the id until a
/// release for it is acknowledged. Exactly one partition list owns each live
/// handle; a handler that consumes the partitions of its sub-request becomes
/// responsible for releasing them. The master never inspects partition
/// payloads, it only composes handles.
#[derive(Clone)]
pub struct Partition {
    worker: Arc<dyn WorkerClient>,
    id: PartitionId,
}

impl Partition {
    pub fn new(worker: Arc<dyn WorkerClient>, id: PartitionId) -> Self {
        Self { worker, id }
    }

    /// Client for the worker holding this partition.
    pub fn worker(&self) -> &Arc<dyn WorkerClient> {
        &self.worker
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("worker", &self.worker.worker_id())
            .field("id", &self.id)
            .finish()
    }
}
