//! Partition placement and per-worker batching.

use crate::partition::{Partition, PartitionId};
use crate::worker::WorkerClient;
use shoal_common::{EngineError, Result};
use std::fmt;
use std::sync::Arc;

/// Per-worker share of `num_partitions`, in worker-index order.
///
/// The first `num_partitions % worker_count` workers take one extra
/// partition. Callers skip workers whose share is zero. `worker_count` must
/// be non-zero.
pub fn balanced_shares(num_partitions: usize, worker_count: usize) -> Vec<usize> {
    let rest = num_partitions % worker_count;
    let each = (num_partitions - rest) / worker_count;
    (0..worker_count)
        .map(|i| if i < rest { each + 1 } else { each })
        .collect()
}

/// One batched RPC's worth of partitions: everything one worker holds from
/// a single input list, with the positions the ids came from.
pub struct TaskRecord {
    pub worker: Arc<dyn WorkerClient>,
    pub ids: Vec<PartitionId>,
    /// Positions of `ids` in the input list. Scattering replies back through
    /// these indices restores input order.
    pub indices: Vec<usize>,
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("worker", &self.worker.worker_id())
            .field("ids", &self.ids)
            .field("indices", &self.indices)
            .finish()
    }
}

/// Group a partition list by owning worker, in first-appearance order.
///
/// Input order is preserved within each record, and the concatenation of all
/// records' `indices` is a permutation of `[0, partitions.len())`.
pub fn group_by_worker(partitions: &[Partition]) -> Vec<TaskRecord> {
    let mut records: Vec<TaskRecord> = Vec::new();
    for (index, partition) in partitions.iter().enumerate() {
        let worker_id = partition.worker().worker_id();
        match records
            .iter_mut()
            .find(|record| record.worker.worker_id() == worker_id)
        {
            Some(record) => {
                record.ids.push(partition.id().to_string());
                record.indices.push(index);
            }
            None => records.push(TaskRecord {
                worker: Arc::clone(partition.worker()),
                ids: vec![partition.id().to_string()],
                indices: vec![index],
            }),
        }
    }
    records
}

/// Scatter per-worker reply lists back to the input positions recorded in
/// `tasks`, restoring the original order.
pub fn scatter<T>(tasks: &[TaskRecord], replies: Vec<Vec<T>>) -> Result<Vec<T>> {
    let mut placed: Vec<(usize, T)> = Vec::new();
    for (task, reply) in tasks.iter().zip(replies) {
        if reply.len() != task.indices.len() {
            return Err(EngineError::protocol_error(format!(
                "worker {} replied with {} results for {} partitions",
                task.worker.worker_id(),
                reply.len(),
                task.indices.len()
            )));
        }
        for (&index, item) in task.indices.iter().zip(reply) {
            placed.push((index, item));
        }
    }
    placed.sort_by_key(|(index, _)| *index);
    Ok(placed.into_iter().map(|(_, item)| item).collect())
}
