//! Piece-table plumbing shared by the shuffle handlers.
//!
//! A shuffle's slice phase leaves behind a table of piece descriptors,
//! indexed first by source partition (input order) then by destination.
//! Descriptors are opaque to the master: a worker may hand out local file
//! names or remote handles, and only null vs non-null is read here.

use crate::partition::Partition;
use crate::plan::balanced_shares;
use crate::worker::{WorkerClient, WorkerRequest};
use futures::future::try_join_all;
use serde_json::Value;
use shoal_common::{EngineError, Result};
use std::sync::Arc;
use tracing::debug;

/// Reindex a source-major piece table by destination, dropping empty cells.
///
/// Every row must carry exactly `num_partitions` cells; anything else is a
/// protocol violation by the replying worker. Within each destination the
/// pieces keep source order, which is what lets an order-preserving shuffle
/// concatenate them directly.
pub fn transpose(pieces: Vec<Vec<Value>>, num_partitions: usize) -> Result<Vec<Vec<Value>>> {
    let mut by_dest: Vec<Vec<Value>> = (0..num_partitions).map(|_| Vec::new()).collect();
    for (source, row) in pieces.into_iter().enumerate() {
        if row.len() != num_partitions {
            return Err(EngineError::protocol_error(format!(
                "slice reply for source partition {} has {} cells, expected {}",
                source,
                row.len(),
                num_partitions
            )));
        }
        for (dest, piece) in row.into_iter().enumerate() {
            if !piece.is_null() {
                by_dest[dest].push(piece);
            }
        }
    }
    Ok(by_dest)
}

/// Join phase of a shuffle: hand each receiving worker the piece rows of the
/// destinations it was assigned by the balanced layout, and wrap the ids it
/// returns.
///
/// The returned list is indexed by destination partition `[0, P)`.
pub async fn join_pieces(
    workers: &[Arc<dyn WorkerClient>],
    by_dest: Vec<Vec<Value>>,
) -> Result<Vec<Partition>> {
    let num_partitions = by_dest.len();
    let shares = balanced_shares(num_partitions, workers.len());
    debug!(num_partitions, workers = workers.len(), "joining shuffle pieces");

    let mut rows = by_dest.into_iter();
    let mut joins = Vec::new();
    for (worker, share) in workers.iter().zip(shares) {
        if share == 0 {
            continue;
        }
        let pieces: Vec<Vec<Value>> = rows.by_ref().take(share).collect();
        let worker = Arc::clone(worker);
        joins.push(async move {
            let reply = worker
                .process_request(WorkerRequest::RepartitionJoin { pieces })
                .await?;
            let ids = reply.into_ids()?;
            if ids.len() != share {
                return Err(EngineError::protocol_error(format!(
                    "join reply from worker {} carried {} ids for {} destinations",
                    worker.worker_id(),
                    ids.len(),
                    share
                )));
            }
            Ok(ids
                .into_iter()
                .map(|id| Partition::new(Arc::clone(&worker), id))
                .collect::<Vec<_>>())
        });
    }

    let produced = try_join_all(joins).await?;
    Ok(produced.into_iter().flatten().collect())
}
