//! Handler for `repartition`: a two-phase shuffle routed by a key function.

use crate::dispatch::{MasterContext, Request, RequestHandler, RequestOutcome};
use crate::func::{KeyedSlice, SerializedFunc, SliceFunc};
use crate::handlers::{release_consumed, unexpected_kind};
use crate::plan::{group_by_worker, scatter};
use crate::shuffle::{join_pieces, transpose};
use crate::worker::WorkerRequest;
use async_trait::async_trait;
use futures::future::try_join_all;
use shoal_common::Result;
use std::sync::Arc;
use tracing::debug;

/// Phase 1 ships a slicer composed from the user's partition function; each
/// worker returns, per input partition, one opaque piece descriptor per
/// destination. After the inputs are released the piece table is transposed
/// and phase 2 asks the receiving workers to join their destinations.
///
/// The returned list is indexed by destination partition `[0, P)`.
pub struct Repartition;

#[async_trait]
impl RequestHandler for Repartition {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let (sub_request, num_partitions, partition_func) = match request {
            Request::Repartition {
                sub_request,
                num_partitions,
                partition_func,
            } => (sub_request, num_partitions, partition_func),
            other => return Err(unexpected_kind("repartition", &other)),
        };

        let num_partitions = num_partitions.unwrap_or_else(|| ctx.default_partitions());
        let inputs_cache_owned = sub_request.is_cache_owned();
        let sub_partitions = ctx.resolve_partitions(*sub_request).await?;
        let tasks = group_by_worker(&sub_partitions);
        debug!(
            partitions = sub_partitions.len(),
            num_partitions, "repartitioning by key function"
        );

        let slicer = SerializedFunc::capture(&(Box::new(KeyedSlice {
            num_partitions,
            partition_func,
        }) as Box<dyn SliceFunc>))?;

        let rpcs = tasks.iter().map(|task| {
            let worker = Arc::clone(&task.worker);
            let ids = task.ids.clone();
            let slicer = slicer.clone();
            async move {
                worker
                    .process_request(WorkerRequest::RepartitionSlice {
                        ids,
                        num_partitions,
                        partition_func: slicer,
                        args: Vec::new(),
                    })
                    .await?
                    .into_pieces()
            }
        });
        let per_worker_pieces = try_join_all(rpcs).await?;
        let piece_rows = scatter(&tasks, per_worker_pieces)?;

        release_consumed(ctx, inputs_cache_owned, &sub_partitions).await?;

        let by_dest = transpose(piece_rows, num_partitions)?;
        let produced = join_pieces(ctx.workers(), by_dest).await?;
        Ok(RequestOutcome::Partitions(produced))
    }
}
