//! Handler for `map`: a single-stage per-partition transformation.

use crate::dispatch::{MasterContext, Request, RequestHandler, RequestOutcome};
use crate::handlers::{release_consumed, unexpected_kind};
use crate::partition::Partition;
use crate::plan::{group_by_worker, scatter};
use crate::worker::WorkerRequest;
use async_trait::async_trait;
use futures::future::try_join_all;
use shoal_common::Result;
use std::sync::Arc;
use tracing::debug;

/// Resolves the sub-request, sends each worker one batched MAP over the ids
/// it holds, and scatters the fresh ids back to input order. Every mapped
/// partition lives on the same worker as its input.
pub struct MapPartitions;

#[async_trait]
impl RequestHandler for MapPartitions {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let (sub_request, func) = match request {
            Request::Map { sub_request, func } => (sub_request, func),
            other => return Err(unexpected_kind("map", &other)),
        };

        let inputs_cache_owned = sub_request.is_cache_owned();
        let sub_partitions = ctx.resolve_partitions(*sub_request).await?;
        let tasks = group_by_worker(&sub_partitions);
        debug!(
            partitions = sub_partitions.len(),
            workers = tasks.len(),
            "mapping partitions"
        );

        let rpcs = tasks.iter().map(|task| {
            let worker = Arc::clone(&task.worker);
            let ids = task.ids.clone();
            let func = func.clone();
            async move {
                worker
                    .process_request(WorkerRequest::Map { func, ids })
                    .await?
                    .into_ids()
            }
        });
        let per_worker_ids = try_join_all(rpcs).await?;
        let ids_in_order = scatter(&tasks, per_worker_ids)?;

        let mapped: Vec<Partition> = sub_partitions
            .iter()
            .zip(ids_in_order)
            .map(|(input, id)| Partition::new(Arc::clone(input.worker()), id))
            .collect();

        release_consumed(ctx, inputs_cache_owned, &sub_partitions).await?;
        Ok(RequestOutcome::Partitions(mapped))
    }
}
