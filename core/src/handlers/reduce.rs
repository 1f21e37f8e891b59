//! Handler for `reduce`: per-partition folds on workers, final fold on the
//! master.

use crate::dispatch::{MasterContext, Request, RequestHandler, RequestOutcome};
use crate::func::ReduceFunc;
use crate::handlers::{release_consumed, unexpected_kind};
use crate::plan::{group_by_worker, scatter};
use crate::worker::WorkerRequest;
use async_trait::async_trait;
use futures::future::try_join_all;
use shoal_common::Result;
use std::sync::Arc;
use tracing::debug;

/// Mirrors the map fan-out, except workers return one value per partition.
/// After the release barrier, `finalFunc` is the one function the master is
/// allowed to materialize: it folds the reordered per-partition values into
/// the request's single result.
pub struct ReducePartitions;

#[async_trait]
impl RequestHandler for ReducePartitions {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let (sub_request, partition_func, final_func) = match request {
            Request::Reduce {
                sub_request,
                partition_func,
                final_func,
            } => (sub_request, partition_func, final_func),
            other => return Err(unexpected_kind("reduce", &other)),
        };

        let inputs_cache_owned = sub_request.is_cache_owned();
        let sub_partitions = ctx.resolve_partitions(*sub_request).await?;
        let tasks = group_by_worker(&sub_partitions);
        debug!(
            partitions = sub_partitions.len(),
            workers = tasks.len(),
            "reducing partitions"
        );

        let rpcs = tasks.iter().map(|task| {
            let worker = Arc::clone(&task.worker);
            let ids = task.ids.clone();
            let func = partition_func.clone();
            async move {
                worker
                    .process_request(WorkerRequest::Reduce { func, ids })
                    .await?
                    .into_values()
            }
        });
        let per_worker_values = try_join_all(rpcs).await?;
        let values = scatter(&tasks, per_worker_values)?;

        release_consumed(ctx, inputs_cache_owned, &sub_partitions).await?;

        let fold: Box<dyn ReduceFunc> = final_func.materialize()?;
        let value = fold.call(&values)?;
        Ok(RequestOutcome::Value(value))
    }
}
