//! Handler for `coalesce`: a two-phase shuffle by contiguous slicing.
//!
//! Unlike `repartition`, an item's destination is determined by its ordinal
//! position in the concatenation of all input partitions, so destinations
//! hold contiguous ranges of the global sequence, in order.

use crate::dispatch::{MasterContext, Request, RequestHandler, RequestOutcome};
use crate::func::{CountItems, RangeSlice, ReduceFunc, SerializedFunc, SliceFunc};
use crate::handlers::{release_consumed, unexpected_kind};
use crate::plan::{group_by_worker, scatter};
use crate::shuffle::{join_pieces, transpose};
use crate::worker::WorkerRequest;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use shoal_common::{EngineError, Result};
use std::sync::Arc;
use tracing::debug;

/// Preflight-counts every input partition with a shipped length reducer,
/// plans the contiguous-range assignments, then runs the usual
/// slice/release/transpose/join pipeline with a range slicer driven purely
/// by the per-partition assignment args.
///
/// Destination `d` ends up with the slice
/// `[d*each + min(d, rest), (d+1)*each + min(d+1, rest))` of the global
/// concatenation, where `each` and `rest` derive from the item total.
pub struct Coalesce;

#[async_trait]
impl RequestHandler for Coalesce {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let (sub_request, num_partitions) = match request {
            Request::Coalesce {
                sub_request,
                num_partitions,
            } => (sub_request, num_partitions),
            other => return Err(unexpected_kind("coalesce", &other)),
        };

        let num_partitions = num_partitions.unwrap_or_else(|| ctx.default_partitions());
        let inputs_cache_owned = sub_request.is_cache_owned();
        let sub_partitions = ctx.resolve_partitions(*sub_request).await?;
        let tasks = group_by_worker(&sub_partitions);

        // Preflight: per-partition item counts, in input order.
        let counter = SerializedFunc::capture(&(Box::new(CountItems) as Box<dyn ReduceFunc>))?;
        let count_rpcs = tasks.iter().map(|task| {
            let worker = Arc::clone(&task.worker);
            let ids = task.ids.clone();
            let func = counter.clone();
            async move {
                worker
                    .process_request(WorkerRequest::Reduce { func, ids })
                    .await?
                    .into_values()
            }
        });
        let per_worker_counts = try_join_all(count_rpcs).await?;
        let counts = scatter(&tasks, per_worker_counts)?
            .into_iter()
            .map(|value| {
                value.as_u64().map(|n| n as usize).ok_or_else(|| {
                    EngineError::protocol_error("partition count reply was not an integer")
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let plan = range_plan(&counts, num_partitions);
        debug!(
            partitions = sub_partitions.len(),
            num_partitions,
            total = counts.iter().sum::<usize>(),
            "coalescing partitions"
        );

        let args: Vec<Value> = plan
            .into_iter()
            .map(|assignments| {
                serde_json::to_value(assignments).map_err(|e| {
                    EngineError::serialization_error_with_source(
                        "could not encode range assignments",
                        e,
                    )
                })
            })
            .collect::<Result<Vec<Value>>>()?;

        let slicer =
            SerializedFunc::capture(&(Box::new(RangeSlice { num_partitions }) as Box<dyn SliceFunc>))?;

        let slice_rpcs = tasks.iter().map(|task| {
            let worker = Arc::clone(&task.worker);
            let ids = task.ids.clone();
            let worker_args: Vec<Value> = task.indices.iter().map(|&i| args[i].clone()).collect();
            let slicer = slicer.clone();
            async move {
                worker
                    .process_request(WorkerRequest::RepartitionSlice {
                        ids,
                        num_partitions,
                        partition_func: slicer,
                        args: worker_args,
                    })
                    .await?
                    .into_pieces()
            }
        });
        let per_worker_pieces = try_join_all(slice_rpcs).await?;
        let piece_rows = scatter(&tasks, per_worker_pieces)?;

        release_consumed(ctx, inputs_cache_owned, &sub_partitions).await?;

        let by_dest = transpose(piece_rows, num_partitions)?;
        let produced = join_pieces(ctx.workers(), by_dest).await?;
        Ok(RequestOutcome::Partitions(produced))
    }
}

/// Contiguous-range assignments per input partition. Each entry is
/// `(destination, start, len)` into that partition's items; walking input
/// partitions in order fills destination 0, then 1, and so on, each up to
/// its per-destination quota.
fn range_plan(counts: &[usize], num_partitions: usize) -> Vec<Vec<(usize, usize, usize)>> {
    if num_partitions == 0 {
        return counts.iter().map(|_| Vec::new()).collect();
    }

    let total: usize = counts.iter().sum();
    let rest = total % num_partitions;
    let each = (total - rest) / num_partitions;
    let quota = |dest: usize| each + usize::from(dest < rest);

    let mut next_dest = 0usize;
    let mut need = quota(0);
    let mut plan = Vec::with_capacity(counts.len());
    for &count in counts {
        let mut assignments = Vec::new();
        let mut current_index = 0usize;
        let mut remaining = count;
        while remaining > 0 {
            if need == 0 {
                next_dest += 1;
                need = quota(next_dest);
                continue;
            }
            let take = need.min(remaining);
            assignments.push((next_dest, current_index, take));
            need -= take;
            remaining -= take;
            current_index += take;
        }
        plan.push(assignments);
    }
    plan
}
