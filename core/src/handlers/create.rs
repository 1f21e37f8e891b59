//! Handler for `createRDD`: materialize the initial partitions of a dataset.

use crate::dispatch::{MasterContext, Request, RequestHandler, RequestOutcome};
use crate::handlers::unexpected_kind;
use crate::partition::Partition;
use crate::plan::balanced_shares;
use crate::worker::WorkerRequest;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use shoal_common::{EngineError, Result};
use std::sync::Arc;
use tracing::debug;

/// Splits `args` across the worker roster with the balanced layout and asks
/// each selected worker to create its share of partitions in one RPC.
///
/// The returned partition list preserves the ordering of `args`: worker 0's
/// share first, then worker 1's, and so on. `args.len()` is not validated
/// against the partition count; a mismatch surfaces as a worker-side error.
pub struct CreateRdd;

#[async_trait]
impl RequestHandler for CreateRdd {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let (num_partitions, item_type, creator, args) = match request {
            Request::CreateRdd {
                num_partitions,
                item_type,
                creator,
                args,
            } => (num_partitions, item_type, creator, args),
            other => return Err(unexpected_kind("createRDD", &other)),
        };

        let num_partitions = num_partitions.unwrap_or_else(|| ctx.default_partitions());
        let workers = ctx.workers();
        let shares = balanced_shares(num_partitions, workers.len());
        debug!(
            num_partitions,
            workers = workers.len(),
            "creating dataset partitions"
        );

        let mut args = args.into_iter();
        let mut creations = Vec::new();
        for (worker, share) in workers.iter().zip(shares) {
            if share == 0 {
                continue;
            }
            let worker_args: Vec<Value> = args.by_ref().take(share).collect();
            let worker = Arc::clone(worker);
            let creator = creator.clone();
            let item_type = item_type.clone();
            creations.push(async move {
                let reply = worker
                    .process_request(WorkerRequest::CreatePartition {
                        item_type,
                        creator,
                        count: share,
                        args: worker_args,
                    })
                    .await?;
                let ids = reply.into_ids()?;
                if ids.len() != share {
                    return Err(EngineError::protocol_error(format!(
                        "worker {} created {} partitions, expected {}",
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

        let created = try_join_all(creations).await?;
        Ok(RequestOutcome::Partitions(
            created.into_iter().flatten().collect(),
        ))
    }
}
