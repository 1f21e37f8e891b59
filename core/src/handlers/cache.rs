//! Handler for `loadCache`: resolve a dataset the cache already holds.

use crate::dispatch::{MasterContext, Request, RequestHandler, RequestOutcome};
use crate::handlers::unexpected_kind;
use async_trait::async_trait;
use shoal_common::Result;
use tracing::debug;

/// Returns the partition list registered under a dataset name. The cache
/// keeps ownership: nothing is released here, and consumers of a
/// `loadCache` sub-request must skip their release step too.
pub struct LoadCache;

#[async_trait]
impl RequestHandler for LoadCache {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let dataset = match request {
            Request::LoadCache { dataset } => dataset,
            other => return Err(unexpected_kind("loadCache", &other)),
        };

        let partitions = ctx.cache().lookup(&dataset).await?;
        debug!(dataset = %dataset, partitions = partitions.len(), "loaded cached dataset");
        Ok(RequestOutcome::Partitions(partitions))
    }
}
