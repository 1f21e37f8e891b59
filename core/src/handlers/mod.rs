//! Handlers for the built-in request kinds.

mod cache;
mod coalesce;
mod create;
mod map;
mod reduce;
mod repartition;

pub use cache::LoadCache;
pub use coalesce::Coalesce;
pub use create::CreateRdd;
pub use map::MapPartitions;
pub use reduce::ReducePartitions;
pub use repartition::Repartition;

use crate::dispatch::{MasterContext, Request};
use crate::partition::Partition;
use shoal_common::{EngineError, Result};
use tracing::debug;

/// Error for a request routed to the wrong handler.
pub(crate) fn unexpected_kind(expected: &str, got: &Request) -> EngineError {
    EngineError::invalid_request_error(format!(
        "{} handler received a '{}' request",
        expected,
        got.kind()
    ))
}

/// Release the partitions consumed from a sub-request, unless the cache
/// owns them.
pub(crate) async fn release_consumed(
    ctx: &MasterContext,
    inputs_cache_owned: bool,
    partitions: &[Partition],
) -> Result<()> {
    if inputs_cache_owned {
        debug!("inputs are cache-owned, skipping release");
        return Ok(());
    }
    ctx.release_partitions(partitions).await
}
