//! Request trees, the handler registry and the master context.
//!
//! Clients describe datasets declaratively as nested, tagged requests. The
//! dispatcher maps each tag to an async handler; non-leaf handlers resolve
//! their sub-request through the same table, so a whole lineage unwinds
//! recursively into a flat partition list. Resolutions are never cached:
//! resolving the same request twice builds fresh partitions twice.

use crate::cache::DatasetCache;
use crate::func::SerializedFunc;
use crate::handlers;
use crate::partition::Partition;
use crate::plan::{group_by_worker, TaskRecord};
use crate::worker::{WorkerClient, WorkerRequest};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_common::{EngineError, MasterConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A declarative request tree submitted by a client.
///
/// Requests are values, not live objects. Only `loadCache` marks the
/// partitions it resolves to as cache-owned; every other kind hands
/// ownership of its outputs to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Request {
    #[serde(rename = "createRDD", rename_all = "camelCase")]
    CreateRdd {
        #[serde(default)]
        num_partitions: Option<usize>,
        #[serde(rename = "type")]
        item_type: String,
        creator: SerializedFunc,
        args: Vec<Value>,
    },
    #[serde(rename = "map", rename_all = "camelCase")]
    Map {
        sub_request: Box<Request>,
        func: SerializedFunc,
    },
    #[serde(rename = "reduce", rename_all = "camelCase")]
    Reduce {
        sub_request: Box<Request>,
        partition_func: SerializedFunc,
        final_func: SerializedFunc,
    },
    #[serde(rename = "repartition", rename_all = "camelCase")]
    Repartition {
        sub_request: Box<Request>,
        #[serde(default)]
        num_partitions: Option<usize>,
        partition_func: SerializedFunc,
    },
    #[serde(rename = "coalesce", rename_all = "camelCase")]
    Coalesce {
        sub_request: Box<Request>,
        #[serde(default)]
        num_partitions: Option<usize>,
    },
    #[serde(rename = "loadCache", rename_all = "camelCase")]
    LoadCache { dataset: String },
}

impl Request {
    /// The tag this request dispatches on.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::CreateRdd { .. } => "createRDD",
            Request::Map { .. } => "map",
            Request::Reduce { .. } => "reduce",
            Request::Repartition { .. } => "repartition",
            Request::Coalesce { .. } => "coalesce",
            Request::LoadCache { .. } => "loadCache",
        }
    }

    /// Whether the partitions this request resolves to belong to the cache.
    /// Consumers must not release cache-owned partitions.
    pub fn is_cache_owned(&self) -> bool {
        matches!(self, Request::LoadCache { .. })
    }
}

/// What a resolved request produced: a partition list for transformations,
/// a single value for actions.
#[derive(Debug)]
pub enum RequestOutcome {
    Partitions(Vec<Partition>),
    Value(Value),
}

impl RequestOutcome {
    pub fn into_partitions(self) -> Result<Vec<Partition>> {
        match self {
            RequestOutcome::Partitions(partitions) => Ok(partitions),
            RequestOutcome::Value(_) => Err(EngineError::protocol_error(
                "expected a partition list, request resolved to a value",
            )),
        }
    }

    pub fn into_value(self) -> Result<Value> {
        match self {
            RequestOutcome::Value(value) => Ok(value),
            RequestOutcome::Partitions(_) => Err(EngineError::protocol_error(
                "expected a value, request resolved to a partition list",
            )),
        }
    }
}

/// An async handler for one request kind.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome>;
}

/// Table from request kind to handler.
///
/// The registry is data, not a closed match: kinds can be re-registered and
/// new ones added next to the built-in six.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl Dispatcher {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the six built-in kinds.
    pub fn with_builtin_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register("createRDD", Arc::new(handlers::CreateRdd));
        dispatcher.register("map", Arc::new(handlers::MapPartitions));
        dispatcher.register("reduce", Arc::new(handlers::ReducePartitions));
        dispatcher.register("repartition", Arc::new(handlers::Repartition));
        dispatcher.register("coalesce", Arc::new(handlers::Coalesce));
        dispatcher.register("loadCache", Arc::new(handlers::LoadCache));
        dispatcher
    }

    pub fn register<S: Into<String>>(&mut self, kind: S, handler: Arc<dyn RequestHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub async fn dispatch(&self, request: Request, ctx: &MasterContext) -> Result<RequestOutcome> {
        let kind = request.kind();
        let handler = self.handlers.get(kind).ok_or_else(|| {
            EngineError::invalid_request_error(format!(
                "no handler registered for request kind '{kind}'"
            ))
        })?;
        debug!(kind, "dispatching request");
        handler.handle(request, ctx).await
    }
}

/// Everything a handler needs from the master: the worker roster, the
/// dispatcher for resolving sub-requests, the dataset cache and the
/// configuration. The roster is immutable for the lifetime of the context.
pub struct MasterContext {
    workers: Vec<Arc<dyn WorkerClient>>,
    dispatcher: Arc<Dispatcher>,
    cache: DatasetCache,
    config: MasterConfig,
}

impl std::fmt::Debug for MasterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterContext")
            .field("workers", &self.workers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl MasterContext {
    pub fn workers(&self) -> &[Arc<dyn WorkerClient>] {
        &self.workers
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Partition count for a request that did not specify one.
    pub fn default_partitions(&self) -> usize {
        self.config
            .default_partitions
            .unwrap_or_else(|| self.workers.len())
    }

    /// Look up the handler for `request` and run it.
    pub async fn process_request(&self, request: Request) -> Result<RequestOutcome> {
        self.dispatcher.dispatch(request, self).await
    }

    /// Resolve a sub-request that must produce partitions.
    pub async fn resolve_partitions(&self, request: Request) -> Result<Vec<Partition>> {
        self.process_request(request).await?.into_partitions()
    }

    /// Group `partitions` by worker and issue one release per worker,
    /// awaiting the whole barrier.
    ///
    /// A failure here is propagated like any pipeline failure; partitions
    /// already acknowledged stay released.
    pub async fn release_partitions(&self, partitions: &[Partition]) -> Result<()> {
        let tasks = group_by_worker(partitions);
        let releases = tasks.into_iter().map(|task| async move {
            let TaskRecord { worker, ids, .. } = task;
            debug!(
                worker = worker.worker_id(),
                count = ids.len(),
                "releasing partitions"
            );
            worker
                .process_request(WorkerRequest::Release { ids })
                .await?
                .into_ack()
        });
        try_join_all(releases).await?;
        Ok(())
    }
}

/// The master: a worker roster, a handler registry and a dataset cache.
///
/// Handlers are cooperatively concurrent: any number of requests can be in
/// flight at once, each suspended only at RPC boundaries.
#[derive(Debug)]
pub struct Master {
    context: MasterContext,
}

impl Master {
    /// Build a master over `workers` with the built-in handler registry.
    ///
    /// At least one worker is required: every placement decision divides
    /// partitions across the roster.
    pub fn new(workers: Vec<Arc<dyn WorkerClient>>, config: MasterConfig) -> Result<Self> {
        Self::with_dispatcher(workers, config, Dispatcher::with_builtin_handlers())
    }

    /// Build a master with a custom handler registry.
    pub fn with_dispatcher(
        workers: Vec<Arc<dyn WorkerClient>>,
        config: MasterConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(EngineError::configuration_error(
                "a master needs at least one worker",
            ));
        }
        info!(app = %config.app_name, workers = workers.len(), "master ready");
        Ok(Self {
            context: MasterContext {
                workers,
                dispatcher: Arc::new(dispatcher),
                cache: DatasetCache::new(),
                config,
            },
        })
    }

    pub fn context(&self) -> &MasterContext {
        &self.context
    }

    /// Resolve one client request tree.
    ///
    /// A failure aborts only this request; the master stays live and keeps
    /// accepting others.
    pub async fn process_request(&self, request: Request) -> Result<RequestOutcome> {
        let request_id = Uuid::new_v4();
        let kind = request.kind();
        info!(%request_id, kind, "processing request");
        match self.context.process_request(request).await {
            Ok(outcome) => {
                debug!(%request_id, "request completed");
                Ok(outcome)
            }
            Err(e) => {
                error!(%request_id, error = %e, "request failed");
                Err(e)
            }
        }
    }
}
