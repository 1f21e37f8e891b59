//! The master's view of a worker: a typed request channel.
//!
//! Transport, framing and the worker-side executors live behind
//! implementations of [`WorkerClient`]; the master submits one logical
//! request per call and awaits the matching reply.

use crate::func::SerializedFunc;
use crate::partition::PartitionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_common::{EngineError, Result};

/// A tagged request submitted to one worker.
///
/// `args` in `RepartitionSlice` is either empty (key-routed shuffle) or a
/// list parallel to `ids` (range-routed shuffle).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerRequest {
    #[serde(rename = "CREATE_PARTITION", rename_all = "camelCase")]
    CreatePartition {
        #[serde(rename = "type")]
        item_type: String,
        creator: SerializedFunc,
        count: usize,
        args: Vec<Value>,
    },
    #[serde(rename = "MAP")]
    Map {
        func: SerializedFunc,
        ids: Vec<PartitionId>,
    },
    #[serde(rename = "REDUCE")]
    Reduce {
        func: SerializedFunc,
        ids: Vec<PartitionId>,
    },
    #[serde(rename = "REPARTITION_SLICE", rename_all = "camelCase")]
    RepartitionSlice {
        ids: Vec<PartitionId>,
        num_partitions: usize,
        partition_func: SerializedFunc,
        args: Vec<Value>,
    },
    #[serde(rename = "REPARTITION_JOIN")]
    RepartitionJoin { pieces: Vec<Vec<Value>> },
    #[serde(rename = "RELEASE")]
    Release { ids: Vec<PartitionId> },
}

impl WorkerRequest {
    /// The wire tag of this request, for logs and diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            WorkerRequest::CreatePartition { .. } => "CREATE_PARTITION",
            WorkerRequest::Map { .. } => "MAP",
            WorkerRequest::Reduce { .. } => "REDUCE",
            WorkerRequest::RepartitionSlice { .. } => "REPARTITION_SLICE",
            WorkerRequest::RepartitionJoin { .. } => "REPARTITION_JOIN",
            WorkerRequest::Release { .. } => "RELEASE",
        }
    }
}

/// Reply to a [`WorkerRequest`].
///
/// `Pieces` carries one row per input partition; each row has one piece
/// descriptor per destination, with `null` standing for an empty slice.
/// Descriptors are opaque to the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerReply {
    Ids(Vec<PartitionId>),
    Values(Vec<Value>),
    Pieces(Vec<Vec<Value>>),
    Released,
}

impl WorkerReply {
    fn tag(&self) -> &'static str {
        match self {
            WorkerReply::Ids(_) => "Ids",
            WorkerReply::Values(_) => "Values",
            WorkerReply::Pieces(_) => "Pieces",
            WorkerReply::Released => "Released",
        }
    }

    pub fn into_ids(self) -> Result<Vec<PartitionId>> {
        match self {
            WorkerReply::Ids(ids) => Ok(ids),
            other => Err(EngineError::protocol_error(format!(
                "expected partition ids, worker replied with {}",
                other.tag()
            ))),
        }
    }

    pub fn into_values(self) -> Result<Vec<Value>> {
        match self {
            WorkerReply::Values(values) => Ok(values),
            other => Err(EngineError::protocol_error(format!(
                "expected values, worker replied with {}",
                other.tag()
            ))),
        }
    }

    pub fn into_pieces(self) -> Result<Vec<Vec<Value>>> {
        match self {
            WorkerReply::Pieces(pieces) => Ok(pieces),
            other => Err(EngineError::protocol_error(format!(
                "expected piece descriptors, worker replied with {}",
                other.tag()
            ))),
        }
    }

    pub fn into_ack(self) -> Result<()> {
        match self {
            WorkerReply::Released => Ok(()),
            other => Err(EngineError::protocol_error(format!(
                "expected a release acknowledgement, worker replied with {}",
                other.tag()
            ))),
        }
    }
}

/// Typed request channel to a single worker.
///
/// Implementations must accept concurrent submissions from many in-flight
/// handlers, with one logical pending request per submitted message matched
/// by its reply. Timeouts, if any, are an implementation concern.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Stable identifier for this worker, unique within the cluster.
    fn worker_id(&self) -> &str;

    /// Submit a tagged request and await its reply.
    async fn process_request(&self, request: WorkerRequest) -> Result<WorkerReply>;
}
