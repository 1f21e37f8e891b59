//! Shoal core module
//!
//! This module provides the master-side orchestration core of the Shoal
//! compute fabric: the request dispatcher, partition placement and grouping,
//! the two-phase shuffle protocol, and the lifetime management of remote
//! partition handles.

pub mod cache;
pub mod dispatch;
pub mod func;
pub mod handlers;
pub mod partition;
pub mod plan;
pub mod shuffle;
pub mod worker;

pub use cache::DatasetCache;
pub use dispatch::{Dispatcher, Master, MasterContext, Request, RequestHandler, RequestOutcome};
pub use func::{CreateFunc, MapFunc, PartitionFunc, ReduceFunc, SerializedFunc, SliceFunc};
pub use partition::{Partition, PartitionId};
pub use plan::{balanced_shares, group_by_worker, TaskRecord};
pub use worker::{WorkerClient, WorkerReply, WorkerRequest};
