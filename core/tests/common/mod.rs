//! In-memory cluster shared by the integration tests.
//!
//! `LocalWorker` stores partitions as JSON item lists, executes the shipped
//! function objects, and shares one piece store with every other worker in
//! the cluster, standing in for the local-mode shared filesystem that backs
//! shuffle piece descriptors. Releases are logged so tests can assert the
//! release-exactness policy.

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shoal_common::{EngineError, MasterConfig, Result};
use shoal_core::func::{CreateFunc, MapFunc, PartitionFunc, ReduceFunc, SerializedFunc, SliceFunc};
use shoal_core::worker::{WorkerClient, WorkerReply, WorkerRequest};
use shoal_core::{Master, Partition, Request};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Piece store shared across the cluster, keyed by descriptor string.
#[derive(Default)]
pub struct PieceStore {
    pieces: Mutex<HashMap<String, Vec<Value>>>,
}

pub struct LocalWorker {
    worker_id: String,
    store: Arc<PieceStore>,
    partitions: Mutex<HashMap<String, Vec<Value>>>,
    released: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl LocalWorker {
    pub fn new(worker_id: impl Into<String>, store: Arc<PieceStore>) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            partitions: Mutex::new(HashMap::new()),
            released: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn fresh_id(&self) -> String {
        format!(
            "{}-p{}",
            self.worker_id,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        )
    }

    fn items_of(&self, id: &str) -> Result<Vec<Value>> {
        self.partitions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| {
                EngineError::not_found_error(format!(
                    "worker {} holds no partition {id}",
                    self.worker_id
                ))
            })
    }

    pub fn released_ids(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn live_partition_count(&self) -> usize {
        self.partitions.lock().unwrap().len()
    }

    pub fn partition_items(&self, id: &str) -> Option<Vec<Value>> {
        self.partitions.lock().unwrap().get(id).cloned()
    }

    pub fn shared_piece_count(&self) -> usize {
        self.store.pieces.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkerClient for LocalWorker {
    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    async fn process_request(&self, request: WorkerRequest) -> Result<WorkerReply> {
        match request {
            WorkerRequest::CreatePartition {
                creator,
                count,
                args,
                ..
            } => {
                if args.len() != count {
                    return Err(EngineError::invalid_request_error(format!(
                        "got {} creation args for {} partitions",
                        args.len(),
                        count
                    )));
                }
                let creator: Box<dyn CreateFunc> = creator.materialize()?;
                let mut ids = Vec::with_capacity(count);
                for arg in &args {
                    let items = creator.call(arg)?;
                    let id = self.fresh_id();
                    self.partitions.lock().unwrap().insert(id.clone(), items);
                    ids.push(id);
                }
                Ok(WorkerReply::Ids(ids))
            }

            WorkerRequest::Map { func, ids } => {
                let func: Box<dyn MapFunc> = func.materialize()?;
                let mut new_ids = Vec::with_capacity(ids.len());
                for id in &ids {
                    let mapped = func.call(self.items_of(id)?)?;
                    let new_id = self.fresh_id();
                    self.partitions
                        .lock()
                        .unwrap()
                        .insert(new_id.clone(), mapped);
                    new_ids.push(new_id);
                }
                Ok(WorkerReply::Ids(new_ids))
            }

            WorkerRequest::Reduce { func, ids } => {
                let func: Box<dyn ReduceFunc> = func.materialize()?;
                let values = ids
                    .iter()
                    .map(|id| func.call(&self.items_of(id)?))
                    .collect::<Result<Vec<Value>>>()?;
                Ok(WorkerReply::Values(values))
            }

            WorkerRequest::RepartitionSlice {
                ids,
                num_partitions,
                partition_func,
                args,
            } => {
                let slicer: Box<dyn SliceFunc> = partition_func.materialize()?;
                let mut rows = Vec::with_capacity(ids.len());
                for (position, id) in ids.iter().enumerate() {
                    let items = self.items_of(id)?;
                    let arg = args.get(position).cloned().unwrap_or(Value::Null);
                    let slices = slicer.call(&items, &arg)?;
                    if slices.len() != num_partitions {
                        return Err(EngineError::internal_error(format!(
                            "slicer produced {} slices for {} destinations",
                            slices.len(),
                            num_partitions
                        )));
                    }
                    let mut row = Vec::with_capacity(num_partitions);
                    for slice in slices {
                        match slice {
                            None => row.push(Value::Null),
                            Some(items) => {
                                let descriptor = format!("piece-{}", self.fresh_id());
                                self.store
                                    .pieces
                                    .lock()
                                    .unwrap()
                                    .insert(descriptor.clone(), items);
                                row.push(json!(descriptor));
                            }
                        }
                    }
                    rows.push(row);
                }
                Ok(WorkerReply::Pieces(rows))
            }

            WorkerRequest::RepartitionJoin { pieces } => {
                let mut ids = Vec::with_capacity(pieces.len());
                for row in pieces {
                    let mut items = Vec::new();
                    for descriptor in row {
                        let key = descriptor.as_str().ok_or_else(|| {
                            EngineError::internal_error("piece descriptor is not a string")
                        })?;
                        let piece = self
                            .store
                            .pieces
                            .lock()
                            .unwrap()
                            .remove(key)
                            .ok_or_else(|| {
                                EngineError::not_found_error(format!("no piece {key}"))
                            })?;
                        items.extend(piece);
                    }
                    let id = self.fresh_id();
                    self.partitions.lock().unwrap().insert(id.clone(), items);
                    ids.push(id);
                }
                Ok(WorkerReply::Ids(ids))
            }

            WorkerRequest::Release { ids } => {
                let mut partitions = self.partitions.lock().unwrap();
                let mut released = self.released.lock().unwrap();
                for id in ids {
                    partitions.remove(&id);
                    released.push(id);
                }
                Ok(WorkerReply::Released)
            }
        }
    }
}

/// Wrapper that fails every request carrying the given wire tag.
pub struct FailingWorker {
    inner: Arc<LocalWorker>,
    fail_on: &'static str,
}

#[async_trait]
impl WorkerClient for FailingWorker {
    fn worker_id(&self) -> &str {
        self.inner.worker_id()
    }

    async fn process_request(&self, request: WorkerRequest) -> Result<WorkerReply> {
        if request.tag() == self.fail_on {
            return Err(EngineError::transport_error(format!(
                "worker {} lost during {}",
                self.worker_id(),
                self.fail_on
            )));
        }
        self.inner.process_request(request).await
    }
}

pub fn local_cluster(size: usize) -> (Vec<Arc<LocalWorker>>, Master) {
    let store = Arc::new(PieceStore::default());
    let workers: Vec<Arc<LocalWorker>> = (0..size)
        .map(|i| Arc::new(LocalWorker::new(format!("w{i}"), Arc::clone(&store))))
        .collect();
    let clients: Vec<Arc<dyn WorkerClient>> = workers
        .iter()
        .map(|worker| Arc::clone(worker) as Arc<dyn WorkerClient>)
        .collect();
    let master = Master::new(clients, MasterConfig::default()).expect("cluster has workers");
    (workers, master)
}

/// A cluster where one worker fails every request with the given wire tag.
pub fn flaky_cluster(
    size: usize,
    failing: usize,
    fail_on: &'static str,
) -> (Vec<Arc<LocalWorker>>, Master) {
    let store = Arc::new(PieceStore::default());
    let workers: Vec<Arc<LocalWorker>> = (0..size)
        .map(|i| Arc::new(LocalWorker::new(format!("w{i}"), Arc::clone(&store))))
        .collect();
    let clients: Vec<Arc<dyn WorkerClient>> = workers
        .iter()
        .enumerate()
        .map(|(i, worker)| {
            if i == failing {
                Arc::new(FailingWorker {
                    inner: Arc::clone(worker),
                    fail_on,
                }) as Arc<dyn WorkerClient>
            } else {
                Arc::clone(worker) as Arc<dyn WorkerClient>
            }
        })
        .collect();
    let master = Master::new(clients, MasterConfig::default()).expect("cluster has workers");
    (workers, master)
}

/// Read a result partition's items from whichever worker holds it.
pub fn partition_contents(workers: &[Arc<LocalWorker>], partition: &Partition) -> Vec<Value> {
    workers
        .iter()
        .find(|worker| worker.worker_id() == partition.worker().worker_id())
        .and_then(|worker| worker.partition_items(partition.id()))
        .expect("partition should be live on its worker")
}

pub fn total_released(workers: &[Arc<LocalWorker>]) -> Vec<String> {
    workers
        .iter()
        .flat_map(|worker| worker.released_ids())
        .collect()
}

// --- test function vocabulary ----------------------------------------------

/// Creator whose argument is the partition's item list (a single value makes
/// a singleton partition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Literal;

#[typetag::serde]
impl CreateFunc for Literal {
    fn call(&self, arg: &Value) -> Result<Vec<Value>> {
        Ok(match arg {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddConstant {
    pub amount: i64,
}

#[typetag::serde]
impl MapFunc for AddConstant {
    fn call(&self, items: Vec<Value>) -> Result<Vec<Value>> {
        items
            .iter()
            .map(|item| {
                item.as_i64()
                    .map(|n| Value::from(n + self.amount))
                    .ok_or_else(|| EngineError::invalid_request_error("item is not an integer"))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumItems;

#[typetag::serde]
impl ReduceFunc for SumItems {
    fn call(&self, items: &[Value]) -> Result<Value> {
        Ok(Value::from(
            items.iter().filter_map(|item| item.as_i64()).sum::<i64>(),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modulo {
    pub by: usize,
}

#[typetag::serde]
impl PartitionFunc for Modulo {
    fn call(&self, item: &Value) -> Result<usize> {
        item.as_u64()
            .map(|n| n as usize % self.by)
            .ok_or_else(|| EngineError::invalid_request_error("item is not an integer"))
    }
}

// --- request builders -------------------------------------------------------

/// One singleton partition per number.
pub fn create_numbers(numbers: &[i64]) -> Request {
    Request::CreateRdd {
        num_partitions: Some(numbers.len()),
        item_type: "array".to_string(),
        creator: SerializedFunc::from_create(Literal).unwrap(),
        args: numbers.iter().map(|&n| json!(n)).collect(),
    }
}

/// One partition per list.
pub fn create_lists(lists: &[Vec<i64>]) -> Request {
    Request::CreateRdd {
        num_partitions: Some(lists.len()),
        item_type: "array".to_string(),
        creator: SerializedFunc::from_create(Literal).unwrap(),
        args: lists.iter().map(|list| json!(list)).collect(),
    }
}

pub fn map_request(sub_request: Request, amount: i64) -> Request {
    Request::Map {
        sub_request: Box::new(sub_request),
        func: SerializedFunc::from_map(AddConstant { amount }).unwrap(),
    }
}

pub fn sum_request(sub_request: Request) -> Request {
    Request::Reduce {
        sub_request: Box::new(sub_request),
        partition_func: SerializedFunc::from_reduce(SumItems).unwrap(),
        final_func: SerializedFunc::from_reduce(SumItems).unwrap(),
    }
}

pub fn repartition_request(sub_request: Request, num_partitions: usize) -> Request {
    Request::Repartition {
        sub_request: Box::new(sub_request),
        num_partitions: Some(num_partitions),
        partition_func: SerializedFunc::from_partition(Modulo {
            by: num_partitions.max(1),
        })
        .unwrap(),
    }
}

pub fn coalesce_request(sub_request: Request, num_partitions: usize) -> Request {
    Request::Coalesce {
        sub_request: Box::new(sub_request),
        num_partitions: Some(num_partitions),
    }
}
