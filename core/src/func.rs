//! Serializable functions shipped between master and workers.
//!
//! User code travels as trait objects registered with `typetag` and encoded
//! with the self-describing `serde_json` format, so the receiving side can
//! instantiate the concrete struct together with its captured environment.
//! The master treats the resulting blobs as opaque bytes, with two sanctioned
//! exceptions: it composes the slicers shipped during a shuffle, and it
//! materializes the final fold of `reduce` locally.

use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_common::{EngineError, Result};
use std::fmt::Debug;

/// An opaque serialized closure: a function object plus its captured
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedFunc {
    bytes: Vec<u8>,
}

impl SerializedFunc {
    /// Capture a function object. `func` must serialize with its `typetag`
    /// tag, i.e. be passed as the boxed trait object, for
    /// [`materialize`](Self::materialize) to be its inverse.
    pub fn capture<F>(func: &F) -> Result<Self>
    where
        F: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(func).map_err(|e| {
            EngineError::serialization_error_with_source("could not capture function", e)
        })?;
        Ok(Self { bytes })
    }

    /// Reconstruct the captured function object.
    pub fn materialize<F>(&self) -> Result<F>
    where
        F: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.bytes).map_err(|e| {
            EngineError::deserialization_error_with_source("could not materialize function", e)
        })
    }

    /// Wrap bytes produced elsewhere, e.g. received from a client.
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_create<F: CreateFunc + 'static>(func: F) -> Result<Self> {
        Self::capture(&(Box::new(func) as Box<dyn CreateFunc>))
    }

    pub fn from_map<F: MapFunc + 'static>(func: F) -> Result<Self> {
        Self::capture(&(Box::new(func) as Box<dyn MapFunc>))
    }

    pub fn from_reduce<F: ReduceFunc + 'static>(func: F) -> Result<Self> {
        Self::capture(&(Box::new(func) as Box<dyn ReduceFunc>))
    }

    pub fn from_partition<F: PartitionFunc + 'static>(func: F) -> Result<Self> {
        Self::capture(&(Box::new(func) as Box<dyn PartitionFunc>))
    }

    pub fn from_slice<F: SliceFunc + 'static>(func: F) -> Result<Self> {
        Self::capture(&(Box::new(func) as Box<dyn SliceFunc>))
    }
}

/// Materializes one partition of a new dataset from its creation argument.
#[typetag::serde(tag = "type")]
pub trait CreateFunc: Send + Sync + Debug + DynClone {
    fn call(&self, arg: &Value) -> Result<Vec<Value>>;
}
dyn_clone::clone_trait_object!(CreateFunc);

/// Transforms the items of one partition into the items of its successor.
#[typetag::serde(tag = "type")]
pub trait MapFunc: Send + Sync + Debug + DynClone {
    fn call(&self, items: Vec<Value>) -> Result<Vec<Value>>;
}
dyn_clone::clone_trait_object!(MapFunc);

/// Folds the items of one partition into a single value. Also used on the
/// master for the final cross-partition fold of `reduce`.
#[typetag::serde(tag = "type")]
pub trait ReduceFunc: Send + Sync + Debug + DynClone {
    fn call(&self, items: &[Value]) -> Result<Value>;
}
dyn_clone::clone_trait_object!(ReduceFunc);

/// Routes one item to a destination partition index.
#[typetag::serde(tag = "type")]
pub trait PartitionFunc: Send + Sync + Debug + DynClone {
    fn call(&self, item: &Value) -> Result<usize>;
}
dyn_clone::clone_trait_object!(PartitionFunc);

/// Splits one partition's items into per-destination sublists. `None` marks
/// an empty slice; the worker turns every `Some` into a piece descriptor.
#[typetag::serde(tag = "type")]
pub trait SliceFunc: Send + Sync + Debug + DynClone {
    fn call(&self, items: &[Value], arg: &Value) -> Result<Vec<Option<Vec<Value>>>>;
}
dyn_clone::clone_trait_object!(SliceFunc);

/// Slicer composed by the repartition handler: routes every item with the
/// user's partition function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedSlice {
    pub num_partitions: usize,
    pub partition_func: SerializedFunc,
}

#[typetag::serde]
impl SliceFunc for KeyedSlice {
    fn call(&self, items: &[Value], _arg: &Value) -> Result<Vec<Option<Vec<Value>>>> {
        let func: Box<dyn PartitionFunc> = self.partition_func.materialize()?;
        let mut slices: Vec<Option<Vec<Value>>> = vec![None; self.num_partitions];
        for item in items {
            let dest = func.call(item)?;
            if dest >= self.num_partitions {
                return Err(EngineError::invalid_request_error(format!(
                    "partition function routed an item to destination {} of {}",
                    dest, self.num_partitions
                )));
            }
            slices[dest].get_or_insert_with(Vec::new).push(item.clone());
        }
        Ok(slices)
    }
}

/// Slicer composed by the coalesce handler: copies contiguous ranges into
/// their destinations. The per-partition `arg` is a list of
/// `[destination, start, len]` assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSlice {
    pub num_partitions: usize,
}

#[typetag::serde]
impl SliceFunc for RangeSlice {
    fn call(&self, items: &[Value], arg: &Value) -> Result<Vec<Option<Vec<Value>>>> {
        let assignments: Vec<(usize, usize, usize)> =
            serde_json::from_value(arg.clone()).map_err(|e| {
                EngineError::deserialization_error_with_source("malformed range assignments", e)
            })?;
        let mut slices: Vec<Option<Vec<Value>>> = vec![None; self.num_partitions];
        for (dest, start, len) in assignments {
            let end = start + len;
            if dest >= self.num_partitions || end > items.len() {
                return Err(EngineError::invalid_request_error(format!(
                    "range [{start}, {end}) for destination {dest} is out of bounds"
                )));
            }
            slices[dest]
                .get_or_insert_with(Vec::new)
                .extend_from_slice(&items[start..end]);
        }
        Ok(slices)
    }
}

/// Preflight reducer used by coalesce: the item count of a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountItems;

#[typetag::serde]
impl ReduceFunc for CountItems {
    fn call(&self, items: &[Value]) -> Result<Value> {
        Ok(Value::from(items.len() as u64))
    }
}
