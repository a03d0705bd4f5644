use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::{CoreError, CoreResult};

/// Document collections owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Collection {
    Rides,
    RideRequests,
    Users,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Rides => "rides",
            Collection::RideRequests => "rideRequests",
            Collection::Users => "users",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored JSON document together with its store-assigned version
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: Collection,
    pub id: String,
    pub version: u64,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> CoreResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            CoreError::Storage(format!("malformed {} document {}: {}", self.collection, self.id, e))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Gte(Value),
    Lte(Value),
    In(Vec<Value>),
}

/// Predicate on a top-level document field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Eq(value.into()) }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Gte(value.into()) }
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self { field: field.to_string(), op: FilterOp::Lte(value.into()) }
    }

    pub fn one_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        let Some(actual) = data.get(&self.field) else {
            return false;
        };

        match &self.op {
            FilterOp::Eq(expected) => actual == expected,
            FilterOp::Gte(bound) => matches!(compare(actual, bound), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lte(bound) => matches!(compare(actual, bound), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::In(candidates) => candidates.contains(actual),
        }
    }
}

/// Orders scalars of the same JSON type. ISO dates compare correctly as strings.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Condition a write must satisfy against the currently stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Write only if no document exists under the key.
    DoesNotExist,
    /// Write only if the stored version matches.
    MatchesVersion(u64),
    /// Write unconditionally.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Value),
    Delete,
    /// Check the precondition without changing the document.
    Verify,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub collection: Collection,
    pub id: String,
    pub op: WriteOp,
    pub precondition: Precondition,
}

impl Write {
    pub fn put(collection: Collection, id: impl Into<String>, data: Value) -> Self {
        Self { collection, id: id.into(), op: WriteOp::Put(data), precondition: Precondition::None }
    }

    pub fn delete(collection: Collection, id: impl Into<String>) -> Self {
        Self { collection, id: id.into(), op: WriteOp::Delete, precondition: Precondition::None }
    }

    pub fn verify(collection: Collection, id: impl Into<String>, precondition: Precondition) -> Self {
        Self { collection, id: id.into(), op: WriteOp::Verify, precondition }
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = precondition;
        self
    }
}

/// Outcome of an atomic batch commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Committed,
    /// Nothing was written; the named document no longer matches what the caller read.
    PreconditionFailed { collection: Collection, id: String },
}

/// Persistence collaborator.
///
/// `commit` must apply every write of the batch or none of them, checking all
/// preconditions before the first write becomes visible.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: Collection, id: &str) -> CoreResult<Option<Document>>;

    /// Unconditional upsert. Returns the new version.
    async fn put_document(&self, collection: Collection, id: &str, data: Value) -> CoreResult<u64>;

    /// Idempotent: deleting a missing document succeeds.
    async fn delete_document(&self, collection: Collection, id: &str) -> CoreResult<()>;

    /// Documents matching every filter. No ordering guarantee.
    async fn query_documents(&self, collection: Collection, filters: &[Filter]) -> CoreResult<Vec<Document>>;

    async fn commit(&self, writes: Vec<Write>) -> CoreResult<CommitResult>;
}
