pub mod store;
pub mod memory;
pub mod transaction;
pub mod retry;
pub mod identity;
pub mod guard;
pub mod notify;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use guard::{assert_owner, Owned};
pub use identity::{Actor, IdentityProvider, StaticIdentity};
pub use memory::MemoryStore;
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use retry::RetryPolicy;
pub use store::{Collection, CommitResult, Document, DocumentStore, Filter, FilterOp, Precondition, Write, WriteOp};
pub use transaction::{Transaction, TransactionRunner, TxFuture};

/// Error taxonomy shared by every engine operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Capacity exceeded: requested {requested}, remaining {remaining}")]
    CapacityExceeded { requested: u32, remaining: u32 },
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Storage(format!("document encoding: {}", err))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Opaque user identifier issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
