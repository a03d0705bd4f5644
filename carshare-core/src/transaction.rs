use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::store::{Collection, CommitResult, DocumentStore, Filter, Precondition, Write, WriteOp};
use crate::{CoreError, CoreResult};

type DocKey = (Collection, String);

/// Boxed body of a transaction, borrowing the transaction for one attempt
pub type TxFuture<'a, T> = BoxFuture<'a, CoreResult<T>>;

#[derive(Debug)]
enum PendingWrite {
    Create(serde_json::Value),
    Put(serde_json::Value),
    Delete,
}

/// Optimistic multi-document transaction.
///
/// Every document read through the transaction is remembered with the version
/// that was observed (or its absence). Writes are buffered and sent to the
/// store as one batch whose preconditions pin the whole read set, so the batch
/// only lands if nothing the body looked at has changed since.
pub struct Transaction {
    store: Arc<dyn DocumentStore>,
    reads: BTreeMap<DocKey, Option<u64>>,
    writes: BTreeMap<DocKey, PendingWrite>,
}

impl Transaction {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&mut self, collection: Collection, id: &str) -> CoreResult<Option<T>> {
        let doc = self.store.get_document(collection, id).await?;
        self.record(collection, id, doc.as_ref().map(|d| d.version));
        doc.map(|d| d.decode()).transpose()
    }

    pub async fn query<T: DeserializeOwned>(&mut self, collection: Collection, filters: &[Filter]) -> CoreResult<Vec<T>> {
        let docs = self.store.query_documents(collection, filters).await?;
        let mut values = Vec::with_capacity(docs.len());
        for doc in docs {
            self.record(collection, &doc.id, Some(doc.version));
            values.push(doc.decode()?);
        }
        Ok(values)
    }

    /// Insert a document that must not exist yet.
    pub fn create<T: Serialize>(&mut self, collection: Collection, id: &str, value: &T) -> CoreResult<()> {
        let data = serde_json::to_value(value)?;
        self.writes.insert((collection, id.to_string()), PendingWrite::Create(data));
        Ok(())
    }

    pub fn put<T: Serialize>(&mut self, collection: Collection, id: &str, value: &T) -> CoreResult<()> {
        let data = serde_json::to_value(value)?;
        self.writes.insert((collection, id.to_string()), PendingWrite::Put(data));
        Ok(())
    }

    pub fn delete(&mut self, collection: Collection, id: &str) {
        self.writes.insert((collection, id.to_string()), PendingWrite::Delete);
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    // First observation wins: a later re-read must not mask a change in between.
    fn record(&mut self, collection: Collection, id: &str, version: Option<u64>) {
        self.reads.entry((collection, id.to_string())).or_insert(version);
    }

    fn precondition_for(&self, key: &DocKey) -> Precondition {
        match self.reads.get(key) {
            Some(Some(version)) => Precondition::MatchesVersion(*version),
            Some(None) => Precondition::DoesNotExist,
            None => Precondition::None,
        }
    }

    fn into_batch(self) -> Vec<Write> {
        let mut batch = Vec::with_capacity(self.reads.len() + self.writes.len());

        for key in self.reads.keys() {
            if !self.writes.contains_key(key) {
                batch.push(Write::verify(key.0, key.1.clone(), self.precondition_for(key)));
            }
        }

        for (key, pending) in &self.writes {
            let (op, precondition) = match pending {
                PendingWrite::Create(data) => (WriteOp::Put(data.clone()), Precondition::DoesNotExist),
                PendingWrite::Put(data) => (WriteOp::Put(data.clone()), self.precondition_for(key)),
                PendingWrite::Delete => (WriteOp::Delete, self.precondition_for(key)),
            };
            batch.push(Write {
                collection: key.0,
                id: key.1.clone(),
                op,
                precondition,
            });
        }

        batch
    }

    pub async fn commit(self) -> CoreResult<CommitResult> {
        if self.is_read_only() {
            return Ok(CommitResult::Committed);
        }
        let store = Arc::clone(&self.store);
        store.commit(self.into_batch()).await
    }
}

/// Runs transaction bodies against a store, re-running them when the commit
/// loses a race, up to the policy's attempt budget.
#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl TransactionRunner {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute `body` inside a transaction.
    ///
    /// Errors returned by the body abort the transaction without writing and
    /// are passed through unchanged. Exhausting the attempt budget yields
    /// `CoreError::Conflict`.
    pub async fn run<T, F>(&self, operation: &str, mut body: F) -> CoreResult<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut Transaction) -> TxFuture<'a, T> + Send,
    {
        let mut attempt = 1;
        loop {
            let mut tx = Transaction::new(Arc::clone(&self.store));
            let value = body(&mut tx).await?;

            match tx.commit().await? {
                CommitResult::Committed => return Ok(value),
                CommitResult::PreconditionFailed { collection, id } => {
                    if !self.policy.allows_retry(attempt) {
                        warn!("{} gave up after {} attempts: {}/{} kept changing", operation, attempt, collection, id);
                        return Err(CoreError::Conflict(format!(
                            "{} could not commit after {} attempts",
                            operation, attempt
                        )));
                    }

                    let delay = self.policy.backoff(attempt);
                    debug!("{} lost a race on {}/{} (attempt {}), retrying in {:?}", operation, collection, id, attempt, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
