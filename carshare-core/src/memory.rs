use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{Collection, CommitResult, Document, DocumentStore, Filter, Precondition, Write, WriteOp};
use crate::CoreResult;

type DocKey = (Collection, String);

#[derive(Debug, Clone)]
struct StoredDocument {
    version: u64,
    data: Value,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<DocKey, StoredDocument>,
    /// Versions come from one store-wide counter, so a document that is deleted
    /// and recreated never reuses a version a reader may still hold.
    clock: u64,
}

impl Inner {
    fn next_version(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// In-process document store for tests and single-node deployments
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        let inner = self.inner.read().await;
        inner.documents.keys().filter(|(c, _)| *c == collection).count()
    }
}

fn precondition_holds(precondition: Precondition, current: Option<&StoredDocument>) -> bool {
    match (precondition, current) {
        (Precondition::None, _) => true,
        (Precondition::DoesNotExist, current) => current.is_none(),
        (Precondition::MatchesVersion(expected), Some(doc)) => doc.version == expected,
        (Precondition::MatchesVersion(_), None) => false,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: Collection, id: &str) -> CoreResult<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner.documents.get(&(collection, id.to_string())).map(|doc| Document {
            collection,
            id: id.to_string(),
            version: doc.version,
            data: doc.data.clone(),
        }))
    }

    async fn put_document(&self, collection: Collection, id: &str, data: Value) -> CoreResult<u64> {
        let mut inner = self.inner.write().await;
        let version = inner.next_version();
        inner.documents.insert((collection, id.to_string()), StoredDocument { version, data });
        Ok(version)
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.documents.remove(&(collection, id.to_string()));
        Ok(())
    }

    async fn query_documents(&self, collection: Collection, filters: &[Filter]) -> CoreResult<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut docs: Vec<Document> = inner
            .documents
            .iter()
            .filter(|((c, _), doc)| *c == collection && filters.iter().all(|f| f.matches(&doc.data)))
            .map(|((c, id), doc)| Document {
                collection: *c,
                id: id.clone(),
                version: doc.version,
                data: doc.data.clone(),
            })
            .collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn commit(&self, writes: Vec<Write>) -> CoreResult<CommitResult> {
        let mut inner = self.inner.write().await;

        for write in &writes {
            let current = inner.documents.get(&(write.collection, write.id.clone()));
            if !precondition_holds(write.precondition, current) {
                debug!("Commit rejected: {}/{} changed", write.collection, write.id);
                return Ok(CommitResult::PreconditionFailed {
                    collection: write.collection,
                    id: write.id.clone(),
                });
            }
        }

        for write in writes {
            let key = (write.collection, write.id);
            match write.op {
                WriteOp::Put(data) => {
                    let version = inner.next_version();
                    inner.documents.insert(key, StoredDocument { version, data });
                }
                WriteOp::Delete => {
                    inner.documents.remove(&key);
                }
                WriteOp::Verify => {}
            }
        }

        Ok(CommitResult::Committed)
    }
}
