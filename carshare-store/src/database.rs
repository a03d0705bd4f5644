use async_trait::async_trait;
use carshare_core::{
    Collection, CommitResult, CoreError, CoreResult, Document, DocumentStore, Filter, FilterOp, Precondition, Write,
    WriteOp,
};
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{debug, info};

/// Document store over one Postgres `documents` table
#[derive(Clone)]
pub struct PgDocumentStore {
    pub pool: Pool<Postgres>,
}

impl PgDocumentStore {
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

fn storage_error(context: &str, err: sqlx::Error) -> CoreError {
    CoreError::Storage(format!("{}: {}", context, err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Equality filters become one `@>` containment document; the rest are
/// evaluated after fetching.
fn split_filters(filters: &[Filter]) -> (Value, Vec<&Filter>) {
    let mut containment = Map::new();
    let mut residual = Vec::new();
    for filter in filters {
        match &filter.op {
            FilterOp::Eq(value) if !containment.contains_key(&filter.field) => {
                containment.insert(filter.field.clone(), value.clone());
            }
            _ => residual.push(filter),
        }
    }
    (Value::Object(containment), residual)
}

fn precondition_holds(precondition: Precondition, current: Option<i64>) -> bool {
    match (precondition, current) {
        (Precondition::None, _) => true,
        (Precondition::DoesNotExist, current) => current.is_none(),
        (Precondition::MatchesVersion(expected), Some(version)) => version as u64 == expected,
        (Precondition::MatchesVersion(_), None) => false,
    }
}

const UPSERT: &str = r#"
    INSERT INTO documents (collection, id, version, data, updated_at)
    VALUES ($1, $2, nextval('document_versions'), $3, NOW())
    ON CONFLICT (collection, id)
    DO UPDATE SET version = EXCLUDED.version, data = EXCLUDED.data, updated_at = NOW()
    RETURNING version
"#;

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_document(&self, collection: Collection, id: &str) -> CoreResult<Option<Document>> {
        let row: Option<(i64, Value)> =
            sqlx::query_as("SELECT version, data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage_error("get document", e))?;

        Ok(row.map(|(version, data)| Document {
            collection,
            id: id.to_string(),
            version: version as u64,
            data,
        }))
    }

    async fn put_document(&self, collection: Collection, id: &str, data: Value) -> CoreResult<u64> {
        let (version,): (i64,) = sqlx::query_as(UPSERT)
            .bind(collection.as_str())
            .bind(id)
            .bind(data)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("put document", e))?;
        Ok(version as u64)
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("delete document", e))?;
        Ok(())
    }

    async fn query_documents(&self, collection: Collection, filters: &[Filter]) -> CoreResult<Vec<Document>> {
        let (containment, residual) = split_filters(filters);

        let rows: Vec<(String, i64, Value)> = sqlx::query_as(
            "SELECT id, version, data FROM documents WHERE collection = $1 AND data @> $2 ORDER BY id",
        )
        .bind(collection.as_str())
        .bind(containment)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("query documents", e))?;

        Ok(rows
            .into_iter()
            .filter(|(_, _, data)| residual.iter().all(|f| f.matches(data)))
            .map(|(id, version, data)| Document {
                collection,
                id,
                version: version as u64,
                data,
            })
            .collect())
    }

    /// Locks every touched row in key order, checks all preconditions, then
    /// applies the batch in the same database transaction.
    ///
    /// An absent row cannot be locked. A `Put` under `DoesNotExist` is still
    /// caught by the primary key, but a `Verify` under `DoesNotExist` does
    /// not see a row inserted after the check. Transactions that read a
    /// missing ride or request abort with `NotFound` and never commit such a
    /// verify.
    async fn commit(&self, mut writes: Vec<Write>) -> CoreResult<CommitResult> {
        writes.sort_by(|a, b| (a.collection, &a.id).cmp(&(b.collection, &b.id)));

        let mut tx = self.pool.begin().await.map_err(|e| storage_error("begin transaction", e))?;

        for write in &writes {
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE")
                    .bind(write.collection.as_str())
                    .bind(&write.id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| storage_error("lock document", e))?;

            if !precondition_holds(write.precondition, current.map(|(v,)| v)) {
                debug!("Commit rejected: {}/{} changed", write.collection, write.id);
                let _ = tx.rollback().await;
                return Ok(CommitResult::PreconditionFailed {
                    collection: write.collection,
                    id: write.id.clone(),
                });
            }
        }

        for write in &writes {
            let result = match &write.op {
                WriteOp::Put(data) => sqlx::query(UPSERT)
                    .bind(write.collection.as_str())
                    .bind(&write.id)
                    .bind(data)
                    .execute(&mut *tx)
                    .await
                    .map(|_| ()),
                WriteOp::Delete => sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                    .bind(write.collection.as_str())
                    .bind(&write.id)
                    .execute(&mut *tx)
                    .await
                    .map(|_| ()),
                WriteOp::Verify => Ok(()),
            };

            if let Err(e) = result {
                let _ = tx.rollback().await;
                // Two creators raced past the unlocked "does not exist" check
                if is_unique_violation(&e) {
                    return Ok(CommitResult::PreconditionFailed {
                        collection: write.collection,
                        id: write.id.clone(),
                    });
                }
                return Err(storage_error("apply write", e));
            }
        }

        tx.commit().await.map_err(|e| storage_error("commit transaction", e))?;
        Ok(CommitResult::Committed)
    }
}
