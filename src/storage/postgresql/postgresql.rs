use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::error::DatabaseError;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Connection, PgPool, Postgres, Row};

use crate::datamodel::{CollectionName, ParsedDocument};
use crate::storage::common::{StoredDocument, document_key, sequence_from_i64, sequence_to_i64};
use crate::storage::{DocumentFailure, DocumentStore, StoreError, StoreSession, WriteOutcome};

/// Documents are kept in JSONB columns, one table per collection.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn create_collection(&self, collection: &CollectionName) -> Result<(), StoreError> {
        let statement = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id TEXT PRIMARY KEY,
                batch_sequence BIGINT NOT NULL,
                document JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            collection
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let connection = self.pool.acquire().await?;
        Ok(Box::new(PostgresSession {
            connection: Some(connection),
        }))
    }

    async fn read_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let statement = format!(
            r#"SELECT id, batch_sequence, document FROM "{}" ORDER BY batch_sequence ASC, inserted_at ASC, id ASC"#,
            collection
        );
        let mut rows = sqlx::query(&statement).fetch(&self.pool);

        let mut documents = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let key: String = row.try_get("id")?;
            let batch_sequence: i64 = row.try_get("batch_sequence")?;
            let Json(body): Json<Map<String, Value>> = row.try_get("document")?;
            documents.push(StoredDocument {
                key,
                batch_sequence: sequence_from_i64(batch_sequence),
                body,
            });
        }
        Ok(documents)
    }

    async fn count(&self, collection: &CollectionName) -> Result<u64, StoreError> {
        let statement = format!(r#"SELECT COUNT(*) FROM "{}""#, collection);
        let count: i64 = sqlx::query_scalar(&statement)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Data exceptions (class 22) and integrity violations (class 23) are
/// caused by the row itself. Anything else concerns the connection.
fn is_data_exception(err: &dyn DatabaseError) -> bool {
    err.code()
        .is_some_and(|code| code.starts_with("22") || code.starts_with("23"))
}

#[derive(Debug)]
pub struct PostgresSession {
    connection: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl StoreSession for PostgresSession {
    async fn write_batch(
        &mut self,
        collection: &CollectionName,
        documents: &[ParsedDocument],
    ) -> Result<WriteOutcome, StoreError> {
        let connection = self.connection.as_mut().ok_or(StoreError::SessionClosed)?;
        if documents.is_empty() {
            return Ok(WriteOutcome::default());
        }

        // A unique violation would abort the whole transaction, hence DO NOTHING.
        let statement = format!(
            r#"
            INSERT INTO "{}" (id, batch_sequence, document)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
            collection
        );

        let mut outcome = WriteOutcome::default();
        let mut transaction = connection.begin().await?;
        for (index, document) in documents.iter().enumerate() {
            let key = match document_key(document) {
                Ok(key) => key,
                Err(reason) => {
                    outcome
                        .failures
                        .push(DocumentFailure::schema_violation(index, reason));
                    continue;
                }
            };

            // One savepoint per document, so a rejected row does not poison the batch.
            let mut savepoint = Connection::begin(&mut *transaction).await?;
            let result = sqlx::query(&statement)
                .bind(&key)
                .bind(sequence_to_i64(document.batch_sequence))
                .bind(Json(&document.body))
                .execute(&mut *savepoint)
                .await;

            let result = match result {
                Ok(result) => {
                    savepoint.commit().await?;
                    result
                }
                Err(sqlx::Error::Database(err)) if is_data_exception(&*err) => {
                    savepoint.rollback().await?;
                    outcome.failures.push(DocumentFailure::schema_violation(
                        index,
                        format!("{} (SQLSTATE {})", err.message(), err.code().unwrap_or_default()),
                    ));
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if result.rows_affected() == 0 {
                outcome
                    .failures
                    .push(DocumentFailure::duplicate_key(index, key));
            } else {
                outcome.persisted += 1;
            }
        }
        transaction.commit().await?;

        Ok(outcome)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(connection) = self.connection.take() {
            connection.close().await?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.connection.is_none()
    }
}
