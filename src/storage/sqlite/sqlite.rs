use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::datamodel::{CollectionName, ParsedDocument};
use crate::storage::common::{StoredDocument, document_key, sequence_from_i64, sequence_to_i64};
use crate::storage::{DocumentFailure, DocumentStore, StoreError, StoreSession, WriteOutcome};

// SQLite implementation
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(connection_string)?
            // Create the database file if it doesn't exist
            .create_if_missing(true)
            // Concurrent workers write through their own connections
            .journal_mode(SqliteJournalMode::Wal)
            // Writers wait for each other instead of failing right away
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_collection(&self, collection: &CollectionName) -> Result<(), StoreError> {
        let statement = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id TEXT PRIMARY KEY NOT NULL,
                batch_sequence INTEGER NOT NULL,
                document TEXT NOT NULL
            )
            "#,
            collection
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let connection = self.pool.acquire().await?;
        Ok(Box::new(SqliteSession {
            connection: Some(connection),
        }))
    }

    async fn read_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let statement = format!(
            r#"SELECT id, batch_sequence, document FROM "{}" ORDER BY rowid ASC"#,
            collection
        );
        let mut rows = sqlx::query(&statement).fetch(&self.pool);

        let mut documents = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let key: String = row.try_get("id")?;
            let batch_sequence: i64 = row.try_get("batch_sequence")?;
            let document: String = row.try_get("document")?;
            let body: Map<String, Value> = serde_json::from_str(&document).map_err(|err| {
                StoreError::InvalidStoredDocument {
                    collection: collection.to_string(),
                    key: key.clone(),
                    message: err.to_string(),
                }
            })?;
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

/// One pooled connection, held for the lifetime of a worker.
#[derive(Debug)]
pub struct SqliteSession {
    connection: Option<PoolConnection<Sqlite>>,
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn write_batch(
        &mut self,
        collection: &CollectionName,
        documents: &[ParsedDocument],
    ) -> Result<WriteOutcome, StoreError> {
        let connection = self.connection.as_mut().ok_or(StoreError::SessionClosed)?;
        if documents.is_empty() {
            return Ok(WriteOutcome::default());
        }

        let statement = format!(
            r#"
            INSERT INTO "{}" (id, batch_sequence, document)
            VALUES (?, ?, ?)
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
            let body = serde_json::to_string(&document.body)
                .map_err(|err| StoreError::operation_failed("serialize document", err))?;

            let result = sqlx::query(&statement)
                .bind(&key)
                .bind(sequence_to_i64(document.batch_sequence))
                .bind(body)
                .execute(&mut *transaction)
                .await?;

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
