use std::sync::Arc;

use anyhow::{Result, bail};

use super::DocumentStore;
use super::memory::MemoryStore;

#[cfg(feature = "postgres")]
use super::postgresql::PostgresStore;

#[cfg(feature = "sqlite")]
use super::sqlite::SqliteStore;

pub async fn create_store_from_connection_string(
    connection_string: &str,
    max_connections: u32,
) -> Result<Arc<dyn DocumentStore>> {
    Ok(match connection_string {
        s if s.starts_with("memory:") => Arc::new(MemoryStore::new()),

        #[cfg(feature = "postgres")]
        s if s.starts_with("postgres:") || s.starts_with("postgresql:") => {
            Arc::new(PostgresStore::connect(s, max_connections).await?)
        }

        #[cfg(feature = "sqlite")]
        s if s.starts_with("sqlite:") => Arc::new(SqliteStore::connect(s, max_connections).await?),

        // Provide helpful error messages for disabled backends
        #[cfg(not(feature = "postgres"))]
        s if s.starts_with("postgres:") || s.starts_with("postgresql:") => {
            let _ = max_connections;
            bail!("PostgreSQL storage backend is not enabled. Enable with --features postgres")
        }

        #[cfg(not(feature = "sqlite"))]
        s if s.starts_with("sqlite:") => {
            let _ = max_connections;
            bail!("SQLite storage backend is not enabled. Enable with --features sqlite")
        }

        _ => bail!("Unsupported storage type: {}", connection_string),
    })
}
