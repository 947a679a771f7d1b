use anyhow::{Error, bail};
use confique::Config;

use crate::datamodel::CollectionName;
use crate::loader::RunnerOptions;

#[derive(Debug, Config)]
pub struct LoaderConfig {
    #[config(
        env = "VARLOAD_STORAGE_CONNECTION_STRING",
        default = "sqlite://varload.db"
    )]
    pub storage_connection_string: String,

    #[config(env = "VARLOAD_COLLECTION", default = "variants")]
    pub collection: String,

    #[config(env = "VARLOAD_RECORD_FORMAT", default = "json")]
    pub record_format: String,

    #[config(env = "VARLOAD_WORKERS", default = 4)]
    pub workers: usize,

    #[config(env = "VARLOAD_QUEUE_CAPACITY", default = 16)]
    pub queue_capacity: usize,

    #[config(env = "VARLOAD_BATCH_SIZE", default = 1000)]
    pub batch_size: usize,

    /// Each worker holds one connection for the whole run.
    #[config(env = "VARLOAD_MAX_CONNECTIONS", default = 16)]
    pub max_connections: u32,

    #[config(
        env = "VARLOAD_REQUIRED_FIELDS",
        parse_env = confique::env::parse::list_by_comma
    )]
    pub required_fields: Option<Vec<String>>,

    #[config(env = "VARLOAD_MAX_REPORTED_FAILURES", default = 100)]
    pub max_reported_failures: usize,

    #[config(env = "VARLOAD_SENTRY_DSN")]
    pub sentry_dsn: Option<String>,
}

impl LoaderConfig {
    pub fn load() -> Result<LoaderConfig, Error> {
        let c = LoaderConfig::builder()
            .env()
            .file("settings.toml")
            .load()?;

        Ok(c)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            bail!("At least one worker is required");
        }
        if self.queue_capacity == 0 {
            bail!("Queue capacity must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("Batch size is 0");
        }
        if self.workers > self.max_connections as usize {
            bail!(
                "{} workers need {} connections, but max_connections is {}",
                self.workers,
                self.workers,
                self.max_connections
            );
        }
        self.collection_name()?;
        Ok(())
    }

    pub fn collection_name(&self) -> Result<CollectionName, Error> {
        Ok(CollectionName::new(self.collection.as_str())?)
    }

    pub fn required_fields(&self) -> Vec<String> {
        self.required_fields.clone().unwrap_or_default()
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            workers: self.workers,
            max_reported_failures: self.max_reported_failures,
        }
    }
}
