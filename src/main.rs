#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing::event;
use varload::config::LoaderConfig;
use varload::importers::spawn_file_import;
use varload::loader::LoadRunner;
use varload::parsing::get_parser_from_name;
use varload::queue::WorkQueue;
use varload::storage::Destination;
use varload::storage::storage_factory::create_store_from_connection_string;

#[derive(Debug, Parser)]
#[command(name = "varload", version, about = "Bulk loader for JSON-lines biological datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a JSON-lines file (optionally gzipped) into a collection
    Load(LoadArgs),
    /// Print the number of documents in a collection
    Count(CountArgs),
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// Storage connection string, e.g. sqlite://varload.db or postgres://...
    #[arg(long)]
    storage: Option<String>,
    /// Destination collection
    #[arg(long)]
    collection: Option<String>,
}

#[derive(Debug, Args)]
struct LoadArgs {
    #[arg(long, short)]
    input: PathBuf,
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    queue_capacity: Option<usize>,
}

#[derive(Debug, Args)]
struct CountArgs {
    #[command(flatten)]
    store: StoreArgs,
}

impl StoreArgs {
    fn apply(&self, config: &mut LoaderConfig) {
        if let Some(storage) = &self.storage {
            config.storage_connection_string = storage.clone();
        }
        if let Some(collection) = &self.collection {
            config.collection = collection.clone();
        }
    }
}

fn main() -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = LoaderConfig::load().context("Failed to load configuration")?;

    // Initialize Sentry if DSN is provided
    let _sentry = config.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    match cli.command {
        Command::Load(args) => {
            args.store.apply(&mut config);
            if let Some(workers) = args.workers {
                config.workers = workers;
            }
            if let Some(batch_size) = args.batch_size {
                config.batch_size = batch_size;
            }
            if let Some(queue_capacity) = args.queue_capacity {
                config.queue_capacity = queue_capacity;
            }
            load(&config, args.input).await
        }
        Command::Count(args) => {
            args.store.apply(&mut config);
            count(&config).await
        }
    }
}

async fn load(config: &LoaderConfig, input: PathBuf) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    println!(
        "🗄️  Connecting to storage: {}",
        config.storage_connection_string
    );
    let store =
        create_store_from_connection_string(&config.storage_connection_string, config.max_connections)
            .await
            .context("Failed to create storage backend")?;

    let parser = get_parser_from_name(&config.record_format, config.required_fields())?;
    let queue = WorkQueue::new(config.queue_capacity)?;
    let destination = Destination::new(config.collection_name()?, store);
    let runner = LoadRunner::new(
        queue.clone(),
        destination,
        Arc::from(parser),
        config.runner_options(),
    );

    println!("📥 Loading {} into {}...", input.display(), config.collection);
    let import = spawn_file_import(input, queue, config.batch_size);
    let result = runner.run().await;
    let import_result = import.await.context("Import task panicked")?;

    match result {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            match import_result {
                Ok(imported) if imported.invalid_lines > 0 => {
                    eprintln!(
                        "⚠️  Skipped {} line(s) that are not valid UTF-8",
                        imported.invalid_lines
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    event!(Level::ERROR, "Import failed: {:#}", err);
                    eprintln!("❌ Input could not be read completely: {:#}", err);
                    return Ok(ExitCode::FAILURE);
                }
            }
            println!("✅ Load completed");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            event!(Level::ERROR, "Load failed: {}", err);
            if let Some(summary) = err.summary() {
                println!("{}", serde_json::to_string_pretty(summary)?);
            }
            eprintln!("❌ {}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn count(config: &LoaderConfig) -> Result<ExitCode> {
    let store = create_store_from_connection_string(&config.storage_connection_string, 1)
        .await
        .context("Failed to create storage backend")?;
    let collection = config.collection_name()?;
    let count = store
        .count(&collection)
        .await
        .with_context(|| format!("Failed to count documents in {}", collection))?;
    println!("{}", count);
    Ok(ExitCode::SUCCESS)
}
