use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scanflow_activity::{
  ActivityDeps, ActivityExecutor, CommandSbomSource, CommandScanner, FileSbomSource,
  InventoryItem, SbomSource, default_registry,
};
use scanflow_config::{SbomConfig, ServiceConfig, StoreConfig};
use scanflow_host_kv::{FsKvStore, InMemoryKvStore, KvStore};
use scanflow_ledger::Ledger;
use scanflow_orchestrator::Orchestrator;

/// Scanflow - durable scan-and-fulfillment saga orchestrator
#[derive(Parser)]
#[command(name = "scanflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to a JSON configuration file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Path to the data directory (default: ~/.scanflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Emit logs as JSON lines
  #[arg(long, global = true)]
  log_json: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the orchestrator and its control API (the default)
  Serve {
    /// Address to listen on, overriding the configuration
    #[arg(long)]
    bind: Option<String>,
  },

  /// Print the effective configuration as JSON
  Config,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.log_json);

  let mut config = match &cli.config {
    Some(path) => ServiceConfig::from_path(path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None => ServiceConfig::default(),
  };
  if let Some(data_dir) = cli.data_dir {
    config.data_dir = Some(data_dir);
  }

  match cli.command.unwrap_or(Commands::Serve { bind: None }) {
    Commands::Serve { bind } => {
      if let Some(bind) = bind {
        config.bind_address = bind;
      }
      config.validate().context("invalid configuration")?;
      serve(config)
    }
    Commands::Config => {
      println!("{}", serde_json::to_string_pretty(&config)?);
      Ok(())
    }
  }
}

fn init_tracing(json: bool) {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("scanflow=info,tower_http=info"));
  let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
  if json {
    subscriber.json().init();
  } else {
    subscriber.init();
  }
}

fn serve(config: ServiceConfig) -> Result<()> {
  let data_dir = match &config.data_dir {
    Some(dir) => dir.clone(),
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".scanflow"),
  };

  // Instances run here; the runtime below only serves the control API.
  let workers = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(config.worker_threads)
    .thread_name("scanflow-worker")
    .enable_all()
    .build()
    .context("failed to build worker runtime")?;

  let rt = tokio::runtime::Runtime::new()?;
  let result = rt.block_on(serve_async(config, data_dir, workers.handle().clone()));

  workers.shutdown_timeout(Duration::from_secs(5));
  result
}

async fn serve_async(
  config: ServiceConfig,
  data_dir: PathBuf,
  workers: tokio::runtime::Handle,
) -> Result<()> {
  let store: Arc<dyn KvStore> = match &config.store {
    StoreConfig::Memory { max_value_bytes } => Arc::new(InMemoryKvStore::new(*max_value_bytes)),
    StoreConfig::Fs {
      path,
      max_value_bytes,
    } => {
      let path = path
        .clone()
        .unwrap_or_else(|| data_dir.join(&config.state_store));
      info!(path = %path.display(), "using file-backed state store");
      Arc::new(FsKvStore::new(path, *max_value_bytes))
    }
  };

  let ledger = Ledger::new(store.clone(), config.ledger_max_attempts);
  let stock: Vec<InventoryItem> = config
    .inventory
    .iter()
    .map(|item| InventoryItem {
      item_name: item.item_name.clone(),
      per_item_cost: item.per_item_cost,
      quantity: item.quantity,
    })
    .collect();
  ledger
    .restock(&stock)
    .await
    .context("failed to write base stock")?;

  let sbom_source: Arc<dyn SbomSource> = match &config.sbom {
    SbomConfig::File { path } => Arc::new(FileSbomSource::new(path)),
    SbomConfig::Command { program } => Arc::new(CommandSbomSource::new(program)),
  };

  let registry = default_registry(ActivityDeps {
    store: store.clone(),
    ledger,
    scanner: Arc::new(CommandScanner::new(
      &config.scanner.program,
      config.scanner.fail_on.clone(),
    )),
    sbom_source,
    chunk_size: config.chunk_size,
    staging_dir: data_dir.join("staging"),
    retain_chunks: config.retain_chunks,
    approval_limit: config.approval_limit,
  });
  let executor = ActivityExecutor::new(registry)
    .with_timeout(config.activity_timeout_ms.map(Duration::from_millis));

  let orchestrator = Orchestrator::new(&config, Arc::new(executor), store).with_workers(workers);
  let handle = orchestrator.handle();

  let cancel = CancellationToken::new();
  let orchestrator_task = tokio::spawn(orchestrator.run(cancel.clone()));

  let listener = tokio::net::TcpListener::bind(&config.bind_address)
    .await
    .with_context(|| format!("failed to bind {}", config.bind_address))?;
  info!(
    address = %config.bind_address,
    workflow_name = %config.workflow_name,
    "control api listening"
  );

  let shutdown = cancel.clone();
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => info!("shutdown signal received"),
      Err(e) => {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
      }
    }
    shutdown.cancel();
  });

  let server_cancel = cancel.clone();
  axum::serve(listener, scanflow_api::router(handle))
    .with_graceful_shutdown(async move { server_cancel.cancelled().await })
    .await
    .context("control api server failed")?;

  cancel.cancel();
  orchestrator_task
    .await
    .context("orchestrator task panicked")?
    .context("orchestrator failed")?;

  info!("scanflow stopped");
  Ok(())
}
