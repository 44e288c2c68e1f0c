//! Worker binary: polls the Store for queued runs and drives them to
//! completion (`spec.md` §6, `SPEC_FULL.md` §6 configuration table).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use durable_flow::checkpoint::Checkpointer;
use durable_flow::registry::{GraphRegistry, InMemoryGraphRegistry};
use durable_flow::store::Store;
use durable_flow::worker::{WorkerConfig, WorkerPool};

#[derive(Debug, Parser)]
#[command(name = "durable-flow-worker", about = "Durable workflow worker pool")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "WORKERS", default_value_t = 4)]
    workers: usize,

    #[arg(long, env = "TASK_TIMEOUT_MINUTES", default_value_t = 20)]
    task_timeout_minutes: u64,

    #[arg(long, env = "WORKFLOW_DEFINITIONS_PATH", default_value = "workflow_definitions")]
    workflow_definitions_path: PathBuf,

    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value_t = 10)]
    poll_interval_seconds: u64,
}

fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,durable_flow=info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Lists the `.wirl`-suffixed stems under `dir` so operators can see at a
/// glance which graphs the embedding application is expected to register.
/// Parsing the template format itself is out of scope for this crate
/// (`spec.md` §1) — the host application must call
/// [`InMemoryGraphRegistry::register`] for each one before runs against it
/// can execute.
fn discover_graph_names(dir: &std::path::Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "wirl"))
        .filter_map(|entry| entry.path().file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    miette::set_panic_hook();

    let args = Args::parse();

    let names = discover_graph_names(&args.workflow_definitions_path);
    if names.is_empty() {
        tracing::warn!(path = %args.workflow_definitions_path.display(), "no workflow definitions found");
    } else {
        tracing::info!(count = names.len(), "discovered workflow definitions; awaiting registration");
    }
    let graphs: Arc<dyn GraphRegistry> = Arc::new(InMemoryGraphRegistry::new());

    let store: Arc<dyn Store> = build_store(&args.database_url).await?;
    let checkpointer: Arc<dyn Checkpointer> = build_checkpointer(&args.database_url).await?;

    let config = WorkerConfig {
        workers: args.workers,
        task_timeout: Duration::from_secs(args.task_timeout_minutes * 60),
        poll_interval: Duration::from_secs(args.poll_interval_seconds),
        ..WorkerConfig::default()
    };

    let pool = Arc::new(WorkerPool::new(store, checkpointer, graphs, config));
    let (handles, shutdown) = pool.spawn();

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    tracing::info!("shutdown signal received, draining workers");
    shutdown.send(true).ok();
    for handle in handles {
        handle.await.into_diagnostic()?;
    }
    Ok(())
}

#[cfg(feature = "postgres")]
async fn build_store(database_url: &str) -> Result<Arc<dyn Store>> {
    if database_url.starts_with("postgres") {
        let pool = sqlx::PgPool::connect(database_url).await.into_diagnostic()?;
        let store = durable_flow::store::PostgresStore::new(pool);
        store.setup().await.into_diagnostic()?;
        return Ok(Arc::new(store));
    }
    build_sqlite_store(database_url).await
}

#[cfg(not(feature = "postgres"))]
async fn build_store(database_url: &str) -> Result<Arc<dyn Store>> {
    build_sqlite_store(database_url).await
}

#[cfg(feature = "sqlite")]
async fn build_sqlite_store(database_url: &str) -> Result<Arc<dyn Store>> {
    let pool = sqlx::SqlitePool::connect(database_url).await.into_diagnostic()?;
    let store = durable_flow::store::SqliteStore::new(pool);
    store.setup().await.into_diagnostic()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn build_sqlite_store(_database_url: &str) -> Result<Arc<dyn Store>> {
    miette::bail!("neither the sqlite nor postgres feature is enabled")
}

#[cfg(feature = "postgres")]
async fn build_checkpointer(database_url: &str) -> Result<Arc<dyn Checkpointer>> {
    if database_url.starts_with("postgres") {
        let pool = sqlx::PgPool::connect(database_url).await.into_diagnostic()?;
        let checkpointer = durable_flow::checkpoint::PostgresCheckpointer::new(pool);
        checkpointer.setup().await.into_diagnostic()?;
        return Ok(Arc::new(checkpointer));
    }
    build_sqlite_checkpointer(database_url).await
}

#[cfg(not(feature = "postgres"))]
async fn build_checkpointer(database_url: &str) -> Result<Arc<dyn Checkpointer>> {
    build_sqlite_checkpointer(database_url).await
}

#[cfg(feature = "sqlite")]
async fn build_sqlite_checkpointer(database_url: &str) -> Result<Arc<dyn Checkpointer>> {
    let pool = sqlx::SqlitePool::connect(database_url).await.into_diagnostic()?;
    let checkpointer = durable_flow::checkpoint::SqliteCheckpointer::new(pool);
    checkpointer.setup().await.into_diagnostic()?;
    Ok(Arc::new(checkpointer))
}

#[cfg(not(feature = "sqlite"))]
async fn build_sqlite_checkpointer(_database_url: &str) -> Result<Arc<dyn Checkpointer>> {
    miette::bail!("neither the sqlite nor postgres feature is enabled")
}
