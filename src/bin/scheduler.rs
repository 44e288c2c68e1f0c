//! Scheduler binary: periodically enqueues runs from due cron triggers
//! (`spec.md` §6, `SPEC_FULL.md` §6 configuration table).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use durable_flow::registry::{GraphRegistry, InMemoryGraphRegistry};
use durable_flow::scheduler::{Scheduler, SchedulerConfig};
use durable_flow::store::Store;

#[derive(Debug, Parser)]
#[command(name = "durable-flow-scheduler", about = "Durable workflow cron scheduler")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "SCHEDULER_POLL_INTERVAL_SECONDS", default_value_t = 60)]
    scheduler_poll_interval_seconds: u64,
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

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    miette::set_panic_hook();

    let args = Args::parse();

    // The scheduler only needs to know whether a trigger's template still
    // resolves (`Store::mark_template_missing`); it never runs a graph
    // itself, so an empty registry only disables triggers it can't enqueue.
    let graphs: Arc<dyn GraphRegistry> = Arc::new(InMemoryGraphRegistry::new());
    let store: Arc<dyn Store> = build_store(&args.database_url).await?;

    let config = SchedulerConfig {
        poll_interval: Duration::from_secs(args.scheduler_poll_interval_seconds),
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::new(store, graphs, config);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        shutdown_tx.send(true).ok();
    });

    scheduler.run(&mut shutdown_rx).await;
    ctrl_c.await.into_diagnostic()?;
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
