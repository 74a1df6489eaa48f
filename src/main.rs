#![recursion_limit = "256"]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use weekly_digest::config;
use weekly_digest::db;
use weekly_digest::scheduler::{self, SyncGuard};
use weekly_digest::sync::WeeklySync;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run the weekly digest sync on its cron schedule")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let stale_after = cfg.sync.stale_run_grace();
    scheduler::sweep_stale_runs(&pool, stale_after).await?;

    let sync = Arc::new(WeeklySync::from_config(&cfg, pool)?);
    let guard = Arc::new(SyncGuard::new());

    let mut sched = if cfg.schedule.enabled {
        Some(scheduler::start(&cfg.schedule, sync, guard, stale_after).await?)
    } else {
        warn!("schedule disabled; use the weekly_sync binary to run manually");
        None
    };

    info!("weekly digest daemon running");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    if let Some(sched) = sched.as_mut() {
        sched.shutdown().await.context("stopping scheduler")?;
    }
    Ok(())
}
