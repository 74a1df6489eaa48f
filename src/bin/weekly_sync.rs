#![recursion_limit = "256"]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use weekly_digest::config;
use weekly_digest::db;
use weekly_digest::scheduler::{self, SyncGuard, TriggerOutcome};
use weekly_digest::sync::WeeklySync;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one weekly sync now and print the result")]
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

    let sync = WeeklySync::from_config(&cfg, pool)?;
    let guard = SyncGuard::new();

    match scheduler::trigger_sync(&sync, &guard, cfg.sync.stale_run_grace()).await? {
        TriggerOutcome::Finished(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
            info!("manual sync done");
        }
        TriggerOutcome::AlreadyRunning => {
            warn!("another sync is in progress");
            println!("{}", serde_json::json!({ "status": "already_running" }));
            std::process::exit(2);
        }
    }
    Ok(())
}
