use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use weekly_digest::config;
use weekly_digest::db;
use weekly_digest::sync::WeeklySync;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Upload audio for recorded episodes that were never published"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Maximum number of episodes to attempt
    #[arg(long, default_value = "20")]
    limit: i64,
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
    let publisher = sync
        .publisher()
        .context("no audio publisher configured")?;
    let report = publisher
        .publish_pending(sync.notebook(), args.limit)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
