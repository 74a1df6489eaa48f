use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use weekly_digest::config;
use weekly_digest::db;
use weekly_digest::health;
use weekly_digest::sync::WeeklySync;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print recent sync runs, episodes and service health as JSON"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// How many recent runs and episodes to list
    #[arg(long, default_value = "10")]
    limit: i64,

    /// Skip probing the external services
    #[arg(long)]
    no_health: bool,
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

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let runs = db::latest_sync_logs(&pool, args.limit).await?;
    let episodes = db::latest_episodes(&pool, args.limit).await?;

    let health = if args.no_health {
        None
    } else {
        let sync = WeeklySync::from_config(&cfg, pool.clone())?;
        let publisher = sync
            .publisher()
            .context("no audio publisher configured")?;
        Some(health::check(&pool, sync.bookmarks(), sync.notebook(), publisher.backend()).await)
    };

    let out = serde_json::json!({
        "runs": runs,
        "episodes": episodes,
        "health": health,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
