use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config;
use crate::db::{self, Pool};
use crate::model::SyncResult;
use crate::sync::WeeklySync;

pub const ABANDONED_REASON: &str = "abandoned: process restarted";

/// Allows a single sync at a time inside this process.
#[derive(Debug, Default)]
pub struct SyncGuard {
    running: AtomicBool,
}

/// Held while a sync runs; releases the guard on drop.
#[derive(Debug)]
pub struct SyncPermit<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<SyncPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Finished(SyncResult),
    /// Another run was in progress; nothing was started or recorded.
    AlreadyRunning,
}

/// Start a sync unless one is already running, either in this process or
/// (per `sync_logs`) in another one that started less than `stale_after` ago.
#[instrument(skip_all, fields(trigger_id = %Uuid::new_v4()))]
pub async fn trigger_sync(
    sync: &WeeklySync,
    guard: &SyncGuard,
    stale_after: Duration,
) -> Result<TriggerOutcome> {
    let Some(_permit) = guard.try_acquire() else {
        warn!("sync already running in this process; trigger ignored");
        return Ok(TriggerOutcome::AlreadyRunning);
    };
    if let Some(active) = db::active_sync_log(sync.pool(), Utc::now() - stale_after).await? {
        warn!(
            run_id = active.id,
            started_at = %active.started_at,
            "sync run still in progress; trigger ignored"
        );
        return Ok(TriggerOutcome::AlreadyRunning);
    }
    let result = sync.run_weekly_sync().await?;
    Ok(TriggerOutcome::Finished(result))
}

/// Fail runs left `pending`/`running` by a previous process.
pub async fn sweep_stale_runs(pool: &Pool, grace: Duration) -> Result<u64> {
    let swept = db::mark_stale_runs_failed(pool, Utc::now() - grace, ABANDONED_REASON).await?;
    if swept > 0 {
        warn!(swept, "marked abandoned sync runs as failed");
    }
    Ok(swept)
}

/// Build and start the cron scheduler for the weekly sync.
pub async fn start(
    schedule: &config::Schedule,
    sync: Arc<WeeklySync>,
    guard: Arc<SyncGuard>,
    stale_after: Duration,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(schedule.weekly_sync.as_str(), move |_uuid, _l| {
        let sync = sync.clone();
        let guard = guard.clone();
        Box::pin(async move {
            info!("scheduled weekly sync triggered");
            match trigger_sync(&sync, &guard, stale_after).await {
                Ok(TriggerOutcome::Finished(result)) => info!(
                    success = result.success,
                    run_id = result.run_id.unwrap_or_default(),
                    "scheduled weekly sync finished"
                ),
                Ok(TriggerOutcome::AlreadyRunning) => {}
                Err(err) => error!(error = %format!("{:#}", err), "scheduled weekly sync errored"),
            }
        })
    })
    .with_context(|| format!("invalid cron expression {:?}", schedule.weekly_sync))?;
    sched.add(job).await.context("adding weekly sync job")?;
    sched.start().await.context("starting scheduler")?;
    info!(cron = %schedule.weekly_sync, "weekly sync scheduled");
    Ok(sched)
}
