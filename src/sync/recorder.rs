use anyhow::Result;
use tracing::{info, warn};

use crate::db::{self, Pool, SyncRun, SyncUpdate};

/// Sole writer of `sync_logs` rows for the pipeline.
#[derive(Debug, Clone)]
pub struct SyncLogRecorder {
    pool: Pool,
}

impl SyncLogRecorder {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self) -> Result<i64> {
        let run_id = db::create_sync_log(&self.pool).await?;
        info!(run_id, "sync run started");
        Ok(run_id)
    }

    /// Partial update. An unknown `run_id` is logged and reported as `None`.
    pub async fn update(&self, run_id: i64, update: SyncUpdate) -> Result<Option<SyncRun>> {
        let run = db::update_sync_log(&self.pool, run_id, &update).await?;
        if run.is_none() {
            warn!(run_id, "sync run not found");
        }
        Ok(run)
    }
}
