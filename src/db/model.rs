//! Persisted entities returned by the repository.
//!
//! These mirror the `sync_logs` and `episodes` tables one-to-one. The feed and
//! health views only ever read them; the pipeline is the sole writer.

use crate::model::SyncStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row of `sync_logs`. `completed_at` is set iff `status` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub notebook_id: Option<String>,
    pub bookmark_count: i64,
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// Partial update applied to a sync run; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SyncUpdate {
    pub status: Option<SyncStatus>,
    pub error: Option<String>,
    pub notebook_id: Option<String>,
    pub bookmark_count: Option<i64>,
    pub summary: Option<String>,
}

impl SyncUpdate {
    pub fn status(status: SyncStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(SyncStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// One row of `episodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub notebook_id: String,
    pub episode_id: String,
    pub episode_name: Option<String>,
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub uploaded: bool,
    pub public_url: Option<String>,
}

/// Raised when an episode id from the generation service is recorded twice.
#[derive(Debug, Error)]
#[error("episode {0} is already recorded")]
pub struct DuplicateEpisode(pub String);
