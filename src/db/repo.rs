use super::model::{DuplicateEpisode, Episode, SyncRun, SyncUpdate};
use crate::model::SyncStatus;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

const SYNC_LOG_COLUMNS: &str =
    "id, started_at, completed_at, status, notebook_id, bookmarks_count, summary, error";
const EPISODE_COLUMNS: &str =
    "id, notebook_id, episode_id, episode_name, audio_url, created_at, uploaded, public_url";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL, make sure the parent
/// directory exists and add `mode=rwc` so the file is created on first run.
/// In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn ping(pool: &Pool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn sync_run_from_row(row: &SqliteRow) -> Result<SyncRun> {
    let id: i64 = row.get("id");
    let status: String = row.get("status");
    let status = SyncStatus::parse_status(&status)
        .ok_or_else(|| anyhow!("sync run {} has unknown status {}", id, status))?;
    Ok(SyncRun {
        id,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        status,
        notebook_id: row.get("notebook_id"),
        bookmark_count: row.get("bookmarks_count"),
        summary: row.get("summary"),
        error: row.get("error"),
    })
}

fn episode_from_row(row: &SqliteRow) -> Episode {
    Episode {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        episode_id: row.get("episode_id"),
        episode_name: row.get("episode_name"),
        audio_url: row.get("audio_url"),
        created_at: row.get("created_at"),
        uploaded: row.get("uploaded"),
        public_url: row.get("public_url"),
    }
}

async fn fetch_sync_log<'e, E>(exec: E, id: i64) -> Result<Option<SyncRun>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM sync_logs WHERE id = ?",
        SYNC_LOG_COLUMNS
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(sync_run_from_row).transpose()
}

/// Insert a fresh run in `running` state with a zero bookmark count.
#[instrument(skip_all)]
pub async fn create_sync_log(pool: &Pool) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO sync_logs (started_at, status, bookmarks_count) VALUES (?, ?, 0) RETURNING id",
    )
    .bind(Utc::now())
    .bind(SyncStatus::Running.as_str())
    .fetch_one(pool)
    .await
    .context("failed to create sync log")?;
    Ok(rec.get("id"))
}

/// Apply a partial update to a run.
///
/// Returns `Ok(None)` when the run does not exist. Terminal runs are left as
/// they are and returned unchanged. Moving into a terminal status stamps
/// `completed_at`.
#[instrument(skip_all, fields(run_id = id))]
pub async fn update_sync_log(pool: &Pool, id: i64, update: &SyncUpdate) -> Result<Option<SyncRun>> {
    let mut tx = pool.begin().await?;
    let Some(current) = fetch_sync_log(&mut *tx, id).await? else {
        return Ok(None);
    };
    if current.status.is_terminal() {
        warn!(
            status = current.status.as_str(),
            "ignoring update to a finished sync run"
        );
        return Ok(Some(current));
    }

    let status = update.status.unwrap_or(current.status);
    let completed_at: Option<DateTime<Utc>> = status.is_terminal().then(Utc::now);
    sqlx::query(
        "UPDATE sync_logs SET status = ?, completed_at = ?, \
            error = COALESCE(?, error), \
            notebook_id = COALESCE(?, notebook_id), \
            bookmarks_count = COALESCE(?, bookmarks_count), \
            summary = COALESCE(?, summary) \
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(completed_at)
    .bind(update.error.as_deref())
    .bind(update.notebook_id.as_deref())
    .bind(update.bookmark_count)
    .bind(update.summary.as_deref())
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("failed to update sync log")?;

    let updated = fetch_sync_log(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(updated)
}

pub async fn get_sync_log(pool: &Pool, id: i64) -> Result<Option<SyncRun>> {
    fetch_sync_log(pool, id).await
}

/// Most recent runs first.
#[instrument(skip_all)]
pub async fn latest_sync_logs(pool: &Pool, limit: i64) -> Result<Vec<SyncRun>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sync_logs ORDER BY started_at DESC, id DESC LIMIT ?",
        SYNC_LOG_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(sync_run_from_row).collect()
}

/// Newest non-terminal run started after `since`, if any.
pub async fn active_sync_log(pool: &Pool, since: DateTime<Utc>) -> Result<Option<SyncRun>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM sync_logs WHERE status IN (?, ?) AND started_at >= ? \
         ORDER BY started_at DESC LIMIT 1",
        SYNC_LOG_COLUMNS
    ))
    .bind(SyncStatus::Pending.as_str())
    .bind(SyncStatus::Running.as_str())
    .bind(since)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(sync_run_from_row).transpose()
}

/// Mark every non-terminal run started before `older_than` as failed.
/// Returns how many rows were swept.
#[instrument(skip_all)]
pub async fn mark_stale_runs_failed(
    pool: &Pool,
    older_than: DateTime<Utc>,
    reason: &str,
) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE sync_logs SET status = ?, completed_at = ?, error = ? \
         WHERE status IN (?, ?) AND started_at < ?",
    )
    .bind(SyncStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(reason)
    .bind(SyncStatus::Pending.as_str())
    .bind(SyncStatus::Running.as_str())
    .bind(older_than)
    .execute(pool)
    .await
    .context("failed to sweep stale sync runs")?;
    Ok(res.rows_affected())
}

/// Record a generated episode. A second insert with the same `episode_id`
/// fails with [`DuplicateEpisode`].
#[instrument(skip_all)]
pub async fn insert_episode(
    pool: &Pool,
    notebook_id: &str,
    episode_id: &str,
    episode_name: Option<&str>,
    audio_url: Option<&str>,
) -> Result<i64> {
    let res = sqlx::query(
        "INSERT INTO episodes (notebook_id, episode_id, episode_name, audio_url, created_at, uploaded) \
         VALUES (?, ?, ?, ?, ?, 0) RETURNING id",
    )
    .bind(notebook_id)
    .bind(episode_id)
    .bind(episode_name)
    .bind(audio_url)
    .bind(Utc::now())
    .fetch_one(pool)
    .await;

    match res {
        Ok(row) => Ok(row.get("id")),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(DuplicateEpisode(episode_id.to_string()).into())
        }
        Err(err) => Err(anyhow::Error::new(err).context("failed to insert episode")),
    }
}

/// Flag an episode as published. Only the first call changes the row; later
/// calls return the stored row untouched. `Ok(None)` when the episode is unknown.
#[instrument(skip_all)]
pub async fn mark_episode_uploaded(
    pool: &Pool,
    episode_id: &str,
    public_url: &str,
) -> Result<Option<Episode>> {
    let res = sqlx::query(
        "UPDATE episodes SET uploaded = 1, public_url = ? WHERE episode_id = ? AND uploaded = 0",
    )
    .bind(public_url)
    .bind(episode_id)
    .execute(pool)
    .await
    .context("failed to mark episode uploaded")?;
    if res.rows_affected() == 0 {
        warn!(episode_id, "episode missing or already uploaded");
    }
    get_episode(pool, episode_id).await
}

pub async fn get_episode(pool: &Pool, episode_id: &str) -> Result<Option<Episode>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM episodes WHERE episode_id = ?",
        EPISODE_COLUMNS
    ))
    .bind(episode_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(episode_from_row))
}

pub async fn latest_episodes(pool: &Pool, limit: i64) -> Result<Vec<Episode>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM episodes ORDER BY created_at DESC, id DESC LIMIT ?",
        EPISODE_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(episode_from_row).collect())
}

/// Recorded episodes whose audio has not been published yet, oldest first.
pub async fn pending_upload_episodes(pool: &Pool, limit: i64) -> Result<Vec<Episode>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM episodes WHERE uploaded = 0 ORDER BY created_at ASC, id ASC LIMIT ?",
        EPISODE_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(episode_from_row).collect())
}

/// Published episodes, newest first. This is what the podcast feed reads.
pub async fn uploaded_episodes(pool: &Pool, limit: i64) -> Result<Vec<Episode>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM episodes WHERE uploaded = 1 ORDER BY created_at DESC, id DESC LIMIT ?",
        EPISODE_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(episode_from_row).collect())
}
