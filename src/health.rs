use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

use crate::db::{self, Pool};
use crate::notebook::NotebookService;
use crate::publisher::StorageBackend;
use crate::readeck::BookmarkService;

pub const DATABASE: &str = "database";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub services: BTreeMap<&'static str, ServiceHealth>,
}

async fn timed<F: Future<Output = bool>>(probe: F) -> ServiceHealth {
    let start = Instant::now();
    let ok = probe.await;
    ServiceHealth {
        status: if ok {
            HealthStatus::Ok
        } else {
            HealthStatus::Unhealthy
        },
        latency_ms: start.elapsed().as_millis() as u64,
    }
}

/// `Ok` when everything answers, `Unhealthy` when the database is down,
/// `Degraded` otherwise.
pub fn overall_status(services: &BTreeMap<&'static str, ServiceHealth>) -> HealthStatus {
    if services.values().all(|s| s.status == HealthStatus::Ok) {
        return HealthStatus::Ok;
    }
    match services.get(DATABASE) {
        Some(db) if db.status != HealthStatus::Ok => HealthStatus::Unhealthy,
        _ => HealthStatus::Degraded,
    }
}

pub async fn check(
    pool: &Pool,
    bookmarks: &dyn BookmarkService,
    notebook: &dyn NotebookService,
    storage: &StorageBackend,
) -> HealthReport {
    let mut services = BTreeMap::new();
    services.insert(DATABASE, timed(async { db::ping(pool).await.is_ok() }).await);
    services.insert("readeck", timed(bookmarks.health_check()).await);
    services.insert("open_notebook", timed(notebook.health_check()).await);
    services.insert("storage", timed(storage.is_healthy()).await);
    HealthReport {
        status: overall_status(&services),
        checked_at: Utc::now(),
        services,
    }
}
