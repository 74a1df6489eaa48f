#![recursion_limit = "256"]

mod common;

use chrono::Duration;
use std::sync::Arc;

use common::{pipeline, remote, setup_pool, FakeBookmarks, FakeNotebook};
use weekly_digest::db;
use weekly_digest::model::SyncStatus;
use weekly_digest::publisher::{AudioPublisher, LocalStorage, StorageBackend};
use weekly_digest::scheduler::{self, SyncGuard, TriggerOutcome, ABANDONED_REASON};

fn one_bookmark() -> Arc<FakeBookmarks> {
    Arc::new(FakeBookmarks::with_pages(vec![Ok(vec![remote(
        "bm-1",
        "https://a.example/1",
    )])]))
}

#[tokio::test]
async fn trigger_runs_when_idle() {
    let pool = setup_pool().await;
    let sync = pipeline(&pool, &one_bookmark(), &Arc::new(FakeNotebook::new()));
    let guard = SyncGuard::new();

    let outcome = scheduler::trigger_sync(&sync, &guard, Duration::hours(6))
        .await
        .unwrap();

    match outcome {
        TriggerOutcome::Finished(result) => assert!(result.success),
        TriggerOutcome::AlreadyRunning => panic!("idle trigger was rejected"),
    }
    assert!(!guard.is_running());
}

#[tokio::test]
async fn trigger_is_rejected_while_guard_is_held() {
    let pool = setup_pool().await;
    let bookmarks = one_bookmark();
    let sync = pipeline(&pool, &bookmarks, &Arc::new(FakeNotebook::new()));
    let guard = SyncGuard::new();
    let _held = guard.try_acquire().unwrap();

    let outcome = scheduler::trigger_sync(&sync, &guard, Duration::hours(6))
        .await
        .unwrap();

    assert!(matches!(outcome, TriggerOutcome::AlreadyRunning));
    assert!(db::latest_sync_logs(&pool, 10).await.unwrap().is_empty());
    assert!(bookmarks.queries().await.is_empty());
}

#[tokio::test]
async fn trigger_is_rejected_while_another_process_runs() {
    let pool = setup_pool().await;
    let other = db::create_sync_log(&pool).await.unwrap();
    let sync = pipeline(&pool, &one_bookmark(), &Arc::new(FakeNotebook::new()));
    let guard = SyncGuard::new();

    let outcome = scheduler::trigger_sync(&sync, &guard, Duration::hours(6))
        .await
        .unwrap();

    assert!(matches!(outcome, TriggerOutcome::AlreadyRunning));
    let runs = db::latest_sync_logs(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, other);
    assert_eq!(runs[0].status, SyncStatus::Running);
    assert!(!guard.is_running());
}

#[tokio::test]
async fn stale_run_does_not_block_and_is_swept() {
    let pool = setup_pool().await;
    let abandoned = db::create_sync_log(&pool).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // Zero grace: anything already started counts as stale.
    let sync = pipeline(&pool, &one_bookmark(), &Arc::new(FakeNotebook::new()));
    let outcome = scheduler::trigger_sync(&sync, &SyncGuard::new(), Duration::zero())
        .await
        .unwrap();
    assert!(matches!(outcome, TriggerOutcome::Finished(_)));

    let swept = scheduler::sweep_stale_runs(&pool, Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(swept, 0);

    let swept = scheduler::sweep_stale_runs(&pool, Duration::zero())
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let run = db::get_sync_log(&pool, abandoned).await.unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Failed);
    assert_eq!(run.error.as_deref(), Some(ABANDONED_REASON));
    assert!(run.completed_at.is_some());

    // The finished run keeps its outcome.
    let runs = db::latest_sync_logs(&pool, 10).await.unwrap();
    assert_eq!(
        runs.iter()
            .filter(|r| r.status == SyncStatus::Completed)
            .count(),
        1
    );
}

#[tokio::test]
async fn pending_episode_is_published_once_audio_exists() {
    let pool = setup_pool().await;
    let audio_dir = tempfile::tempdir().unwrap();
    let notebook = Arc::new(FakeNotebook::new());
    let publisher = Arc::new(AudioPublisher::new(
        StorageBackend::Local(LocalStorage::new(
            audio_dir.path().to_path_buf(),
            "http://localhost:8080/audio",
        )),
        pool.clone(),
    ));

    let result = pipeline(&pool, &one_bookmark(), &notebook)
        .with_publisher(publisher.clone())
        .run_weekly_sync()
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.episode_id.as_deref(), Some("ep-1"));
    assert!(result.public_url.is_none());

    let episode = db::get_episode(&pool, "ep-1").await.unwrap().unwrap();
    assert!(!episode.uploaded);
    assert_eq!(db::pending_upload_episodes(&pool, 10).await.unwrap().len(), 1);

    let report = publisher.publish_pending(notebook.as_ref(), 10).await.unwrap();
    assert_eq!((report.published, report.skipped, report.failed), (0, 1, 0));

    notebook.set_audio(b"mp3-bytes").await;
    let report = publisher.publish_pending(notebook.as_ref(), 10).await.unwrap();
    assert_eq!((report.published, report.skipped, report.failed), (1, 0, 0));

    let episode = db::get_episode(&pool, "ep-1").await.unwrap().unwrap();
    assert!(episode.uploaded);
    let url = episode.public_url.unwrap();
    assert!(url.starts_with("http://localhost:8080/audio/ep-1_"));
    assert_eq!(db::uploaded_episodes(&pool, 10).await.unwrap().len(), 1);

    let report = publisher.publish_pending(notebook.as_ref(), 10).await.unwrap();
    assert_eq!(report.published, 0);
}

#[tokio::test]
async fn health_reflects_database_state() {
    use weekly_digest::health::{self, HealthStatus};

    let pool = setup_pool().await;
    let audio_dir = tempfile::tempdir().unwrap();
    let storage = StorageBackend::Local(LocalStorage::new(
        audio_dir.path().to_path_buf(),
        "http://localhost/audio",
    ));
    let bookmarks = FakeBookmarks::default();
    let notebook = FakeNotebook::new();

    let report = health::check(&pool, &bookmarks, &notebook, &storage).await;
    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.services.len(), 4);

    pool.close().await;
    let report = health::check(&pool, &bookmarks, &notebook, &storage).await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(
        report.services[health::DATABASE].status,
        HealthStatus::Unhealthy
    );
}
