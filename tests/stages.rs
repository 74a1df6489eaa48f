mod common;

use std::time::Duration;

use common::FakeNotebook;
use weekly_digest::model::{NotebookSource, SourceState};
use weekly_digest::notebook::{JobStatus, PodcastRequest, RemoteStatus};
use weekly_digest::sync::{generation, waiter, PollSettings};

fn poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(60),
    }
}

fn source(id: &str) -> NotebookSource {
    NotebookSource {
        source_id: id.into(),
        bookmark_id: format!("bm-{}", id),
        state: SourceState::Unready,
    }
}

fn request() -> PodcastRequest {
    PodcastRequest {
        notebook_id: "nb-1".into(),
        episode_name: "Week 2024-W09".into(),
        episode_profile: "tech_discussion".into(),
        speaker_profile: "tech_experts".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn status_lookup_error_only_fails_that_source() {
    let notebook = FakeNotebook::new()
        .fail_status("src-1")
        .source_statuses("src-2", &["processing", "completed"]);
    let mut sources = vec![source("src-1"), source("src-2")];

    let counts = waiter::wait_for_all(&notebook, &mut sources, &poll()).await;

    assert_eq!(counts, (1, 1));
    assert_eq!(sources[0].state, SourceState::Failed);
    assert_eq!(sources[1].state, SourceState::Ready);
}

#[tokio::test(start_paused = true)]
async fn source_stuck_processing_times_out() {
    let notebook = FakeNotebook::new().source_statuses("src-1", &["processing"]);
    let mut sources = vec![source("src-1")];

    let start = tokio::time::Instant::now();
    let counts = waiter::wait_for_all(&notebook, &mut sources, &poll()).await;

    assert_eq!(counts, (0, 1));
    assert_eq!(sources[0].state, SourceState::TimedOut);
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn job_that_never_finishes_leaves_no_episode() {
    let notebook = FakeNotebook::new().jobs(vec![JobStatus {
        status: RemoteStatus::parse("running"),
        episode_id: None,
    }]);

    let outcome = generation::generate(&notebook, &request(), &poll()).await;

    assert!(outcome.succeeded);
    assert!(outcome.error.is_none());
    assert!(outcome.episode_id.is_none());
    assert!(outcome.audio_url.is_none());
    assert_eq!(notebook.podcast_requests().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn notes_failure_leaves_summary_empty() {
    let notebook = FakeNotebook::new().fail_notes();

    let outcome = generation::generate(&notebook, &request(), &poll()).await;

    assert!(outcome.succeeded);
    assert_eq!(outcome.episode_id.as_deref(), Some("ep-1"));
    assert!(outcome.summary_text.is_none());
}
