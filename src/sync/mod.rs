//! The weekly sync pipeline.
//!
//! One run moves the week's bookmarks into a fresh notebook, waits for the
//! notebook service to process them, asks for a podcast and a summary, records
//! the episode and publishes its audio. The run is tracked in `sync_logs` from
//! start to finish; partial failures (a source that will not attach, a podcast
//! job that never completes) are counted, not fatal.

pub mod bookmarks;
pub mod builder;
pub mod generation;
pub mod poll;
pub mod recorder;
pub mod waiter;

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::db::{self, Pool, SyncUpdate};
use crate::model::{SyncResult, SyncStatus};
use crate::notebook::{NotebookService, OpenNotebookClient, PodcastRequest};
use crate::publisher::{AudioPublisher, StorageBackend};
use crate::readeck::{BookmarkService, ReadeckClient};
pub use poll::PollSettings;
pub use recorder::SyncLogRecorder;

/// Pipeline progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Started,
    BookmarksFetched,
    NotebookCreated,
    SourcesAdded,
    SourcesWaited,
    GenerationDone,
    EpisodeRecorded,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Started => "started",
            Stage::BookmarksFetched => "bookmarks_fetched",
            Stage::NotebookCreated => "notebook_created",
            Stage::SourcesAdded => "sources_added",
            Stage::SourcesWaited => "sources_waited",
            Stage::GenerationDone => "generation_done",
            Stage::EpisodeRecorded => "episode_recorded",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub window_days: i64,
    pub page_size: u32,
    pub sources: PollSettings,
    pub podcast: PollSettings,
    pub episode_profile: String,
    pub speaker_profile: String,
}

impl SyncSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            window_days: cfg.readeck.window_days,
            page_size: cfg.readeck.page_size,
            sources: PollSettings {
                interval: cfg.sync.source_poll(),
                timeout: cfg.sync.source_timeout(),
            },
            podcast: PollSettings {
                interval: cfg.sync.podcast_poll(),
                timeout: cfg.sync.podcast_timeout(),
            },
            episode_profile: cfg.open_notebook.episode_profile.clone(),
            speaker_profile: cfg.open_notebook.speaker_profile.clone(),
        }
    }
}

pub struct WeeklySync {
    pool: Pool,
    recorder: SyncLogRecorder,
    bookmarks: Arc<dyn BookmarkService>,
    notebook: Arc<dyn NotebookService>,
    publisher: Option<Arc<AudioPublisher>>,
    settings: SyncSettings,
}

impl WeeklySync {
    pub fn new(
        pool: Pool,
        bookmarks: Arc<dyn BookmarkService>,
        notebook: Arc<dyn NotebookService>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            recorder: SyncLogRecorder::new(pool.clone()),
            pool,
            bookmarks,
            notebook,
            publisher: None,
            settings,
        }
    }

    /// Wire the real service clients and the configured storage backend.
    pub fn from_config(cfg: &Config, pool: Pool) -> Result<Self> {
        let bookmarks = Arc::new(ReadeckClient::from_config(cfg)?);
        let notebook = Arc::new(OpenNotebookClient::from_config(cfg)?);
        let backend = StorageBackend::from_config(&cfg.audio)?;
        let publisher = Arc::new(AudioPublisher::new(backend, pool.clone()));
        let settings = SyncSettings::from_config(cfg);
        Ok(Self::new(pool, bookmarks, notebook, settings).with_publisher(publisher))
    }

    /// Publish episode audio right after it is recorded.
    pub fn with_publisher(mut self, publisher: Arc<AudioPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn bookmarks(&self) -> &dyn BookmarkService {
        self.bookmarks.as_ref()
    }

    pub fn notebook(&self) -> &dyn NotebookService {
        self.notebook.as_ref()
    }

    pub fn publisher(&self) -> Option<&AudioPublisher> {
        self.publisher.as_deref()
    }

    /// Run the whole pipeline once.
    ///
    /// Stage failures are recorded on the run and come back as an
    /// unsuccessful `SyncResult`. `Err` means the run could not even be
    /// recorded.
    #[instrument(skip_all)]
    pub async fn run_weekly_sync(&self) -> Result<SyncResult> {
        let run_id = self.recorder.create().await?;
        let mut stage = Stage::Started;
        info!(run_id, stage = stage.as_str(), "weekly sync started");

        match Box::pin(self.run_stages(run_id, &mut stage)).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let message = format!("{:#}", err);
                error!(run_id, stage = stage.as_str(), error = %message, "weekly sync failed");
                if let Err(rec_err) = self
                    .recorder
                    .update(run_id, SyncUpdate::failed(message.clone()))
                    .await
                {
                    error!(run_id, error = %rec_err, "could not record sync failure");
                }
                info!(run_id, stage = Stage::Failed.as_str(), "weekly sync finished");
                Ok(SyncResult::failed(run_id, message))
            }
        }
    }

    async fn run_stages(&self, run_id: i64, stage: &mut Stage) -> Result<SyncResult> {
        let now = Utc::now();
        let label = builder::period_label(now);

        let bookmarks = bookmarks::fetch_recent_bookmarks(
            self.bookmarks.as_ref(),
            now.date_naive(),
            self.settings.window_days,
            self.settings.page_size,
        )
        .await?;
        advance(run_id, stage, Stage::BookmarksFetched);

        if bookmarks.is_empty() {
            info!(run_id, "no bookmarks to sync");
            self.recorder
                .update(
                    run_id,
                    SyncUpdate {
                        status: Some(SyncStatus::Completed),
                        bookmark_count: Some(0),
                        ..Default::default()
                    },
                )
                .await?;
            advance(run_id, stage, Stage::Done);
            return Ok(SyncResult {
                run_id: Some(run_id),
                success: true,
                ..Default::default()
            });
        }

        self.recorder
            .update(
                run_id,
                SyncUpdate {
                    bookmark_count: Some(bookmarks.len() as i64),
                    ..Default::default()
                },
            )
            .await?;

        let notebook = self.notebook.as_ref();
        let notebook_id = builder::create_notebook(notebook, &label, &bookmarks).await?;
        self.recorder
            .update(
                run_id,
                SyncUpdate {
                    notebook_id: Some(notebook_id.clone()),
                    ..Default::default()
                },
            )
            .await?;
        advance(run_id, stage, Stage::NotebookCreated);

        let (mut sources, add_failures) =
            builder::add_sources(notebook, &notebook_id, &bookmarks).await;
        advance(run_id, stage, Stage::SourcesAdded);

        let (ready, unready) = if sources.is_empty() {
            (0, 0)
        } else {
            waiter::wait_for_all(notebook, &mut sources, &self.settings.sources).await
        };
        advance(run_id, stage, Stage::SourcesWaited);

        let req = PodcastRequest {
            notebook_id: notebook_id.clone(),
            episode_name: label.clone(),
            episode_profile: self.settings.episode_profile.clone(),
            speaker_profile: self.settings.speaker_profile.clone(),
        };
        let outcome = generation::generate(notebook, &req, &self.settings.podcast).await;
        if !outcome.succeeded {
            warn!(
                run_id,
                error = outcome.error.as_deref().unwrap_or_default(),
                "podcast generation did not start"
            );
        }
        advance(run_id, stage, Stage::GenerationDone);

        let mut public_url = None;
        if let Some(episode_id) = &outcome.episode_id {
            db::insert_episode(
                &self.pool,
                &notebook_id,
                episode_id,
                Some(&label),
                outcome.audio_url.as_deref(),
            )
            .await?;
            advance(run_id, stage, Stage::EpisodeRecorded);
            public_url = self.publish(episode_id).await;
        }

        self.recorder
            .update(
                run_id,
                SyncUpdate {
                    status: Some(SyncStatus::Completed),
                    summary: outcome.summary_text.clone(),
                    ..Default::default()
                },
            )
            .await?;
        advance(run_id, stage, Stage::Done);

        let result = SyncResult {
            run_id: Some(run_id),
            notebook_id: Some(notebook_id),
            bookmark_count: bookmarks.len(),
            sources_added: sources.len(),
            sources_failed: add_failures,
            sources_ready: ready,
            sources_unready: unready,
            episode_id: outcome.episode_id,
            public_url,
            success: true,
            error: None,
        };
        info!(
            run_id,
            notebook_id = result.notebook_id.as_deref().unwrap_or_default(),
            bookmarks = result.bookmark_count,
            sources = result.sources_added,
            episode_id = result.episode_id.as_deref().unwrap_or_default(),
            "weekly sync completed"
        );
        Ok(result)
    }

    /// Best effort: a publish failure is logged and retried later by
    /// `publish_pending`.
    async fn publish(&self, episode_id: &str) -> Option<String> {
        let publisher = self.publisher.as_ref()?;
        match publisher.publish_episode(self.notebook.as_ref(), episode_id).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                warn!(episode_id, "episode audio not available yet");
                None
            }
            Err(err) => {
                warn!(episode_id, error = %format!("{:#}", err), "episode publish failed");
                None
            }
        }
    }
}

fn advance(run_id: i64, stage: &mut Stage, next: Stage) {
    *stage = next;
    info!(run_id, stage = next.as_str(), "sync stage reached");
}
