#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use weekly_digest::notebook::{
    EpisodeInfo, JobStatus, Note, NotebookService, PodcastRequest, RemoteStatus,
};
use weekly_digest::readeck::{BookmarkQuery, BookmarkService, ContentFormat, RemoteBookmark};
use weekly_digest::sync::{PollSettings, SyncSettings, WeeklySync};

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn remote(id: &str, url: &str) -> RemoteBookmark {
    RemoteBookmark {
        id: id.into(),
        url: url.into(),
        title: Some(format!("Title {}", id)),
        kind: Some("article".into()),
    }
}

pub fn remote_pdf(id: &str, url: &str, title: Option<&str>) -> RemoteBookmark {
    RemoteBookmark {
        id: id.into(),
        url: url.into(),
        title: title.map(str::to_string),
        kind: Some("pdf".into()),
    }
}

pub fn fast_settings() -> SyncSettings {
    let poll = PollSettings {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(200),
    };
    SyncSettings {
        window_days: 7,
        page_size: 50,
        sources: poll,
        podcast: poll,
        episode_profile: "tech_discussion".into(),
        speaker_profile: "tech_experts".into(),
    }
}

pub fn pipeline(
    pool: &sqlx::SqlitePool,
    bookmarks: &Arc<FakeBookmarks>,
    notebook: &Arc<FakeNotebook>,
) -> WeeklySync {
    WeeklySync::new(
        pool.clone(),
        bookmarks.clone(),
        notebook.clone(),
        fast_settings(),
    )
}

#[derive(Default)]
pub struct FakeBookmarks {
    pages: Mutex<VecDeque<Result<Vec<RemoteBookmark>>>>,
    contents: HashMap<String, String>,
    failing_content: Vec<String>,
    queries: Mutex<Vec<BookmarkQuery>>,
}

impl FakeBookmarks {
    pub fn with_pages(pages: Vec<Result<Vec<RemoteBookmark>>>) -> Self {
        Self {
            pages: Mutex::new(VecDeque::from(pages)),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, id: &str, content: &str) -> Self {
        self.contents.insert(id.into(), content.into());
        self
    }

    pub fn fail_content(mut self, id: &str) -> Self {
        self.failing_content.push(id.into());
        self
    }

    pub async fn queries(&self) -> Vec<BookmarkQuery> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl BookmarkService for FakeBookmarks {
    async fn list_bookmarks(&self, query: &BookmarkQuery) -> Result<Vec<RemoteBookmark>> {
        self.queries.lock().await.push(query.clone());
        self.pages.lock().await.pop_front().unwrap_or_else(|| Ok(vec![]))
    }

    async fn get_content(&self, id: &str, _format: ContentFormat) -> Result<Option<String>> {
        if self.failing_content.iter().any(|f| f == id) {
            return Err(anyhow!("content extraction failed for {}", id));
        }
        Ok(self.contents.get(id).cloned())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    Url(String),
    Text { title: String, content: String },
}

/// Scripted notebook service. Source ids are `src-<n>` in the order the
/// additions were attempted; the last scripted status of a source, and the
/// last scripted job status, repeat.
#[derive(Default)]
pub struct FakeNotebook {
    create_result: Mutex<Option<Result<String>>>,
    created: Mutex<Vec<(String, String)>>,
    failing_urls: Vec<String>,
    source_calls: Mutex<Vec<SourceCall>>,
    statuses: Mutex<HashMap<String, VecDeque<RemoteStatus>>>,
    failing_statuses: Vec<String>,
    generate_result: Mutex<Option<Result<String>>>,
    podcast_requests: Mutex<Vec<PodcastRequest>>,
    jobs: Mutex<VecDeque<JobStatus>>,
    episodes: Vec<EpisodeInfo>,
    notes: Vec<Note>,
    fail_notes: bool,
    audio: Mutex<Option<Vec<u8>>>,
}

impl FakeNotebook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(self, msg: &str) -> Self {
        *self.create_result.try_lock().unwrap() = Some(Err(anyhow!(msg.to_string())));
        self
    }

    pub fn fail_url(mut self, url: &str) -> Self {
        self.failing_urls.push(url.into());
        self
    }

    pub fn source_statuses(self, source_id: &str, statuses: &[&str]) -> Self {
        self.statuses.try_lock().unwrap().insert(
            source_id.into(),
            statuses.iter().map(|s| RemoteStatus::parse(s)).collect(),
        );
        self
    }

    pub fn fail_status(mut self, source_id: &str) -> Self {
        self.failing_statuses.push(source_id.into());
        self
    }

    pub fn fail_notes(mut self) -> Self {
        self.fail_notes = true;
        self
    }

    pub fn reject_generation(self, msg: &str) -> Self {
        *self.generate_result.try_lock().unwrap() = Some(Err(anyhow!(msg.to_string())));
        self
    }

    pub fn jobs(self, jobs: Vec<JobStatus>) -> Self {
        *self.jobs.try_lock().unwrap() = VecDeque::from(jobs);
        self
    }

    pub fn episodes(mut self, episodes: Vec<EpisodeInfo>) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn notes(mut self, notes: Vec<Note>) -> Self {
        self.notes = notes;
        self
    }

    pub fn audio(self, bytes: &[u8]) -> Self {
        *self.audio.try_lock().unwrap() = Some(bytes.to_vec());
        self
    }

    pub async fn set_audio(&self, bytes: &[u8]) {
        *self.audio.lock().await = Some(bytes.to_vec());
    }

    pub async fn created(&self) -> Vec<(String, String)> {
        self.created.lock().await.clone()
    }

    pub async fn source_calls(&self) -> Vec<SourceCall> {
        self.source_calls.lock().await.clone()
    }

    pub async fn podcast_requests(&self) -> Vec<PodcastRequest> {
        self.podcast_requests.lock().await.clone()
    }

    async fn record_source(&self, call: SourceCall) -> String {
        let mut calls = self.source_calls.lock().await;
        calls.push(call);
        format!("src-{}", calls.len())
    }
}

#[async_trait]
impl NotebookService for FakeNotebook {
    async fn create_notebook(&self, name: &str, description: &str) -> Result<String> {
        self.created
            .lock()
            .await
            .push((name.to_string(), description.to_string()));
        self.create_result
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Ok("nb-1".into()))
    }

    async fn add_source_url(&self, _notebook_id: &str, url: &str) -> Result<String> {
        let id = self.record_source(SourceCall::Url(url.into())).await;
        if self.failing_urls.iter().any(|u| u == url) {
            return Err(anyhow!("source rejected: {}", url));
        }
        Ok(id)
    }

    async fn add_source_text(&self, _notebook_id: &str, content: &str, title: &str) -> Result<String> {
        Ok(self
            .record_source(SourceCall::Text {
                title: title.into(),
                content: content.into(),
            })
            .await)
    }

    async fn get_source_status(&self, source_id: &str) -> Result<RemoteStatus> {
        if self.failing_statuses.iter().any(|f| f == source_id) {
            return Err(anyhow!("status lookup failed for {}", source_id));
        }
        let mut statuses = self.statuses.lock().await;
        let Some(queue) = statuses.get_mut(source_id) else {
            return Ok(RemoteStatus::Completed);
        };
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(status.unwrap_or(RemoteStatus::Completed))
    }

    async fn generate_podcast(&self, req: &PodcastRequest) -> Result<String> {
        self.podcast_requests.lock().await.push(req.clone());
        self.generate_result
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Ok("job-1".into()))
    }

    async fn get_job_status(&self, _job_id: &str) -> Result<JobStatus> {
        let mut jobs = self.jobs.lock().await;
        let next = if jobs.len() > 1 {
            jobs.pop_front()
        } else {
            jobs.front().cloned()
        };
        Ok(next.unwrap_or(JobStatus {
            status: RemoteStatus::Completed,
            episode_id: Some("ep-1".into()),
        }))
    }

    async fn list_episodes(&self) -> Result<Vec<EpisodeInfo>> {
        Ok(self.episodes.clone())
    }

    async fn get_notebook_notes(&self, _notebook_id: &str) -> Result<Vec<Note>> {
        if self.fail_notes {
            return Err(anyhow!("notes listing unavailable"));
        }
        Ok(self.notes.clone())
    }

    async fn download_episode_audio(&self, _episode_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.audio.lock().await.clone())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
