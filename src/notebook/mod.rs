use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config;
use crate::http::{self, ClientError, RetryPolicy};

pub mod model;

pub use model::{EpisodeInfo, JobStatus, Note, PodcastRequest, RemoteStatus};
use model::{CreateNotebookReq, CreatedResp, PodcastJobResp, StatusResp};

/// Notebook, source and podcast operations of the generation service.
#[async_trait]
pub trait NotebookService: Send + Sync {
    async fn create_notebook(&self, name: &str, description: &str) -> Result<String>;

    /// Attach a URL; the service embeds it asynchronously.
    async fn add_source_url(&self, notebook_id: &str, url: &str) -> Result<String>;

    async fn add_source_text(&self, notebook_id: &str, content: &str, title: &str)
        -> Result<String>;

    async fn get_source_status(&self, source_id: &str) -> Result<RemoteStatus>;

    /// Start podcast generation and return the job id.
    async fn generate_podcast(&self, req: &PodcastRequest) -> Result<String>;

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatus>;

    async fn list_episodes(&self) -> Result<Vec<EpisodeInfo>>;

    async fn get_notebook_notes(&self, notebook_id: &str) -> Result<Vec<Note>>;

    async fn download_episode_audio(&self, episode_id: &str) -> Result<Option<Vec<u8>>>;

    async fn health_check(&self) -> bool;
}

#[derive(Clone)]
pub struct OpenNotebookClient {
    http: Client,
    base_url: String,
    password: Option<String>,
    retry: RetryPolicy,
}

impl fmt::Debug for OpenNotebookClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenNotebookClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenNotebookClient {
    pub fn new(base_url: &str, password: Option<String>, http: Client, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            password,
            retry,
        }
    }

    pub fn from_config(cfg: &config::Config) -> Result<Self> {
        let http = http::build_client(&cfg.http)?;
        Ok(Self::new(
            &cfg.open_notebook.url,
            cfg.open_notebook.password.clone(),
            http,
            RetryPolicy::from_config(&cfg.http),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.password {
            Some(pw) => req.bearer_auth(pw),
            None => req,
        }
    }

    async fn add_source(&self, form: &[(&str, &str)]) -> Result<String> {
        let url = self.url("/api/sources");
        let res = http::send_with_retry(&self.retry, || {
            self.auth(self.http.post(&url)).form(form)
        })
        .await
        .context("failed to reach Open Notebook")?;
        let created: CreatedResp = http::read_json(res)
            .await
            .context("failed to add source")?;
        Ok(created.id)
    }
}

#[async_trait]
impl NotebookService for OpenNotebookClient {
    #[instrument(skip_all)]
    async fn create_notebook(&self, name: &str, description: &str) -> Result<String> {
        let url = self.url("/api/notebooks");
        let body = CreateNotebookReq { name, description };
        let res = http::send_with_retry(&self.retry, || {
            self.auth(self.http.post(&url)).json(&body)
        })
        .await
        .context("failed to reach Open Notebook")?;
        let created: CreatedResp = http::read_json(res)
            .await
            .context("failed to create notebook")?;
        info!(notebook_id = %created.id, name, "notebook created");
        Ok(created.id)
    }

    #[instrument(skip_all, fields(notebook_id = %notebook_id))]
    async fn add_source_url(&self, notebook_id: &str, url: &str) -> Result<String> {
        let notebooks = serde_json::to_string(&[notebook_id])?;
        let id = self
            .add_source(&[
                ("type", "link"),
                ("notebooks", notebooks.as_str()),
                ("url", url),
                ("embed", "true"),
                ("async_processing", "true"),
            ])
            .await?;
        info!(source_id = %id, url, "url source added");
        Ok(id)
    }

    #[instrument(skip_all, fields(notebook_id = %notebook_id))]
    async fn add_source_text(
        &self,
        notebook_id: &str,
        content: &str,
        title: &str,
    ) -> Result<String> {
        let notebooks = serde_json::to_string(&[notebook_id])?;
        let id = self
            .add_source(&[
                ("type", "text"),
                ("notebooks", notebooks.as_str()),
                ("content", content),
                ("title", title),
                ("embed", "true"),
            ])
            .await?;
        info!(source_id = %id, title, "text source added");
        Ok(id)
    }

    async fn get_source_status(&self, source_id: &str) -> Result<RemoteStatus> {
        let url = self.url(&format!("/api/sources/{}/status", source_id));
        let res = http::send_with_retry(&self.retry, || self.auth(self.http.get(&url))).await?;
        let status: StatusResp = http::read_json(res).await?;
        Ok(status.status)
    }

    #[instrument(skip_all, fields(notebook_id = %req.notebook_id))]
    async fn generate_podcast(&self, req: &PodcastRequest) -> Result<String> {
        let url = self.url("/api/podcasts/generate");
        let res = http::send_with_retry(&self.retry, || {
            self.auth(self.http.post(&url)).json(req)
        })
        .await
        .context("failed to reach Open Notebook")?;
        let job: PodcastJobResp = http::read_json(res)
            .await
            .context("failed to start podcast generation")?;
        info!(job_id = %job.job_id, episode_name = %req.episode_name, "podcast generation started");
        Ok(job.job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
        let url = self.url(&format!("/api/podcasts/jobs/{}", job_id));
        let res = http::send_with_retry(&self.retry, || self.auth(self.http.get(&url))).await?;
        Ok(http::read_json(res).await?)
    }

    async fn list_episodes(&self) -> Result<Vec<EpisodeInfo>> {
        let url = self.url("/api/podcasts/episodes");
        let res = http::send_with_retry(&self.retry, || self.auth(self.http.get(&url))).await?;
        Ok(http::read_json(res).await?)
    }

    async fn get_notebook_notes(&self, notebook_id: &str) -> Result<Vec<Note>> {
        let url = self.url("/api/notes");
        let res = http::send_with_retry(&self.retry, || {
            self.auth(self.http.get(&url))
                .query(&[("notebook_id", notebook_id)])
        })
        .await?;
        Ok(http::read_json(res).await?)
    }

    #[instrument(skip_all, fields(episode_id = %episode_id))]
    async fn download_episode_audio(&self, episode_id: &str) -> Result<Option<Vec<u8>>> {
        let url = self.url(&format!("/api/podcasts/episodes/{}/audio", episode_id));
        let res = http::send_with_retry(&self.retry, || self.auth(self.http.get(&url))).await?;
        if res.status() == StatusCode::NOT_FOUND {
            warn!("episode audio not available");
            return Ok(None);
        }
        let res = http::ensure_success(res).await?;
        let bytes = res.bytes().await.map_err(ClientError::from)?;
        info!(size = bytes.len(), "episode audio downloaded");
        Ok(Some(bytes.to_vec()))
    }

    async fn health_check(&self) -> bool {
        match self.auth(self.http.get(self.url("/health"))).send().await {
            Ok(res) => res.status() == StatusCode::OK,
            Err(err) => {
                warn!(error = %err, "Open Notebook health check failed");
                false
            }
        }
    }
}
