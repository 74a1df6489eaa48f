//! Audio publishing: copies generated episode audio to a public location and
//! records where it ended up.
//!
//! The storage location is a configuration switch between a local directory
//! served by some web server and an S3-compatible bucket (Backblaze B2, MinIO).

use anyhow::{Context, Result};
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config;
use crate::db::{self, Pool};
use crate::notebook::NotebookService;

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[:/]").expect("valid filename regex"));

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported audio backend: {0}")]
    UnsupportedBackend(String),
    #[error("audio backend {0} is missing its configuration")]
    MissingConfig(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store error: {0}")]
    ObjectStore(String),
}

/// Where a stored file lives: `key` is what `remove` takes, `url` is public.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAudio {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    async fn store(&self, bytes: &[u8], name: &str) -> Result<StoredAudio, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), size = bytes.len(), "audio stored locally");
        Ok(StoredAudio {
            key: name.to_string(),
            url: format!("{}/{}", self.public_url, name),
        })
    }

    async fn remove(&self, key: &str) -> bool {
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                error!(key, error = %err, "failed to delete local audio");
                false
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        let probe = self.root.join(".health_check");
        let res = async {
            tokio::fs::create_dir_all(&self.root).await?;
            tokio::fs::write(&probe, b"ok").await?;
            tokio::fs::remove_file(&probe).await
        }
        .await;
        res.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl S3Storage {
    pub fn new(cfg: &config::S3) -> Self {
        let creds = Credentials::new(
            cfg.key_id.clone(),
            cfg.application_key.clone(),
            None,
            None,
            "weekly-digest",
        );
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .endpoint_url(cfg.endpoint.trim_end_matches('/'))
            .credentials_provider(creds)
            .force_path_style(true)
            .build();
        let public_base = match &cfg.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("{}/{}", cfg.endpoint.trim_end_matches('/'), cfg.bucket),
        };
        Self {
            client: aws_sdk_s3::Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base,
        }
    }

    async fn store(&self, bytes: &[u8], name: &str) -> Result<StoredAudio, StorageError> {
        let key = object_key(name, Utc::now());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type("audio/mpeg")
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(DisplayErrorContext(&e).to_string()))?;
        info!(%key, size = bytes.len(), bucket = %self.bucket, "audio uploaded");
        Ok(StoredAudio {
            url: format!("{}/{}", self.public_base, key),
            key,
        })
    }

    async fn remove(&self, key: &str) -> bool {
        let res = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        match res {
            Ok(_) => true,
            Err(err) => {
                error!(key, error = %DisplayErrorContext(&err), "failed to delete object");
                false
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}

/// Configured storage backend.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Local(LocalStorage),
    S3(S3Storage),
}

impl StorageBackend {
    /// `backblaze` is accepted as an alias of `s3`.
    pub fn from_config(audio: &config::Audio) -> Result<Self, StorageError> {
        match audio.backend_tag().as_str() {
            "local" => Ok(StorageBackend::Local(LocalStorage::new(
                &audio.local_path,
                &audio.public_url,
            ))),
            "s3" | "backblaze" => {
                let s3 = audio.s3.as_ref().ok_or(StorageError::MissingConfig("s3"))?;
                Ok(StorageBackend::S3(S3Storage::new(s3)))
            }
            other => Err(StorageError::UnsupportedBackend(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Local(_) => "local",
            StorageBackend::S3(_) => "s3",
        }
    }

    pub async fn store(&self, bytes: &[u8], name: &str) -> Result<StoredAudio, StorageError> {
        match self {
            StorageBackend::Local(s) => s.store(bytes, name).await,
            StorageBackend::S3(s) => s.store(bytes, name).await,
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self {
            StorageBackend::Local(s) => s.remove(key).await,
            StorageBackend::S3(s) => s.remove(key).await,
        }
    }

    pub async fn is_healthy(&self) -> bool {
        match self {
            StorageBackend::Local(s) => s.is_healthy().await,
            StorageBackend::S3(s) => s.is_healthy().await,
        }
    }
}

/// `<episode id with ':' and '/' replaced>_<YYYYMMDD_HHMMSS>.mp3`
pub fn audio_filename(episode_id: &str, now: DateTime<Utc>) -> String {
    let safe_id = UNSAFE_NAME_CHARS.replace_all(episode_id, "_");
    format!("{}_{}.mp3", safe_id, now.format("%Y%m%d_%H%M%S"))
}

/// Date-partitioned object key.
pub fn object_key(name: &str, now: DateTime<Utc>) -> String {
    format!("podcasts/{}/{}", now.format("%Y%m%d"), name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub published: usize,
    /// The generation service had no audio for these yet.
    pub skipped: usize,
    pub failed: usize,
}

pub struct AudioPublisher {
    backend: StorageBackend,
    pool: Pool,
}

impl AudioPublisher {
    pub fn new(backend: StorageBackend, pool: Pool) -> Self {
        Self { backend, pool }
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Store the audio and mark the episode uploaded. Returns the public URL.
    #[instrument(skip_all, fields(episode_id = episode_id, backend = self.backend.name()))]
    pub async fn publish(&self, episode_id: &str, audio: &[u8]) -> Result<String> {
        let name = audio_filename(episode_id, Utc::now());
        let stored = self
            .backend
            .store(audio, &name)
            .await
            .with_context(|| format!("failed to store audio for episode {}", episode_id))?;
        match db::mark_episode_uploaded(&self.pool, episode_id, &stored.url).await? {
            Some(ep) if ep.public_url.as_deref() != Some(stored.url.as_str()) => {
                warn!(
                    existing = ep.public_url.as_deref().unwrap_or_default(),
                    "episode was already published"
                );
            }
            Some(_) => info!(url = %stored.url, "episode published"),
            None => warn!(url = %stored.url, "published audio for an unrecorded episode"),
        }
        Ok(stored.url)
    }

    /// Download an episode's audio from the generation service and publish it.
    /// `Ok(None)` when the service has no audio for it.
    pub async fn publish_episode(
        &self,
        notebook: &dyn NotebookService,
        episode_id: &str,
    ) -> Result<Option<String>> {
        let Some(audio) = notebook
            .download_episode_audio(episode_id)
            .await
            .context("failed to download episode audio")?
        else {
            return Ok(None);
        };
        self.publish(episode_id, &audio).await.map(Some)
    }

    /// Retry publishing for recorded episodes that were never uploaded.
    #[instrument(skip_all)]
    pub async fn publish_pending(
        &self,
        notebook: &dyn NotebookService,
        limit: i64,
    ) -> Result<PublishReport> {
        let pending = db::pending_upload_episodes(&self.pool, limit).await?;
        let mut report = PublishReport::default();
        for ep in pending {
            match self.publish_episode(notebook, &ep.episode_id).await {
                Ok(Some(_)) => report.published += 1,
                Ok(None) => {
                    warn!(episode_id = %ep.episode_id, "no audio available yet");
                    report.skipped += 1;
                }
                Err(err) => {
                    error!(episode_id = %ep.episode_id, error = %format!("{:#}", err), "publish failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            "pending episodes processed"
        );
        Ok(report)
    }
}
