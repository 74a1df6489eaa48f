//! Configuration loader and validator for the weekly digest pipeline.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub readeck: Readeck,
    pub open_notebook: OpenNotebook,
    #[serde(default)]
    pub sync: SyncTiming,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub audio: Audio,
    #[serde(default)]
    pub http: Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Read-later service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Readeck {
    pub url: String,
    pub token: String,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Notebook and podcast generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenNotebook {
    pub url: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_episode_profile")]
    pub episode_profile: String,
    #[serde(default = "default_speaker_profile")]
    pub speaker_profile: String,
}

/// Polling intervals and timeouts, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncTiming {
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_source_poll")]
    pub source_poll_secs: u64,
    #[serde(default = "default_podcast_timeout")]
    pub podcast_timeout_secs: u64,
    #[serde(default = "default_podcast_poll")]
    pub podcast_poll_secs: u64,
    #[serde(default = "default_stale_grace")]
    pub stale_run_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    #[serde(default = "default_weekly_cron")]
    pub weekly_sync: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Audio {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_local_path")]
    pub local_path: String,
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default)]
    pub s3: Option<S3>,
}

/// S3-compatible object storage (Backblaze B2, MinIO, AWS).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct S3 {
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    pub key_id: String,
    pub application_key: String,
    /// Overrides `<endpoint>/<bucket>` as the base of published URLs.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

/// Outbound HTTP client settings shared by both service clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Http {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: u32,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_window_days() -> i64 {
    7
}
fn default_page_size() -> u32 {
    100
}
fn default_episode_profile() -> String {
    "tech_discussion".into()
}
fn default_speaker_profile() -> String {
    "tech_experts".into()
}
fn default_source_timeout() -> u64 {
    300
}
fn default_source_poll() -> u64 {
    5
}
fn default_podcast_timeout() -> u64 {
    600
}
fn default_podcast_poll() -> u64 {
    10
}
fn default_stale_grace() -> u64 {
    6 * 60 * 60
}
fn default_true() -> bool {
    true
}
fn default_weekly_cron() -> String {
    "0 0 23 * * Sun".into()
}
fn default_backend() -> String {
    "local".into()
}
fn default_local_path() -> String {
    "./data/audio".into()
}
fn default_public_url() -> String {
    "http://localhost:8000/audio".into()
}
fn default_region() -> String {
    "us-west-004".into()
}
fn default_http_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    2_000
}
fn default_retry_multiplier() -> u32 {
    2
}
fn default_retry_max_ms() -> u64 {
    10_000
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout(),
            source_poll_secs: default_source_poll(),
            podcast_timeout_secs: default_podcast_timeout(),
            podcast_poll_secs: default_podcast_poll(),
            stale_run_grace_secs: default_stale_grace(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: true,
            weekly_sync: default_weekly_cron(),
        }
    }
}

impl Default for Audio {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_path: default_local_path(),
            public_url: default_public_url(),
            s3: None,
        }
    }
}

impl Default for Http {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_ms(),
            retry_multiplier: default_retry_multiplier(),
            retry_max_delay_ms: default_retry_max_ms(),
        }
    }
}

impl Audio {
    /// Backend tag as matched everywhere: trimmed and lowercased.
    pub fn backend_tag(&self) -> String {
        self.backend.trim().to_ascii_lowercase()
    }
}

impl SyncTiming {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
    pub fn source_poll(&self) -> Duration {
        Duration::from_secs(self.source_poll_secs)
    }
    pub fn podcast_timeout(&self) -> Duration {
        Duration::from_secs(self.podcast_timeout_secs)
    }
    pub fn podcast_poll(&self) -> Duration {
        Duration::from_secs(self.podcast_poll_secs)
    }
    /// Age after which a `pending`/`running` run is treated as abandoned.
    pub fn stale_run_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_run_grace_secs as i64)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the file inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/digest.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.readeck.url.trim().is_empty() {
        return Err(ConfigError::Invalid("readeck.url must be non-empty"));
    }
    if cfg.readeck.token.trim().is_empty() {
        return Err(ConfigError::Invalid("readeck.token must be non-empty"));
    }
    if cfg.readeck.window_days <= 0 {
        return Err(ConfigError::Invalid("readeck.window_days must be > 0"));
    }
    if cfg.readeck.page_size == 0 {
        return Err(ConfigError::Invalid("readeck.page_size must be > 0"));
    }

    if cfg.open_notebook.url.trim().is_empty() {
        return Err(ConfigError::Invalid("open_notebook.url must be non-empty"));
    }

    let s = &cfg.sync;
    if s.source_poll_secs == 0 || s.podcast_poll_secs == 0 {
        return Err(ConfigError::Invalid("sync poll intervals must be > 0"));
    }
    if s.source_timeout_secs == 0 || s.podcast_timeout_secs == 0 {
        return Err(ConfigError::Invalid("sync timeouts must be > 0"));
    }
    if s.source_poll_secs > s.source_timeout_secs {
        return Err(ConfigError::Invalid(
            "sync.source_poll_secs must not exceed sync.source_timeout_secs",
        ));
    }
    if s.podcast_poll_secs > s.podcast_timeout_secs {
        return Err(ConfigError::Invalid(
            "sync.podcast_poll_secs must not exceed sync.podcast_timeout_secs",
        ));
    }

    if cfg.schedule.enabled && cfg.schedule.weekly_sync.trim().is_empty() {
        return Err(ConfigError::Invalid("schedule.weekly_sync must be non-empty"));
    }

    match cfg.audio.backend_tag().as_str() {
        "local" => {
            if cfg.audio.local_path.trim().is_empty() {
                return Err(ConfigError::Invalid("audio.local_path must be non-empty"));
            }
            if cfg.audio.public_url.trim().is_empty() {
                return Err(ConfigError::Invalid("audio.public_url must be non-empty"));
            }
        }
        "s3" | "backblaze" => {
            let Some(s3) = &cfg.audio.s3 else {
                return Err(ConfigError::Invalid(
                    "audio.s3 is required for the s3 backend",
                ));
            };
            if s3.endpoint.trim().is_empty() || s3.bucket.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "audio.s3.endpoint and audio.s3.bucket must be non-empty",
                ));
            }
            if s3.key_id.trim().is_empty() || s3.application_key.trim().is_empty() {
                return Err(ConfigError::Invalid("audio.s3 credentials must be non-empty"));
            }
        }
        _ => return Err(ConfigError::Invalid("audio.backend must be local, s3 or backblaze")),
    }

    if cfg.http.timeout_secs == 0 {
        return Err(ConfigError::Invalid("http.timeout_secs must be > 0"));
    }
    if cfg.http.max_retries == 0 {
        return Err(ConfigError::Invalid("http.max_retries must be >= 1"));
    }
    if cfg.http.retry_multiplier == 0 {
        return Err(ConfigError::Invalid("http.retry_multiplier must be > 0"));
    }

    Ok(())
}

/// Returns a complete example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

readeck:
  url: "http://localhost:8000"
  token: "YOUR_READECK_API_TOKEN"
  window_days: 7
  page_size: 100

open_notebook:
  url: "http://localhost:5055"
  password: null
  episode_profile: "tech_discussion"
  speaker_profile: "tech_experts"

sync:
  source_timeout_secs: 300
  source_poll_secs: 5
  podcast_timeout_secs: 600
  podcast_poll_secs: 10
  stale_run_grace_secs: 21600

schedule:
  enabled: true
  # sec min hour day month weekday
  weekly_sync: "0 0 23 * * Sun"

audio:
  backend: "local"
  local_path: "./data/audio"
  public_url: "http://localhost:8000/audio"
  s3:
    endpoint: "https://s3.us-west-004.backblazeb2.com"
    region: "us-west-004"
    bucket: "weekly-digest"
    key_id: "YOUR_KEY_ID"
    application_key: "YOUR_APPLICATION_KEY"
    public_base_url: null

http:
  timeout_secs: 30
  max_retries: 3
  retry_base_delay_ms: 2000
  retry_multiplier: 2
  retry_max_delay_ms: 10000
"#
}
