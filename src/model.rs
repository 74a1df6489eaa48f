use serde::{Deserialize, Serialize};

/// Lifecycle of a persisted sync run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "running" => Some(SyncStatus::Running),
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

/// A saved read-later entry, alive only for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub is_pdf: bool,
    pub extracted_content: Option<String>,
}

impl Bookmark {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            is_pdf: false,
            extracted_content: None,
        }
    }
}

/// Readiness of a source attached to a notebook, tracked while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unready,
    Ready,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookSource {
    pub source_id: String,
    pub bookmark_id: String,
    pub state: SourceState,
}

/// What summary/podcast generation produced for a notebook.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationOutcome {
    pub notebook_id: String,
    pub episode_id: Option<String>,
    pub summary_text: Option<String>,
    pub audio_url: Option<String>,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl GenerationOutcome {
    pub fn new(notebook_id: impl Into<String>) -> Self {
        Self {
            notebook_id: notebook_id.into(),
            succeeded: true,
            ..Default::default()
        }
    }
}

/// Result returned to whoever triggered a weekly sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub run_id: Option<i64>,
    pub notebook_id: Option<String>,
    pub bookmark_count: usize,
    pub sources_added: usize,
    pub sources_failed: usize,
    pub sources_ready: usize,
    pub sources_unready: usize,
    pub episode_id: Option<String>,
    pub public_url: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl SyncResult {
    pub fn failed(run_id: i64, error: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
