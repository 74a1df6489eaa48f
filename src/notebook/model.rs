use serde::{Deserialize, Serialize};

/// Processing state reported by the notebook service for sources and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RemoteStatus {
    Completed,
    Failed,
    /// Any non-terminal value (`pending`, `processing`, `queued`, unknown).
    InProgress(String),
}

impl RemoteStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => RemoteStatus::Completed,
            "failed" | "error" => RemoteStatus::Failed,
            other => RemoteStatus::InProgress(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteStatus::InProgress(_))
    }
}

impl From<String> for RemoteStatus {
    fn from(s: String) -> Self {
        RemoteStatus::parse(&s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateNotebookReq<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResp {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResp {
    pub status: RemoteStatus,
}

/// Body of `POST /api/podcasts/generate`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PodcastRequest {
    pub notebook_id: String,
    pub episode_name: String,
    pub episode_profile: String,
    pub speaker_profile: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodcastJobResp {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobStatus {
    pub status: RemoteStatus,
    #[serde(default)]
    pub episode_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EpisodeInfo {
    pub id: String,
    #[serde(default)]
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}
