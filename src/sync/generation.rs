use tracing::{debug, error, info, instrument, warn};

use super::poll::{poll_until, Poll, PollSettings};
use crate::model::GenerationOutcome;
use crate::notebook::{Note, NotebookService, PodcastRequest, RemoteStatus};

/// Request a podcast for the notebook and collect whatever generation produced.
///
/// Only a rejected generation request marks the outcome as failed. A job that
/// fails or times out leaves `episode_id` empty. The summary lookup runs in
/// every case and never fails the outcome.
#[instrument(skip_all, fields(notebook_id = %req.notebook_id))]
pub async fn generate(
    service: &dyn NotebookService,
    req: &PodcastRequest,
    poll: &PollSettings,
) -> GenerationOutcome {
    let mut outcome = GenerationOutcome::new(req.notebook_id.clone());

    match service.generate_podcast(req).await {
        Ok(job_id) => {
            outcome.episode_id = wait_for_episode(service, &job_id, poll).await;
            if let Some(episode_id) = &outcome.episode_id {
                outcome.audio_url = lookup_audio_url(service, episode_id).await;
            }
        }
        Err(err) => {
            error!(error = %err, "podcast generation request failed");
            outcome.succeeded = false;
            outcome.error = Some(format!("{:#}", err));
        }
    }

    outcome.summary_text = match service.get_notebook_notes(&req.notebook_id).await {
        Ok(notes) => select_summary(&notes),
        Err(err) => {
            warn!(error = %err, "summary retrieval failed");
            None
        }
    };

    outcome
}

async fn wait_for_episode(
    service: &dyn NotebookService,
    job_id: &str,
    poll: &PollSettings,
) -> Option<String> {
    let res = poll_until(poll, move || async move {
        match service.get_job_status(job_id).await {
            Ok(js) => match js.status {
                RemoteStatus::Completed => Poll::Ready(js.episode_id),
                RemoteStatus::Failed => {
                    error!(job_id, "podcast job failed");
                    Poll::Ready(None)
                }
                RemoteStatus::InProgress(status) => {
                    debug!(job_id, %status, "podcast job running");
                    Poll::Pending
                }
            },
            Err(err) => {
                warn!(job_id, error = %err, "podcast job status lookup failed");
                Poll::Ready(None)
            }
        }
    })
    .await;

    match res {
        Some(Some(episode_id)) => {
            info!(job_id, %episode_id, "podcast generated");
            Some(episode_id)
        }
        Some(None) => None,
        None => {
            warn!(job_id, "podcast generation timed out");
            None
        }
    }
}

async fn lookup_audio_url(service: &dyn NotebookService, episode_id: &str) -> Option<String> {
    match service.list_episodes().await {
        Ok(episodes) => episodes
            .into_iter()
            .find(|ep| ep.id == episode_id)
            .and_then(|ep| ep.audio_url),
        Err(err) => {
            warn!(episode_id, error = %err, "episode listing failed");
            None
        }
    }
}

/// First AI note, or else first note titled like a summary. Listing order wins.
pub fn select_summary(notes: &[Note]) -> Option<String> {
    notes
        .iter()
        .find(|n| {
            n.note_type.as_deref() == Some("ai")
                || n
                    .title
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains("summary"))
        })
        .and_then(|n| n.content.clone())
}
