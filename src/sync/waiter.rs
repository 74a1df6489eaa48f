use tracing::{debug, info, instrument, warn};

use super::poll::{poll_until, Poll, PollSettings};
use crate::model::{NotebookSource, SourceState};
use crate::notebook::{NotebookService, RemoteStatus};

/// Poll one source until it is processed, fails, or `settings.timeout` runs out.
/// A status lookup error counts as a failure for this source.
pub async fn wait_for_source(
    service: &dyn NotebookService,
    source_id: &str,
    settings: &PollSettings,
) -> SourceState {
    let outcome = poll_until(settings, move || async move {
        match service.get_source_status(source_id).await {
            Ok(RemoteStatus::Completed) => Poll::Ready(SourceState::Ready),
            Ok(RemoteStatus::Failed) => {
                warn!(source_id, "source processing failed");
                Poll::Ready(SourceState::Failed)
            }
            Ok(RemoteStatus::InProgress(status)) => {
                debug!(source_id, %status, "source still processing");
                Poll::Pending
            }
            Err(err) => {
                warn!(source_id, error = %err, "source status lookup failed");
                Poll::Ready(SourceState::Failed)
            }
        }
    })
    .await;

    outcome.unwrap_or_else(|| {
        warn!(source_id, timeout_secs = settings.timeout.as_secs(), "source processing timed out");
        SourceState::TimedOut
    })
}

/// Wait for each source in turn, recording its final state.
/// Returns `(ready, not_ready)`; timeouts count as not ready.
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn wait_for_all(
    service: &dyn NotebookService,
    sources: &mut [NotebookSource],
    settings: &PollSettings,
) -> (usize, usize) {
    let mut ready = 0;
    let mut failed = 0;
    for source in sources.iter_mut() {
        source.state = wait_for_source(service, &source.source_id, settings).await;
        if source.state == SourceState::Ready {
            ready += 1;
        } else {
            failed += 1;
        }
    }
    info!(ready, failed, "source processing finished");
    (ready, failed)
}
