use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use tracing::{error, info, instrument};

use crate::model::{Bookmark, NotebookSource, SourceState};
use crate::notebook::NotebookService;

const PDF_FALLBACK_TITLE: &str = "PDF Document";

/// ISO week label used for both the notebook and the episode, e.g. `Week 2024-W09`.
pub fn period_label(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("Week {}-W{:02}", week.year(), week.week())
}

/// Create the notebook for this cycle. Errors propagate: the run cannot go on
/// without it.
#[instrument(skip_all)]
pub async fn create_notebook(
    service: &dyn NotebookService,
    name: &str,
    bookmarks: &[Bookmark],
) -> Result<String> {
    let description = format!("{} articles", bookmarks.len());
    service
        .create_notebook(name, &description)
        .await
        .with_context(|| format!("failed to create notebook {}", name))
}

/// Attach every bookmark to the notebook in input order.
///
/// PDFs with extracted text go in as text sources, everything else as URL
/// sources. A failed addition is counted and skipped.
#[instrument(skip_all, fields(notebook_id = notebook_id))]
pub async fn add_sources(
    service: &dyn NotebookService,
    notebook_id: &str,
    bookmarks: &[Bookmark],
) -> (Vec<NotebookSource>, usize) {
    let mut sources = Vec::with_capacity(bookmarks.len());
    let mut failures = 0;

    for bm in bookmarks {
        let res = match (&bm.extracted_content, bm.is_pdf) {
            (Some(content), true) => {
                let title = bm.title.as_deref().unwrap_or(PDF_FALLBACK_TITLE);
                service.add_source_text(notebook_id, content, title).await
            }
            _ => service.add_source_url(notebook_id, &bm.url).await,
        };
        match res {
            Ok(source_id) => {
                info!(%source_id, bookmark_id = %bm.id, "source added");
                sources.push(NotebookSource {
                    source_id,
                    bookmark_id: bm.id.clone(),
                    state: SourceState::Unready,
                });
            }
            Err(err) => {
                failures += 1;
                error!(bookmark_id = %bm.id, url = %bm.url, error = %err, "source add failed");
            }
        }
    }

    info!(added = sources.len(), failed = failures, "sources added to notebook");
    (sources, failures)
}
