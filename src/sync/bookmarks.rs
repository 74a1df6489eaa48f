use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use tracing::{info, instrument, warn};

use crate::model::Bookmark;
use crate::readeck::{BookmarkQuery, BookmarkService, ContentFormat, RemoteBookmark};

/// Hard stop for pagination in case the service keeps returning full pages.
const MAX_PAGES: u32 = 100;

/// Collect every bookmark created on or after `today - window_days`,
/// newest first. PDF bookmarks get their extracted text when the service
/// has it; extraction problems are logged and never fail the fetch.
#[instrument(skip_all, fields(window_days = window_days))]
pub async fn fetch_recent_bookmarks(
    service: &dyn BookmarkService,
    today: NaiveDate,
    window_days: i64,
    page_size: u32,
) -> Result<Vec<Bookmark>> {
    let since = today - Duration::days(window_days);
    let mut remote: Vec<RemoteBookmark> = Vec::new();
    for page in 1..=MAX_PAGES {
        let query = BookmarkQuery {
            since,
            sort: "-created".into(),
            page,
            limit: page_size,
        };
        let batch = service
            .list_bookmarks(&query)
            .await
            .context("failed to fetch bookmarks")?;
        let last = batch.len() < page_size as usize;
        remote.extend(batch);
        if last {
            break;
        }
    }

    let mut bookmarks = Vec::with_capacity(remote.len());
    for rb in remote {
        let is_pdf = rb.is_pdf();
        let mut bookmark = Bookmark {
            is_pdf,
            title: rb.title,
            ..Bookmark::new(rb.id, rb.url)
        };
        if is_pdf {
            bookmark.extracted_content = extract_pdf_text(service, &bookmark.id).await;
        }
        bookmarks.push(bookmark);
    }

    info!(count = bookmarks.len(), %since, "recent bookmarks retrieved");
    Ok(bookmarks)
}

async fn extract_pdf_text(service: &dyn BookmarkService, id: &str) -> Option<String> {
    match service.get_content(id, ContentFormat::Markdown).await {
        Ok(Some(text)) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            info!(bookmark_id = id, "no extracted content for pdf");
            None
        }
        Err(err) => {
            warn!(bookmark_id = id, error = %err, "pdf content extraction failed");
            None
        }
    }
}
