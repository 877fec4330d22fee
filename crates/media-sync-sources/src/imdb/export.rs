//! Export acquisition: request → poll `/exports/` until ready → download.

use crate::error::{Result, SourceError};
use crate::imdb::page::PageDriver;
use crate::retry::Sleeper;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const EXPORTS_URL: &str = "https://www.imdb.com/exports/";
pub const EXPORT_BUTTON_SELECTOR: &str = "div[data-testid*='hero-list-subnav-export-button'] button";
pub const PAGE_TITLE_SELECTOR: &str = "h1[data-testid='list-page-mc-list-title']";
pub const EXPORT_ROW_SELECTOR: &str = ".ipc-metadata-list-summary-item";
const ROW_BUTTON_SELECTOR: &str = "button[data-testid*='export-status-button']";

/// Selector of the download control inside the `row`-th export row (0-based)
pub fn row_button_selector(row: usize) -> String {
    format!("{}:nth-child({}) {}", EXPORT_ROW_SELECTOR, row + 1, ROW_BUTTON_SELECTOR)
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Only the newest rows of the exports page are considered
    pub rows_inspected: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_attempts: 30,
            rows_inspected: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Requested,
    Processing,
    Ready,
    Failed,
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportStatus::Requested => "requested",
            ExportStatus::Processing => "processing",
            ExportStatus::Ready => "ready",
            ExportStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Split an export row's text into its title line and the status text below it
fn split_row(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once('\n') {
        Some((title, rest)) => (title.trim(), rest),
        None => (text.trim(), ""),
    }
}

impl ExportStatus {
    /// Status as shown in an export row's text. The first line is the
    /// resource title and never contributes. Rows without a recognizable
    /// marker have not been picked up by the export service yet.
    pub fn from_row_text(text: &str) -> Self {
        let text = split_row(text).1.to_lowercase();
        if text.contains("in progress") {
            ExportStatus::Processing
        } else if text.contains("failed") || text.contains("unavailable") {
            ExportStatus::Failed
        } else if text.contains("ready") {
            ExportStatus::Ready
        } else {
            ExportStatus::Requested
        }
    }
}

/// A resource whose export can be requested from its own page
#[derive(Debug, Clone)]
pub struct ExportResource {
    pub id: String,
    pub url: String,
    /// Row label on the exports page. `None` reads it from the page title.
    pub label: Option<String>,
}

impl ExportResource {
    pub fn list(id: &str) -> Self {
        Self {
            id: id.to_string(),
            url: format!("https://www.imdb.com/list/{}/", id),
            label: None,
        }
    }

    pub fn watchlist(id: &str) -> Self {
        Self {
            id: id.to_string(),
            url: "https://www.imdb.com/list/watchlist".to_string(),
            label: Some("Watchlist".to_string()),
        }
    }

    pub fn ratings(user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            url: format!("https://www.imdb.com/user/{}/ratings", user_id),
            label: Some("Ratings".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub resource_id: String,
    pub label: String,
    pub status: ExportStatus,
    /// Index of the matching row on the exports page, once seen
    pub row: Option<usize>,
}

impl ExportJob {
    fn requested(resource_id: &str, label: String) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            label,
            status: ExportStatus::Requested,
            row: None,
        }
    }
}

/// Outcome of an export request: the resource's display label, plus a job
/// unless the resource had nothing to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub label: String,
    pub job: Option<ExportJob>,
}

/// Label plus the downloaded file, `None` for an empty resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub label: String,
    pub file: Option<PathBuf>,
}

/// Click the export control on the resource's page.
///
/// Empty lists render no export control and produce no job. A page without
/// a title is private or absent and yields `ResourceUnavailable`.
pub async fn request_export(page: &dyn PageDriver, resource: &ExportResource) -> Result<ExportRequest> {
    page.navigate(&resource.url).await?;

    let title = page
        .text(PAGE_TITLE_SELECTOR)
        .await?
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SourceError::ResourceUnavailable(resource.id.clone()))?;
    let label = resource.label.clone().unwrap_or(title);

    if !page.exists(EXPORT_BUTTON_SELECTOR).await? {
        info!(resource = %resource.id, label = %label, "Nothing to export, resource is empty");
        return Ok(ExportRequest { label, job: None });
    }
    page.click(EXPORT_BUTTON_SELECTOR).await?;
    info!(resource = %resource.id, label = %label, "Export requested");
    Ok(ExportRequest {
        job: Some(ExportJob::requested(&resource.id, label.clone())),
        label,
    })
}

/// Read the current state of `job` from the exports page
async fn inspect(page: &dyn PageDriver, job: &mut ExportJob, rows_inspected: usize) -> Result<()> {
    page.navigate(EXPORTS_URL).await?;
    let rows = page.texts(EXPORT_ROW_SELECTOR).await?;
    let label = job.label.trim().to_lowercase();

    let Some((row, text)) = rows
        .iter()
        .take(rows_inspected)
        .enumerate()
        .find(|(_, text)| split_row(text).0.to_lowercase() == label)
    else {
        debug!(label = %job.label, rows = rows.len(), "Export row not listed yet");
        return Ok(());
    };

    let mut status = ExportStatus::from_row_text(text);
    if status != ExportStatus::Processing
        && status != ExportStatus::Failed
        && page.exists(&row_button_selector(row)).await?
    {
        status = ExportStatus::Ready;
    }
    job.row = Some(row);
    job.status = status;
    Ok(())
}

/// Poll until the export is ready. Exhausting the attempt budget is fatal.
pub async fn await_ready(
    page: &dyn PageDriver,
    mut job: ExportJob,
    settings: &ExportSettings,
    sleeper: &dyn Sleeper,
) -> Result<ExportJob> {
    for attempt in 1..=settings.max_attempts {
        inspect(page, &mut job, settings.rows_inspected).await?;
        match job.status {
            ExportStatus::Ready => {
                info!(label = %job.label, attempt, "Export ready");
                return Ok(job);
            }
            ExportStatus::Failed => {
                warn!(label = %job.label, "Export failed");
                return Err(SourceError::ResourceUnavailable(job.resource_id));
            }
            status => {
                debug!(label = %job.label, %status, attempt, max = settings.max_attempts, "Export not ready");
                if attempt < settings.max_attempts {
                    sleeper.sleep(settings.poll_interval).await;
                }
            }
        }
    }
    Err(SourceError::ExportTimeout {
        resource: job.resource_id,
        attempts: settings.max_attempts,
    })
}

/// Trigger the ready row's download control. Consumes the job.
pub async fn download(page: &dyn PageDriver, job: ExportJob) -> Result<PathBuf> {
    let row = match (job.status, job.row) {
        (ExportStatus::Ready, Some(row)) => row,
        _ => {
            return Err(SourceError::Browser(format!(
                "export '{}' is {} and cannot be downloaded",
                job.label, job.status
            )))
        }
    };
    let path = page.download(&row_button_selector(row)).await?;
    info!(label = %job.label, path = %path.display(), "Export file downloaded");
    Ok(path)
}

/// Full pipeline for one resource
pub async fn export(
    page: &dyn PageDriver,
    resource: &ExportResource,
    settings: &ExportSettings,
    sleeper: &dyn Sleeper,
) -> Result<ExportOutcome> {
    let ExportRequest { label, job } = request_export(page, resource).await?;
    let Some(job) = job else {
        return Ok(ExportOutcome { label, file: None });
    };
    let job = await_ready(page, job, settings, sleeper).await?;
    let file = download(page, job).await?;
    Ok(ExportOutcome { label, file: Some(file) })
}
