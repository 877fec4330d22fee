use crate::error::{Result, SourceError};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Per-run directory chromium drops export files into
pub fn export_dir() -> Result<PathBuf> {
    let session_id = format!("session_{}", Utc::now().format("%Y%m%d%H%M%S%f"));
    let dir = std::env::temp_dir().join("listsync_exports").join(session_id);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Completed CSV files in `dir`. In-flight chromium downloads carry a
/// `.crdownload` suffix and are not listed.
pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("csv"))
        .collect();
    files.sort();
    Ok(files)
}

/// Poll `dir` until a CSV not present in `before` shows up
pub async fn wait_for_new_csv(
    dir: &Path,
    before: &[PathBuf],
    attempts: u32,
    interval: Duration,
) -> Result<PathBuf> {
    for attempt in 1..=attempts {
        if let Some(file) = csv_files(dir)?.into_iter().find(|f| !before.contains(f)) {
            info!(path = %file.display(), "Export downloaded");
            return Ok(file);
        }
        debug!(attempt, attempts, "Waiting for export download");
        sleep(interval).await;
    }
    Err(SourceError::Browser(format!(
        "no new export file appeared in {} after {} checks",
        dir.display(),
        attempts
    )))
}
