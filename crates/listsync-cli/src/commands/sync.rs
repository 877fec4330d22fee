use super::load_config;
use crate::output::{Output, OutputFormat};
use color_eyre::Result;
use comfy_table::{presets, Cell, Table};
use media_sync_config::SyncMode;
use media_sync_core::SyncReport;
use serde_json::json;
use std::path::PathBuf;

/// Flags win over the configured mode
fn effective_mode(configured: SyncMode, dry_run: bool, add_only: bool) -> SyncMode {
    if dry_run {
        SyncMode::DryRun
    } else if add_only {
        SyncMode::AddOnly
    } else {
        configured
    }
}

pub async fn run_sync(dry_run: bool, add_only: bool, config_path: Option<PathBuf>, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");

    let (mut config, path) = load_config(config_path)?;
    config.sync.mode = effective_mode(config.sync.mode, dry_run, add_only);
    tracing::debug!(config = %path.display(), mode = %config.sync.mode, "Configuration loaded");

    let report = media_sync_core::run_sync(&config)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Sync failed: {:#}", e))?;

    match output.format() {
        OutputFormat::Human => print_report(&report, output),
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let mut value = serde_json::to_value(&report)?;
            value["success"] = json!(true);
            value["duration_seconds"] = json!(report.duration.as_secs_f64());
            output.json(&value);
        }
    }
    Ok(())
}

fn print_report(report: &SyncReport, output: &Output) {
    if output.is_quiet() {
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec![Cell::new(""), Cell::new("Added"), Cell::new("Removed")]);
    table.add_row(vec![
        Cell::new("Lists"),
        Cell::new(report.lists_created),
        Cell::new(report.lists_deleted),
    ]);
    for (name, added, removed) in [
        ("List items", report.list_items_added, report.list_items_removed),
        ("Watchlist", report.watchlist_added, report.watchlist_removed),
        ("Ratings", report.ratings_added, report.ratings_removed),
        ("History", report.history_added, report.history_removed),
    ] {
        table.add_row(vec![Cell::new(name), Cell::new(added), Cell::new(removed)]);
    }
    println!("{}", table);

    for list in &report.skipped_lists {
        output.warn(format!("Skipped IMDb list {} (private or missing)", list));
    }

    if report.dry_run {
        output.info(format!(
            "Dry run: {} changes planned, nothing was written to Trakt",
            report.total_changes()
        ));
    } else {
        output.success(format!(
            "Sync completed: {} changes in {:.1?}",
            report.total_changes(),
            report.duration
        ));
    }
}
