use super::load_config;
use crate::output::{Output, OutputFormat};
use color_eyre::Result;
use comfy_table::{presets, Attribute, Cell, Color, Table};
use media_sync_config::Config;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn show_config(full: bool, config_path: Option<PathBuf>, output: &Output) -> Result<()> {
    let (config, path) = load_config(config_path)?;
    if !path.exists() {
        output.warn(format!(
            "Configuration file not found at {}, showing defaults and environment overrides",
            path.display()
        ));
    }
    let shown = if full { config.clone() } else { config.masked() };

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }
            println!("{} {}", "Config file:".bright_cyan().bold(), path.display());
            for table in tables(&shown) {
                println!("{}", table);
            }
            if let Err(e) = config.validate() {
                output.warn(format!("Configuration is not usable yet: {:#}", e));
            }
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            output.json(&serde_json::to_value(&shown)?);
        }
    }
    Ok(())
}

fn section(title: &str, rows: Vec<(&str, String)>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec![Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold)]);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table
}

fn tables(config: &Config) -> Vec<Table> {
    let imdb = &config.imdb;
    let lists = if imdb.lists.is_empty() {
        "(all lists)".to_string()
    } else {
        imdb.lists.join(", ")
    };
    let trakt = &config.trakt;
    let sync = &config.sync;

    vec![
        section(
            "IMDb",
            vec![
                ("Auth", format!("{:?}", imdb.auth).to_lowercase()),
                ("Email", imdb.email.clone()),
                ("Password", imdb.password.clone()),
                ("Cookie at-main", imdb.cookie_at_main.clone()),
                ("Cookie ubid-main", imdb.cookie_ubid_main.clone()),
                ("Lists", lists),
                ("Headless", imdb.headless.to_string()),
                (
                    "Export polling",
                    format!(
                        "every {}s, {} attempts, newest {} rows",
                        imdb.export_poll_interval_secs, imdb.export_max_attempts, imdb.export_rows_inspected
                    ),
                ),
            ],
        ),
        section(
            "Trakt",
            vec![
                ("Client ID", trakt.client_id.clone()),
                ("Client Secret", trakt.client_secret.clone()),
                ("Email", trakt.email.clone()),
                ("Password", trakt.password.clone()),
            ],
        ),
        section(
            "Sync",
            vec![
                ("Mode", sync.mode.to_string()),
                ("Lists", sync.lists.to_string()),
                ("Watchlist", sync.watchlist.to_string()),
                ("Ratings", sync.ratings.to_string()),
                ("History", sync.history.to_string()),
                ("Timeout", format!("{}s", sync.timeout_secs)),
            ],
        ),
    ]
}
