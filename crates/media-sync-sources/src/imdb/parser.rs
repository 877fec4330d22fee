use crate::error::{Result, SourceError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use csv::{Reader, StringRecord};
use media_sync_models::{Item, ItemKind};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Column layout of an export file, decided from its header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportShape {
    TitleList,
    Ratings,
    People,
}

#[derive(Debug, Clone)]
pub struct ParsedExport {
    pub shape: ExportShape,
    pub items: Vec<Item>,
}

/// Compare the header row against the known export layouts
pub fn detect_shape(headers: &StringRecord) -> Result<ExportShape> {
    let has = |name: &str| headers.iter().any(|h| h.trim() == name);

    if has("Const") && has("Your Rating") && has("Date Rated") {
        return Ok(ExportShape::Ratings);
    }
    if has("Const") && has("Name") && has("Known For") {
        return Ok(ExportShape::People);
    }
    if has("Position") && has("Const") && has("Title") && has("Title Type") {
        return Ok(ExportShape::TitleList);
    }

    let columns: Vec<&str> = headers.iter().collect();
    Err(SourceError::Parse(format!(
        "unrecognized export header: {:?}",
        columns
    )))
}

/// Map an export `Title Type` onto an item kind. `None` for types the
/// destination cannot represent (video games, podcasts, ...).
pub fn kind_for_title_type(title_type: &str) -> Option<ItemKind> {
    match title_type.trim() {
        "movie" | "tvMovie" | "tvSpecial" | "video" | "short" | "tvShort" => Some(ItemKind::Movie),
        "Movie" | "TV Movie" | "TV Special" | "Video" | "Short" | "TV Short" => Some(ItemKind::Movie),
        "tvSeries" | "tvMiniSeries" => Some(ItemKind::Show),
        "TV Series" | "TV Mini Series" | "TV Mini-Series" => Some(ItemKind::Show),
        "tvEpisode" | "TV Episode" => Some(ItemKind::Episode),
        _ => None,
    }
}

pub fn parse_export_file<P: AsRef<Path>>(path: P) -> Result<ParsedExport> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Parsing IMDb export");
    parse_export(File::open(path)?)
}

pub fn parse_export<R: Read>(source: R) -> Result<ParsedExport> {
    let mut reader = Reader::from_reader(source);
    let headers = reader.headers()?.clone();
    let shape = detect_shape(&headers)?;
    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();

    let mut items = Vec::new();
    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        rows += 1;
        let field = |name: &str| {
            columns
                .get(name)
                .and_then(|&i| record.get(i))
                .map(str::trim)
                .unwrap_or("")
        };

        let id = field("Const");
        if id.is_empty() {
            debug!(row = rows, "Skipping row with empty IMDb id");
            continue;
        }

        let item = match shape {
            ExportShape::People => Item::new(id, ItemKind::Person).with_title(field("Name")),
            ExportShape::TitleList | ExportShape::Ratings => {
                let title_type = field("Title Type");
                let Some(kind) = kind_for_title_type(title_type) else {
                    warn!(row = rows, id, title_type, "Skipping title of unsupported type");
                    continue;
                };
                let item = Item::new(id, kind).with_title(field("Title"));
                if shape == ExportShape::Ratings {
                    let rating = parse_rating(field("Your Rating"))?;
                    let rated_at = parse_date(field("Date Rated"))?;
                    item.with_rating(rating, Some(rated_at))
                } else {
                    item
                }
            }
        };
        items.push(item);
    }

    info!(?shape, rows, items = items.len(), "Parsed IMDb export");
    Ok(ParsedExport { shape, items })
}

fn parse_rating(value: &str) -> Result<u8> {
    value
        .parse::<u8>()
        .ok()
        .filter(|r| (1..=10).contains(r))
        .ok_or_else(|| SourceError::Parse(format!("invalid rating '{}'", value)))
}

/// `YYYY-MM-DD` at midnight UTC
fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| SourceError::Parse(format!("invalid date '{}'", value)))
}
