//! Trakt API v2 wire types and their mapping onto the canonical item model.

use chrono::{DateTime, Utc};
use media_sync_models::{Item, ItemKind, List};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const API_URL: &str = "https://api.trakt.tv";
pub const WEB_URL: &str = "https://trakt.tv";
pub const API_VERSION: &str = "2";

/// Page size used when listing the history of a single item
pub const HISTORY_LIMIT: u32 = 1000;

/// Prefix of the description stamped on lists created by the sync
pub const LIST_NOTE_PREFIX: &str = "listsync:imdb:";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraktIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u64>,
}

impl TraktIds {
    pub fn imdb(id: impl Into<String>) -> Self {
        Self {
            imdb: Some(id.into()),
            ..Default::default()
        }
    }

    /// Trakt sometimes echoes IMDb ids with stray slashes
    fn canonical_id(&self) -> Option<String> {
        self.imdb
            .as_deref()
            .map(|id| id.replace('/', ""))
            .filter(|id| !id.is_empty())
    }
}

/// Movie, show, episode, season or person object. Only the fields the sync
/// reads are modelled; the rest of the payload is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraktMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default)]
    pub ids: TraktIds,
}

impl TraktMedia {
    fn display_name(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }
}

/// The kind-specific attachment point of a wire item, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    Movie {
        movie: TraktMedia,
    },
    Show {
        show: TraktMedia,
    },
    Episode {
        episode: TraktMedia,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        show: Option<TraktMedia>,
    },
    Season {
        season: TraktMedia,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        show: Option<TraktMedia>,
    },
    Person {
        person: TraktMedia,
    },
}

impl Attachment {
    pub fn kind(&self) -> ItemKind {
        match self {
            Attachment::Movie { .. } => ItemKind::Movie,
            Attachment::Show { .. } => ItemKind::Show,
            Attachment::Episode { .. } => ItemKind::Episode,
            Attachment::Season { .. } => ItemKind::Season,
            Attachment::Person { .. } => ItemKind::Person,
        }
    }

    pub fn media(&self) -> &TraktMedia {
        match self {
            Attachment::Movie { movie } => movie,
            Attachment::Show { show } => show,
            Attachment::Episode { episode, .. } => episode,
            Attachment::Season { season, .. } => season,
            Attachment::Person { person } => person,
        }
    }
}

/// One entry of a watchlist, list, ratings or history response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attachment: Attachment,
}

impl WireItem {
    /// Map onto the canonical model. Items without an IMDb id cannot be
    /// reconciled and yield `None`.
    pub fn into_item(self) -> Option<Item> {
        let kind = self.attachment.kind();
        let media = self.attachment.media();
        let id = media.ids.canonical_id()?;
        let mut item = Item::new(id, kind);
        if let Some(title) = media.display_name() {
            item = item.with_title(title);
        }
        if let Some(rating) = self.rating {
            item = item.with_rating(rating, self.rated_at);
        }
        if let Some(watched_at) = self.watched_at {
            item = item.with_watched_at(watched_at);
        }
        Some(item)
    }
}

/// Convert a response page into canonical items, dropping unresolvable ones
pub fn into_items(wire: Vec<WireItem>) -> Vec<Item> {
    let total = wire.len();
    let items: Vec<Item> = wire.into_iter().filter_map(WireItem::into_item).collect();
    if items.len() < total {
        debug!(
            dropped = total - items.len(),
            "Skipped Trakt items without an IMDb id"
        );
    }
    items
}

/// Entry of a grouped mutation body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationEntry {
    pub ids: TraktIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
}

/// Request body of list/watchlist/ratings/history mutations, grouped by kind
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MutationBody {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub movies: Vec<MutationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shows: Vec<MutationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<MutationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<MutationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people: Vec<MutationEntry>,
}

impl MutationBody {
    /// Body carrying ratings and timestamps. Seasons are sent without a
    /// rating.
    pub fn from_items(items: &[Item]) -> Self {
        let mut body = Self::default();
        for item in items {
            let rating = match item.kind {
                ItemKind::Season => None,
                _ => item.rating,
            };
            body.bucket_mut(item.kind).push(MutationEntry {
                ids: TraktIds::imdb(item.id.clone()),
                rating,
                rated_at: rating.and(item.rated_at),
                watched_at: item.watched_at,
            });
        }
        body
    }

    /// Body carrying ids only, as used by the removal endpoints
    pub fn identities(items: &[Item]) -> Self {
        let mut body = Self::default();
        for item in items {
            body.bucket_mut(item.kind).push(MutationEntry {
                ids: TraktIds::imdb(item.id.clone()),
                rating: None,
                rated_at: None,
                watched_at: None,
            });
        }
        body
    }

    fn bucket_mut(&mut self, kind: ItemKind) -> &mut Vec<MutationEntry> {
        match kind {
            ItemKind::Movie => &mut self.movies,
            ItemKind::Show => &mut self.shows,
            ItemKind::Episode => &mut self.episodes,
            ItemKind::Season => &mut self.seasons,
            ItemKind::Person => &mut self.people,
        }
    }

    pub fn len(&self) -> usize {
        self.movies.len() + self.shows.len() + self.episodes.len() + self.seasons.len() + self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct KindCounts {
    #[serde(default)]
    pub movies: u32,
    #[serde(default)]
    pub shows: u32,
    #[serde(default)]
    pub episodes: u32,
    #[serde(default)]
    pub seasons: u32,
    #[serde(default)]
    pub people: u32,
}

impl KindCounts {
    pub fn total(&self) -> u32 {
        self.movies + self.shows + self.episodes + self.seasons + self.people
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NotFoundEntry {
    #[serde(default)]
    pub ids: TraktIds,
}

/// Items the destination could not resolve, echoed back per kind
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NotFound {
    #[serde(default)]
    pub movies: Vec<NotFoundEntry>,
    #[serde(default)]
    pub shows: Vec<NotFoundEntry>,
    #[serde(default)]
    pub episodes: Vec<NotFoundEntry>,
    #[serde(default)]
    pub seasons: Vec<NotFoundEntry>,
    #[serde(default)]
    pub people: Vec<NotFoundEntry>,
}

impl NotFound {
    pub fn ids(&self) -> Vec<String> {
        [&self.movies, &self.shows, &self.episodes, &self.seasons, &self.people]
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ids.canonical_id())
            .collect()
    }
}

/// Response of every mutation endpoint
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MutationSummary {
    #[serde(default)]
    pub added: KindCounts,
    #[serde(default)]
    pub deleted: KindCounts,
    #[serde(default)]
    pub existing: KindCounts,
    #[serde(default)]
    pub not_found: NotFound,
}

impl MutationSummary {
    pub fn log_not_found(&self, operation: &str) {
        let missing = self.not_found.ids();
        if !missing.is_empty() {
            warn!(
                operation,
                count = missing.len(),
                ids = ?missing,
                "Trakt could not resolve some items"
            );
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ListIds {
    #[serde(default)]
    pub trakt: Option<u64>,
    #[serde(default)]
    pub slug: String,
}

/// Custom list metadata as returned by `/users/{user}/lists`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TraktList {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub privacy: Option<String>,
    #[serde(default)]
    pub item_count: Option<u32>,
    pub ids: ListIds,
}

impl TraktList {
    /// Source list id recorded in the creation note, if the sync created it
    pub fn source_id(&self) -> Option<&str> {
        self.description
            .as_deref()
            .and_then(|d| d.trim().strip_prefix(LIST_NOTE_PREFIX))
            .filter(|id| !id.is_empty())
    }

    /// Canonical list carrying Trakt's own slug
    pub fn into_list(self, items: Vec<Item>) -> List {
        let id = match self.source_id() {
            Some(id) => id.to_string(),
            None => self
                .ids
                .trakt
                .map(|id| id.to_string())
                .unwrap_or_else(|| self.ids.slug.clone()),
        };
        let mut list = List::new(id, self.name, items);
        if !self.ids.slug.is_empty() {
            list.slug = self.ids.slug;
        }
        list
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateListBody {
    pub name: String,
    pub description: String,
    pub privacy: String,
}

impl CreateListBody {
    pub fn for_source_list(name: &str, source_id: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("{}{}", LIST_NOTE_PREFIX, source_id),
            privacy: "private".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodeRequest<'a> {
    pub client_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceTokenRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Headers sent on every API call
pub fn api_headers(client_id: &str, access_token: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![
        ("trakt-api-version".to_string(), API_VERSION.to_string()),
        ("trakt-api-key".to_string(), client_id.to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ];
    if let Some(token) = access_token {
        headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
    }
    headers
}
