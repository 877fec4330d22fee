use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a trackable item.
///
/// The destination models these as mutually exclusive attachment points on one
/// wire item, so the kind decides which sub-object an item is nested under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Movie,
    Show,
    Episode,
    Season,
    Person,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Show => "show",
            ItemKind::Episode => "episode",
            ItemKind::Season => "season",
            ItemKind::Person => "person",
        }
    }

    /// Plural form used in grouped request bodies and history paths
    pub fn plural(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movies",
            ItemKind::Show => "shows",
            ItemKind::Episode => "episodes",
            ItemKind::Season => "seasons",
            ItemKind::Person => "people",
        }
    }

    /// Whether the destination keeps per-item watch history for this kind
    pub fn has_history(&self) -> bool {
        matches!(self, ItemKind::Movie | ItemKind::Episode)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trackable item, identified by its canonical id (an IMDb `tt`/`nm` id)
/// and its kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 1-10 integer rating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(id: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            kind,
            title: None,
            rating: None,
            rated_at: None,
            watched_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_rating(mut self, rating: u8, rated_at: Option<DateTime<Utc>>) -> Self {
        self.rating = Some(rating);
        self.rated_at = rated_at;
        self
    }

    pub fn with_watched_at(mut self, watched_at: DateTime<Utc>) -> Self {
        self.watched_at = Some(watched_at);
        self
    }

    /// Copy of this item stripped down to identity (id + kind)
    pub fn identity(&self) -> Item {
        Item::new(self.id.clone(), self.kind)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.title, self.rating) {
            (Some(title), Some(rating)) => write!(f, "{} {} ({}, rated {})", self.kind, self.id, title, rating),
            (Some(title), None) => write!(f, "{} {} ({})", self.kind, self.id, title),
            (None, Some(rating)) => write!(f, "{} {} (rated {})", self.kind, self.id, rating),
            (None, None) => write!(f, "{} {}", self.kind, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_serde_is_lowercase() {
        let json = serde_json::to_string(&ItemKind::Episode).unwrap();
        assert_eq!(json, "\"episode\"");
        let kind: ItemKind = serde_json::from_str("\"person\"").unwrap();
        assert_eq!(kind, ItemKind::Person);
    }

    #[test]
    fn test_identity_drops_rating() {
        let item = Item::new("tt0111161", ItemKind::Movie)
            .with_title("The Shawshank Redemption")
            .with_rating(10, None);
        let identity = item.identity();
        assert_eq!(identity.id, "tt0111161");
        assert_eq!(identity.rating, None);
        assert_eq!(identity.title, None);
    }

    #[test]
    fn test_history_kinds() {
        assert!(ItemKind::Movie.has_history());
        assert!(ItemKind::Episode.has_history());
        assert!(!ItemKind::Show.has_history());
        assert!(!ItemKind::Person.has_history());
    }
}
