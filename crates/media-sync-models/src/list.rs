use crate::item::Item;
use serde::{Deserialize, Serialize};

/// Display name used for the distinguished watchlist
pub const WATCHLIST_NAME: &str = "Watchlist";

/// An ordered collection of items.
///
/// `slug` is always derived from `name`; use [`List::rename`] rather than
/// assigning `name` directly. The watchlist has no user-assignable slug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct List {
    /// Source-assigned id (`ls...`)
    pub id: String,
    pub name: String,
    pub slug: String,
    pub items: Vec<Item>,
    pub is_watchlist: bool,
}

impl List {
    pub fn new(id: impl Into<String>, name: impl Into<String>, items: Vec<Item>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            slug: slugify(&name),
            name,
            items,
            is_watchlist: false,
        }
    }

    pub fn watchlist(id: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id: id.into(),
            name: WATCHLIST_NAME.to_string(),
            slug: String::new(),
            items,
            is_watchlist: true,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        if !self.is_watchlist {
            self.slug = slugify(&self.name);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Derive a destination-safe slug from a list name.
///
/// Lowercases, turns whitespace into hyphens, drops everything outside
/// `[-_a-z0-9]` and collapses runs of hyphens. Leading/trailing hyphens are
/// trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if ch.is_whitespace() { '-' } else { ch };
        if !(mapped.is_ascii_lowercase() || mapped.is_ascii_digit() || mapped == '-' || mapped == '_') {
            continue;
        }
        if mapped == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(mapped);
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_slug_safe(slug: &str) -> bool {
        !slug.is_empty()
            && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
            && !slug.contains("--")
    }

    #[test]
    fn test_slugify_strips_punctuation_and_collapses_hyphens() {
        let slug = slugify("Sci-Fi & Fantasy!!");
        assert_eq!(slug, "sci-fi-fantasy");
        assert!(is_slug_safe(&slug));
    }

    #[test]
    fn test_slugify_handles_whitespace_runs() {
        assert_eq!(slugify("  My   Favourite\tFilms  "), "my-favourite-films");
        assert_eq!(slugify("Top_10 of 2023"), "top_10-of-2023");
    }

    #[test]
    fn test_slugify_drops_non_ascii() {
        assert_eq!(slugify("Amélie & Friends"), "amlie-friends");
    }

    #[test]
    fn test_rename_recomputes_slug() {
        let mut list = List::new("ls001", "Old Name", Vec::new());
        assert_eq!(list.slug, "old-name");
        list.rename("Brand New Name");
        assert_eq!(list.slug, "brand-new-name");
    }

    #[test]
    fn test_watchlist_has_no_slug() {
        let mut list = List::watchlist("ls999", Vec::new());
        assert!(list.is_watchlist);
        assert!(list.slug.is_empty());
        list.rename("Something");
        assert!(list.slug.is_empty());
    }
}
