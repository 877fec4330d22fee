//! Narrow page interface the IMDb state machines are written against.
//!
//! The chromium implementation lives in `browser.rs`; tests drive the same
//! code through [`testing::ScriptedPage`].

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Text of the first element matching `selector`
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    /// Text of every element matching `selector`, in document order
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;

    /// `name` attribute of the first element matching `selector`
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// `name` attribute of every matching element that carries it
    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<String>>;

    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Missing elements are `SourceError::Scrape`
    async fn click(&self, selector: &str) -> Result<()>;
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Session cookies for the IMDb domain, set before navigating
    async fn set_cookies(&self, cookies: &[(String, String)]) -> Result<()>;

    /// Click a download control and wait for the file to land on disk
    async fn download(&self, selector: &str) -> Result<PathBuf>;
}
