use crate::error::Result;
use crate::trakt::api::MutationSummary;
use async_trait::async_trait;
use media_sync_models::{Item, ItemKind, List};

/// Read side of the sync: the service that owns the truth.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source_name(&self) -> &str;

    /// Whether export-dependent reads are available. Unauthenticated
    /// clients answer every read with an empty result.
    fn can_export(&self) -> bool;

    /// Ids of the lists to sync: the configured selection, or every list
    /// the account owns
    async fn list_ids(&self) -> Result<Vec<String>>;

    /// A private or absent list yields `SourceError::ResourceUnavailable`
    async fn fetch_list(&self, list_id: &str) -> Result<List>;
    async fn fetch_watchlist(&self) -> Result<List>;
    async fn fetch_ratings(&self) -> Result<Vec<Item>>;

    // Called once the run is over to free resources (browser instances)
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Write side of the sync.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    fn destination_name(&self) -> &str;

    async fn get_watchlist(&self) -> Result<List>;
    async fn add_watchlist_items(&self, items: &[Item]) -> Result<MutationSummary>;
    async fn remove_watchlist_items(&self, items: &[Item]) -> Result<MutationSummary>;

    /// Metadata of every custom list, items not loaded
    async fn get_lists(&self) -> Result<Vec<List>>;
    /// Unknown slugs yield `SourceError::ListNotFound`
    async fn get_list(&self, slug: &str) -> Result<List>;
    async fn create_list(&self, name: &str, source_id: &str) -> Result<List>;
    async fn delete_list(&self, slug: &str) -> Result<()>;
    async fn add_list_items(&self, slug: &str, items: &[Item]) -> Result<MutationSummary>;
    async fn remove_list_items(&self, slug: &str, items: &[Item]) -> Result<MutationSummary>;

    async fn get_ratings(&self) -> Result<Vec<Item>>;
    async fn add_ratings(&self, items: &[Item]) -> Result<MutationSummary>;
    async fn remove_ratings(&self, items: &[Item]) -> Result<MutationSummary>;

    async fn get_history(&self, kind: ItemKind, id: &str) -> Result<Vec<Item>>;
    async fn add_history(&self, items: &[Item]) -> Result<MutationSummary>;
    async fn remove_history(&self, items: &[Item]) -> Result<MutationSummary>;
}
