use crate::diff::{reconcile, Diff};
use crate::fetch::fetch_all;
use anyhow::{Context, Result};
use media_sync_config::SyncMode;
use media_sync_models::{Item, List};
use media_sync_sources::{DestinationClient, SourceClient};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SyncOptions {
    pub mode: SyncMode,
    pub watchlist: bool,
    pub lists: bool,
    pub ratings: bool,
    pub history: bool,
    /// Delete destination lists that have no source counterpart. Only
    /// meaningful when the run covers every source list.
    pub delete_unmatched_lists: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Full,
            watchlist: true,
            lists: true,
            ratings: true,
            history: true,
            delete_unmatched_lists: true,
        }
    }
}

/// What a run changed (or, in dry-run mode, would have changed)
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub lists_created: usize,
    pub lists_deleted: usize,
    pub list_items_added: usize,
    pub list_items_removed: usize,
    pub watchlist_added: usize,
    pub watchlist_removed: usize,
    pub ratings_added: usize,
    pub ratings_removed: usize,
    pub history_added: usize,
    pub history_removed: usize,
    /// Source lists that were private or missing
    pub skipped_lists: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncReport {
    pub fn total_changes(&self) -> usize {
        self.lists_created
            + self.lists_deleted
            + self.list_items_added
            + self.list_items_removed
            + self.watchlist_added
            + self.watchlist_removed
            + self.ratings_added
            + self.ratings_removed
            + self.history_added
            + self.history_removed
    }
}

/// Source-side state read before the first mutation
#[derive(Debug, Default)]
pub struct Snapshot {
    pub lists: Vec<List>,
    pub watchlist: Option<List>,
    pub ratings: Option<Vec<Item>>,
    pub skipped_lists: Vec<String>,
}

/// Destination-side state. `lists` holds loaded counterparts of source
/// lists keyed by source list id; `unmatched` only carries metadata.
#[derive(Debug, Default)]
struct DestinationSnapshot {
    lists: HashMap<String, List>,
    unmatched: Vec<List>,
    watchlist: Option<List>,
    ratings: Option<Vec<Item>>,
}

pub struct SyncOrchestrator {
    source: Arc<dyn SourceClient>,
    destination: Arc<dyn DestinationClient>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(source: Arc<dyn SourceClient>, destination: Arc<dyn DestinationClient>, options: SyncOptions) -> Self {
        Self {
            source,
            destination,
            options,
        }
    }

    fn applies(&self) -> bool {
        self.options.mode != SyncMode::DryRun
    }

    fn removes(&self) -> bool {
        self.options.mode != SyncMode::AddOnly
    }

    fn audit(&self, operation: &str, target: &str, items: &[Item]) {
        if items.is_empty() {
            return;
        }
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        info!(
            operation,
            target,
            count = items.len(),
            ids = ?ids,
            dry_run = !self.applies(),
            "Sync mutation"
        );
    }

    /// Hydrate both sides, reconcile, then apply. Any hydration failure
    /// aborts the run before the destination is touched.
    pub async fn run(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport {
            dry_run: !self.applies(),
            ..SyncReport::default()
        };
        info!(
            operation = "sync_start",
            source = self.source.source_name(),
            destination = self.destination.destination_name(),
            mode = %self.options.mode,
            "Starting sync"
        );

        if !self.source.can_export() {
            warn!(
                source = self.source.source_name(),
                "Source is not authenticated, nothing can be exported; skipping sync"
            );
            report.duration = start.elapsed();
            return Ok(report);
        }

        let source = self.hydrate_source().await?;
        let destination = self.hydrate_destination(&source).await?;
        report.skipped_lists = source.skipped_lists.clone();

        if self.options.lists {
            self.sync_lists(&source, destination.lists, destination.unmatched, &mut report)
                .await?;
        }
        if let (Some(wanted), Some(current)) = (&source.watchlist, &destination.watchlist) {
            self.sync_watchlist(wanted, current, &mut report).await?;
        }
        if let (Some(wanted), Some(current)) = (&source.ratings, &destination.ratings) {
            self.sync_ratings(wanted, current, &mut report).await?;
        }

        report.duration = start.elapsed();
        info!(
            operation = "sync_complete",
            dry_run = report.dry_run,
            lists_created = report.lists_created,
            lists_deleted = report.lists_deleted,
            list_items_added = report.list_items_added,
            list_items_removed = report.list_items_removed,
            watchlist_added = report.watchlist_added,
            watchlist_removed = report.watchlist_removed,
            ratings_added = report.ratings_added,
            ratings_removed = report.ratings_removed,
            history_added = report.history_added,
            history_removed = report.history_removed,
            duration_ms = report.duration.as_millis() as u64,
            "Sync complete"
        );
        Ok(report)
    }

    pub async fn hydrate_source(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        if self.options.lists {
            let ids = self
                .source
                .list_ids()
                .await
                .context("failed to enumerate source lists")?;
            info!(count = ids.len(), "Fetching source lists");
            let source = self.source.clone();
            let outcome = fetch_all(ids, move |id| {
                let source = source.clone();
                async move { source.fetch_list(&id).await }
            })
            .await
            .context("failed to fetch source lists")?;
            for id in &outcome.not_found {
                warn!(list = %id, "Source list is private or missing, skipping");
            }
            snapshot.lists = outcome.fetched;
            snapshot.skipped_lists = outcome.not_found;
        }

        if self.options.watchlist {
            let watchlist = self
                .source
                .fetch_watchlist()
                .await
                .context("failed to fetch source watchlist")?;
            snapshot.watchlist = Some(watchlist);
        }

        if self.options.ratings {
            let ratings = self
                .source
                .fetch_ratings()
                .await
                .context("failed to fetch source ratings")?;
            snapshot.ratings = Some(ratings);
        }

        Ok(snapshot)
    }

    async fn hydrate_destination(&self, source: &Snapshot) -> Result<DestinationSnapshot> {
        let mut snapshot = DestinationSnapshot::default();

        if self.options.lists {
            let lists = self
                .destination
                .get_lists()
                .await
                .context("failed to fetch destination lists")?;
            let (matched, unmatched) = pair_lists(&source.lists, lists);

            let owners: Arc<HashMap<String, String>> = Arc::new(
                matched
                    .iter()
                    .map(|(source_id, list)| (list.slug.clone(), source_id.clone()))
                    .collect(),
            );
            let slugs: Vec<String> = matched.into_iter().map(|(_, list)| list.slug).collect();
            let destination = self.destination.clone();
            let outcome = fetch_all(slugs, move |slug| {
                let destination = destination.clone();
                let owner = owners.get(&slug).cloned().unwrap_or_default();
                async move { destination.get_list(&slug).await.map(|list| (owner, list)) }
            })
            .await
            .context("failed to fetch destination list items")?;
            for slug in &outcome.not_found {
                debug!(list = %slug, "Destination list vanished, it will be recreated");
            }
            snapshot.lists = outcome.fetched.into_iter().collect();
            snapshot.unmatched = unmatched;
        }

        if source.watchlist.is_some() {
            let watchlist = self
                .destination
                .get_watchlist()
                .await
                .context("failed to fetch destination watchlist")?;
            snapshot.watchlist = Some(watchlist);
        }

        if source.ratings.is_some() {
            let ratings = self
                .destination
                .get_ratings()
                .await
                .context("failed to fetch destination ratings")?;
            snapshot.ratings = Some(ratings);
        }

        Ok(snapshot)
    }

    async fn sync_lists(
        &self,
        source: &Snapshot,
        mut existing: HashMap<String, List>,
        unmatched: Vec<List>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut created: HashSet<&str> = HashSet::new();

        for list in &source.lists {
            let (slug, current) = match existing.remove(&list.id) {
                Some(current) => (current.slug, current.items),
                None => {
                    if list.slug.is_empty() {
                        warn!(list = %list.id, name = %list.name, "List name has no usable slug, skipping");
                        continue;
                    }
                    if !created.insert(list.slug.as_str()) {
                        warn!(list = %list.id, slug = %list.slug, "Another source list already maps to this slug, skipping");
                        continue;
                    }
                    (self.create_list(list, report).await?, Vec::new())
                }
            };
            let diff = reconcile(&list.items, &current);
            self.apply_list_diff(&slug, &diff, report).await?;
        }

        if unmatched.is_empty() {
            return Ok(());
        }
        if !self.removes() {
            debug!(count = unmatched.len(), "Add-only mode, keeping destination-only lists");
        } else if !self.options.delete_unmatched_lists {
            info!(
                count = unmatched.len(),
                "Explicit list selection, leaving other destination lists alone"
            );
        } else if !source.skipped_lists.is_empty() {
            warn!(
                count = unmatched.len(),
                skipped = ?source.skipped_lists,
                "Some source lists could not be read, not deleting destination-only lists"
            );
        } else {
            for list in unmatched {
                info!(operation = "delete_list", list = %list.slug, dry_run = !self.applies(), "Sync mutation");
                if self.applies() {
                    self.destination
                        .delete_list(&list.slug)
                        .await
                        .with_context(|| format!("failed to delete list {}", list.slug))?;
                }
                report.lists_deleted += 1;
            }
        }
        Ok(())
    }

    /// Create the destination counterpart of `list`, returning its slug
    async fn create_list(&self, list: &List, report: &mut SyncReport) -> Result<String> {
        info!(
            operation = "create_list",
            list = %list.slug,
            name = %list.name,
            source_id = %list.id,
            dry_run = !self.applies(),
            "Sync mutation"
        );
        report.lists_created += 1;
        if !self.applies() {
            return Ok(list.slug.clone());
        }
        let created = self
            .destination
            .create_list(&list.name, &list.id)
            .await
            .with_context(|| format!("failed to create list {}", list.name))?;
        if created.slug != list.slug {
            debug!(expected = %list.slug, actual = %created.slug, "Destination assigned a different slug");
        }
        Ok(created.slug)
    }

    async fn apply_list_diff(&self, slug: &str, diff: &Diff, report: &mut SyncReport) -> Result<()> {
        let target = format!("list:{}", slug);
        self.audit("add", &target, &diff.add);
        if self.applies() {
            self.destination
                .add_list_items(slug, &diff.add)
                .await
                .with_context(|| format!("failed to add items to list {}", slug))?;
        }
        report.list_items_added += diff.add.len();

        if self.removes() {
            self.audit("remove", &target, &diff.remove);
            if self.applies() {
                self.destination
                    .remove_list_items(slug, &diff.remove)
                    .await
                    .with_context(|| format!("failed to remove items from list {}", slug))?;
            }
            report.list_items_removed += diff.remove.len();
        }
        Ok(())
    }

    async fn sync_watchlist(&self, wanted: &List, current: &List, report: &mut SyncReport) -> Result<()> {
        let diff = reconcile(&wanted.items, &current.items);
        self.audit("add", "watchlist", &diff.add);
        if self.applies() {
            self.destination
                .add_watchlist_items(&diff.add)
                .await
                .context("failed to add watchlist items")?;
        }
        report.watchlist_added += diff.add.len();

        if self.removes() {
            self.audit("remove", "watchlist", &diff.remove);
            if self.applies() {
                self.destination
                    .remove_watchlist_items(&diff.remove)
                    .await
                    .context("failed to remove watchlist items")?;
            }
            report.watchlist_removed += diff.remove.len();
        }
        Ok(())
    }

    async fn sync_ratings(&self, wanted: &[Item], current: &[Item], report: &mut SyncReport) -> Result<()> {
        let diff = reconcile(wanted, current);
        self.audit("add", "ratings", &diff.add);
        if self.applies() {
            self.destination
                .add_ratings(&diff.add)
                .await
                .context("failed to add ratings")?;
        }
        report.ratings_added += diff.add.len();

        let unrated: &[Item] = if self.removes() {
            self.audit("remove", "ratings", &diff.remove);
            if self.applies() {
                self.destination
                    .remove_ratings(&diff.remove)
                    .await
                    .context("failed to remove ratings")?;
            }
            report.ratings_removed += diff.remove.len();
            &diff.remove
        } else {
            &[]
        };

        if self.options.history {
            self.backfill_history(&diff.add, unrated, report).await?;
        }
        Ok(())
    }

    /// Add a play for newly rated items without one; drop plays of items
    /// whose rating went away. History and ratings are independent stores,
    /// so current history is checked before every change.
    async fn backfill_history(&self, rated: &[Item], unrated: &[Item], report: &mut SyncReport) -> Result<()> {
        let mut to_add = Vec::new();
        for item in rated.iter().filter(|item| item.kind.has_history()) {
            if self.history_of(item).await?.is_empty() {
                let entry = match item.rated_at {
                    Some(at) => item.identity().with_watched_at(at),
                    None => item.identity(),
                };
                to_add.push(entry);
            }
        }

        let mut to_remove = Vec::new();
        for item in unrated.iter().filter(|item| item.kind.has_history()) {
            if !self.history_of(item).await?.is_empty() {
                to_remove.push(item.identity());
            }
        }

        self.audit("add", "history", &to_add);
        self.audit("remove", "history", &to_remove);
        if self.applies() {
            self.destination
                .add_history(&to_add)
                .await
                .context("failed to add history")?;
            self.destination
                .remove_history(&to_remove)
                .await
                .context("failed to remove history")?;
        }
        report.history_added += to_add.len();
        report.history_removed += to_remove.len();
        Ok(())
    }

    async fn history_of(&self, item: &Item) -> Result<Vec<Item>> {
        self.destination
            .get_history(item.kind, &item.id)
            .await
            .with_context(|| format!("failed to read history of {}", item.id))
    }
}

/// Pair destination lists with source lists.
///
/// A destination list created by a previous run carries its source id in
/// its note and is matched on that. Only lists left over after that are
/// matched on slug, since the destination may transliterate or suffix the
/// slug it assigns. Returns `(source id, destination list)` pairs and the
/// destination lists with no counterpart.
fn pair_lists(source: &[List], destination: Vec<List>) -> (Vec<(String, List)>, Vec<List>) {
    let mut by_id: HashSet<&str> = source.iter().map(|l| l.id.as_str()).collect();
    let mut matched = Vec::new();
    let mut leftover = Vec::new();

    for list in destination {
        if by_id.remove(list.id.as_str()) {
            matched.push((list.id.clone(), list));
        } else {
            leftover.push(list);
        }
    }

    let mut by_slug: HashMap<&str, &str> = HashMap::new();
    for list in source.iter().filter(|l| by_id.contains(l.id.as_str()) && !l.slug.is_empty()) {
        by_slug.entry(list.slug.as_str()).or_insert(list.id.as_str());
    }

    let mut unmatched = Vec::new();
    for list in leftover {
        match by_slug.remove(list.slug.as_str()) {
            Some(source_id) => matched.push((source_id.to_string(), list)),
            None => unmatched.push(list),
        }
    }
    (matched, unmatched)
}

#[cfg(test)]
mod tests;
