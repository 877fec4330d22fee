use super::*;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use media_sync_models::ItemKind;
use media_sync_sources::{MutationSummary, Result as SourceResult, SourceError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

fn movie(id: &str) -> Item {
    Item::new(id, ItemKind::Movie)
}

fn rated(id: &str, rating: u8) -> Item {
    movie(id).with_rating(rating, None)
}

#[derive(Default)]
struct FakeSource {
    exportable: bool,
    lists: Vec<List>,
    private: Vec<String>,
    watchlist: Vec<Item>,
    ratings: Vec<Item>,
    broken_ratings: bool,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            exportable: true,
            ..Self::default()
        }
    }

    fn list(mut self, id: &str, name: &str, items: Vec<Item>) -> Self {
        self.lists.push(List::new(id, name, items));
        self
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    fn source_name(&self) -> &str {
        "fake-source"
    }

    fn can_export(&self) -> bool {
        self.exportable
    }

    async fn list_ids(&self) -> SourceResult<Vec<String>> {
        Ok(self
            .lists
            .iter()
            .map(|l| l.id.clone())
            .chain(self.private.iter().cloned())
            .collect())
    }

    async fn fetch_list(&self, list_id: &str) -> SourceResult<List> {
        self.lists
            .iter()
            .find(|l| l.id == list_id)
            .cloned()
            .ok_or_else(|| SourceError::ResourceUnavailable(list_id.to_string()))
    }

    async fn fetch_watchlist(&self) -> SourceResult<List> {
        Ok(List::watchlist("ls-watch", self.watchlist.clone()))
    }

    async fn fetch_ratings(&self) -> SourceResult<Vec<Item>> {
        if self.broken_ratings {
            return Err(SourceError::Parse("unrecognized export header".into()));
        }
        Ok(self.ratings.clone())
    }
}

#[derive(Default)]
struct DestinationState {
    lists: BTreeMap<String, List>,
    notes: HashMap<String, String>,
    watchlist: Vec<Item>,
    ratings: Vec<Item>,
    history: HashMap<String, Vec<Item>>,
    /// Slugs still listed but gone by the time they are loaded
    vanished: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Default)]
struct FakeDestination {
    state: Mutex<DestinationState>,
}

fn upsert(target: &mut Vec<Item>, items: &[Item]) {
    for item in items {
        match target.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => target.push(item.clone()),
        }
    }
}

fn remove(target: &mut Vec<Item>, items: &[Item]) {
    target.retain(|existing| !items.iter().any(|item| item.id == existing.id));
}

fn call(operation: &str, items: &[Item]) -> String {
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    format!("{} {}", operation, ids.join(","))
}

impl FakeDestination {
    fn with_list(self, name: &str, items: Vec<Item>) -> Self {
        let list = List::new(format!("{}", self.state.lock().unwrap().lists.len() + 1), name, items);
        self.state.lock().unwrap().lists.insert(list.slug.clone(), list);
        self
    }

    /// A list created by an earlier run, carrying its source id and the
    /// slug the destination assigned
    fn with_synced_list(self, source_id: &str, name: &str, slug: &str, items: Vec<Item>) -> Self {
        let mut list = List::new(source_id, name, items);
        list.slug = slug.to_string();
        self.state.lock().unwrap().lists.insert(slug.to_string(), list);
        self
    }

    fn vanishing(self, slug: &str) -> Self {
        self.state.lock().unwrap().vanished.insert(slug.to_string());
        self
    }

    fn with_ratings(self, items: Vec<Item>) -> Self {
        self.state.lock().unwrap().ratings = items;
        self
    }

    fn with_history(self, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .history
            .insert(id.to_string(), vec![movie(id)]);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn list_items(&self, slug: &str) -> Vec<Item> {
        self.state.lock().unwrap().lists[slug].items.clone()
    }

    /// Mutations with nothing to send are not requests
    fn record(&self, operation: &str, items: &[Item]) -> bool {
        if items.is_empty() {
            return false;
        }
        self.state.lock().unwrap().calls.push(call(operation, items));
        true
    }
}

#[async_trait]
impl DestinationClient for FakeDestination {
    fn destination_name(&self) -> &str {
        "fake-destination"
    }

    async fn get_watchlist(&self) -> SourceResult<List> {
        Ok(List::watchlist("", self.state.lock().unwrap().watchlist.clone()))
    }

    async fn add_watchlist_items(&self, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record("add_watchlist", items) {
            upsert(&mut self.state.lock().unwrap().watchlist, items);
        }
        Ok(MutationSummary::default())
    }

    async fn remove_watchlist_items(&self, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record("remove_watchlist", items) {
            remove(&mut self.state.lock().unwrap().watchlist, items);
        }
        Ok(MutationSummary::default())
    }

    async fn get_lists(&self) -> SourceResult<Vec<List>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .values()
            .map(|l| List {
                items: Vec::new(),
                ..l.clone()
            })
            .collect())
    }

    async fn get_list(&self, slug: &str) -> SourceResult<List> {
        let state = self.state.lock().unwrap();
        if state.vanished.contains(slug) {
            return Err(SourceError::ListNotFound(slug.to_string()));
        }
        state
            .lists
            .get(slug)
            .cloned()
            .ok_or_else(|| SourceError::ListNotFound(slug.to_string()))
    }

    async fn create_list(&self, name: &str, source_id: &str) -> SourceResult<List> {
        let mut state = self.state.lock().unwrap();
        let list = List::new(source_id, name, Vec::new());
        state.vanished.remove(&list.slug);
        state.calls.push(format!("create_list {}", list.slug));
        state.notes.insert(list.slug.clone(), format!("listsync:imdb:{}", source_id));
        state.lists.insert(list.slug.clone(), list.clone());
        Ok(list)
    }

    async fn delete_list(&self, slug: &str) -> SourceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete_list {}", slug));
        state.lists.remove(slug);
        Ok(())
    }

    async fn add_list_items(&self, slug: &str, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record(&format!("add_list_items {}", slug), items) {
            let mut state = self.state.lock().unwrap();
            let list = state
                .lists
                .get_mut(slug)
                .ok_or_else(|| SourceError::ListNotFound(slug.to_string()))?;
            upsert(&mut list.items, items);
        }
        Ok(MutationSummary::default())
    }

    async fn remove_list_items(&self, slug: &str, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record(&format!("remove_list_items {}", slug), items) {
            let mut state = self.state.lock().unwrap();
            let list = state
                .lists
                .get_mut(slug)
                .ok_or_else(|| SourceError::ListNotFound(slug.to_string()))?;
            remove(&mut list.items, items);
        }
        Ok(MutationSummary::default())
    }

    async fn get_ratings(&self) -> SourceResult<Vec<Item>> {
        Ok(self.state.lock().unwrap().ratings.clone())
    }

    async fn add_ratings(&self, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record("add_ratings", items) {
            upsert(&mut self.state.lock().unwrap().ratings, items);
        }
        Ok(MutationSummary::default())
    }

    async fn remove_ratings(&self, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record("remove_ratings", items) {
            remove(&mut self.state.lock().unwrap().ratings, items);
        }
        Ok(MutationSummary::default())
    }

    async fn get_history(&self, _kind: ItemKind, id: &str) -> SourceResult<Vec<Item>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .history
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_history(&self, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record("add_history", items) {
            let mut state = self.state.lock().unwrap();
            for item in items {
                state.history.entry(item.id.clone()).or_default().push(item.clone());
            }
        }
        Ok(MutationSummary::default())
    }

    async fn remove_history(&self, items: &[Item]) -> SourceResult<MutationSummary> {
        if self.record("remove_history", items) {
            let mut state = self.state.lock().unwrap();
            for item in items {
                state.history.remove(&item.id);
            }
        }
        Ok(MutationSummary::default())
    }
}

fn orchestrator(source: FakeSource, destination: Arc<FakeDestination>, options: SyncOptions) -> SyncOrchestrator {
    SyncOrchestrator::new(Arc::new(source), destination, options)
}

fn lists_and_watchlist() -> SyncOptions {
    SyncOptions {
        ratings: false,
        history: false,
        ..SyncOptions::default()
    }
}

#[tokio::test]
async fn test_list_and_watchlist_converge() {
    let mut source = FakeSource::new().list("ls1", "L1", vec![rated("tt1", 8)]);
    source.watchlist = vec![movie("tt2")];
    let destination = Arc::new(FakeDestination::default().with_list("L1", vec![rated("tt1", 5), movie("tt3")]));

    let report = orchestrator(source, destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.calls(),
        vec![
            "add_list_items l1 tt1".to_string(),
            "remove_list_items l1 tt3".to_string(),
            "add_watchlist tt2".to_string(),
        ]
    );
    assert_eq!(destination.list_items("l1"), vec![rated("tt1", 8)]);
    assert_eq!(report.lists_created, 0);
    assert_eq!(report.list_items_added, 1);
    assert_eq!(report.list_items_removed, 1);
    assert_eq!(report.watchlist_added, 1);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let destination = Arc::new(FakeDestination::default().with_list("L1", vec![movie("tt3")]));
    let make_source = || {
        let mut source = FakeSource::new().list("ls1", "L1", vec![movie("tt1")]);
        source.watchlist = vec![movie("tt2")];
        source
    };

    orchestrator(make_source(), destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();
    let calls_after_first = destination.calls().len();

    let report = orchestrator(make_source(), destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(report.total_changes(), 0);
    assert_eq!(destination.calls().len(), calls_after_first);
}

#[tokio::test]
async fn test_missing_destination_list_is_created_before_adding() {
    let source = FakeSource::new().list("ls42", "Sci-Fi & Fantasy!!", vec![movie("tt1")]);
    let destination = Arc::new(FakeDestination::default());

    let report = orchestrator(source, destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.calls(),
        vec![
            "create_list sci-fi-fantasy".to_string(),
            "add_list_items sci-fi-fantasy tt1".to_string(),
        ]
    );
    assert_eq!(
        destination.state.lock().unwrap().notes["sci-fi-fantasy"],
        "listsync:imdb:ls42"
    );
    assert_eq!(report.lists_created, 1);
}

#[tokio::test]
async fn test_destination_only_lists_are_deleted_in_full_mode() {
    let source = FakeSource::new().list("ls1", "Keep", vec![]);
    let destination = Arc::new(
        FakeDestination::default()
            .with_list("Keep", vec![])
            .with_list("Stale", vec![movie("tt9")]),
    );

    let report = orchestrator(source, destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(destination.calls(), vec!["delete_list stale".to_string()]);
    assert_eq!(report.lists_deleted, 1);
}

#[tokio::test]
async fn test_destination_only_lists_survive_explicit_selection() {
    let source = FakeSource::new().list("ls1", "Keep", vec![]);
    let destination = Arc::new(FakeDestination::default().with_list("Other", vec![movie("tt9")]));
    let options = SyncOptions {
        delete_unmatched_lists: false,
        ..lists_and_watchlist()
    };

    let report = orchestrator(source, destination.clone(), options).run().await.unwrap();

    assert!(!destination.calls().iter().any(|c| c.starts_with("delete_list")));
    assert_eq!(report.lists_deleted, 0);
}

#[tokio::test]
async fn test_private_source_list_is_skipped_and_blocks_deletion() {
    let mut source = FakeSource::new().list("ls1", "Public", vec![movie("tt1")]);
    source.private = vec!["ls2".to_string()];
    let destination = Arc::new(FakeDestination::default().with_list("Private", vec![movie("tt5")]));

    let report = orchestrator(source, destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(report.skipped_lists, vec!["ls2".to_string()]);
    assert_eq!(report.lists_deleted, 0);
    assert!(destination.state.lock().unwrap().lists.contains_key("private"));
}

#[tokio::test]
async fn test_add_only_never_removes() {
    let mut source = FakeSource::new().list("ls1", "L1", vec![movie("tt1")]);
    source.watchlist = vec![];
    let destination = Arc::new(
        FakeDestination::default()
            .with_list("L1", vec![movie("tt3")])
            .with_list("Stale", vec![]),
    );
    destination.state.lock().unwrap().watchlist = vec![movie("tt7")];
    let options = SyncOptions {
        mode: SyncMode::AddOnly,
        ..lists_and_watchlist()
    };

    let report = orchestrator(source, destination.clone(), options).run().await.unwrap();

    assert_eq!(destination.calls(), vec!["add_list_items l1 tt1".to_string()]);
    assert_eq!(report.list_items_removed, 0);
    assert_eq!(report.watchlist_removed, 0);
    assert_eq!(report.lists_deleted, 0);
}

#[tokio::test]
async fn test_dry_run_plans_without_mutating() {
    let mut source = FakeSource::new()
        .list("ls1", "L1", vec![rated("tt1", 8)])
        .list("ls2", "New List", vec![movie("tt4")]);
    source.watchlist = vec![movie("tt2")];
    let destination = Arc::new(FakeDestination::default().with_list("L1", vec![movie("tt3")]));
    let options = SyncOptions {
        mode: SyncMode::DryRun,
        ..lists_and_watchlist()
    };

    let report = orchestrator(source, destination.clone(), options).run().await.unwrap();

    assert!(destination.calls().is_empty());
    assert!(report.dry_run);
    assert_eq!(report.lists_created, 1);
    assert_eq!(report.list_items_added, 2);
    assert_eq!(report.list_items_removed, 1);
    assert_eq!(report.watchlist_added, 1);
}

#[tokio::test]
async fn test_ratings_drive_history_backfill() {
    let rated_at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut source = FakeSource::new();
    source.ratings = vec![
        movie("tt1").with_rating(8, Some(rated_at)),
        Item::new("tt2", ItemKind::Show).with_rating(7, None),
        rated("tt4", 6),
        rated("tt5", 9),
    ];
    let destination = Arc::new(
        FakeDestination::default()
            .with_ratings(vec![rated("tt3", 5), rated("tt5", 9)])
            .with_history("tt3")
            .with_history("tt4"),
    );
    let options = SyncOptions {
        lists: false,
        watchlist: false,
        ..SyncOptions::default()
    };

    let report = orchestrator(source, destination.clone(), options).run().await.unwrap();

    assert_eq!(
        destination.calls(),
        vec![
            "add_ratings tt1,tt2,tt4".to_string(),
            "remove_ratings tt3".to_string(),
            "add_history tt1".to_string(),
            "remove_history tt3".to_string(),
        ]
    );
    let history = destination.state.lock().unwrap().history["tt1"].clone();
    assert_eq!(history[0].watched_at, Some(rated_at));
    assert_eq!(report.ratings_added, 3);
    assert_eq!(report.ratings_removed, 1);
    assert_eq!(report.history_added, 1);
    assert_eq!(report.history_removed, 1);
}

#[tokio::test]
async fn test_history_toggle_skips_backfill() {
    let mut source = FakeSource::new();
    source.ratings = vec![rated("tt1", 8)];
    let destination = Arc::new(FakeDestination::default());
    let options = SyncOptions {
        lists: false,
        watchlist: false,
        history: false,
        ..SyncOptions::default()
    };

    let report = orchestrator(source, destination.clone(), options).run().await.unwrap();

    assert_eq!(destination.calls(), vec!["add_ratings tt1".to_string()]);
    assert_eq!(report.history_added, 0);
}

#[tokio::test]
async fn test_hydration_failure_aborts_before_mutation() {
    let mut source = FakeSource::new().list("ls1", "L1", vec![movie("tt1")]);
    source.broken_ratings = true;
    let destination = Arc::new(FakeDestination::default());

    let err = orchestrator(source, destination.clone(), SyncOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("ratings"));
    assert!(destination.calls().is_empty());
}

#[tokio::test]
async fn test_unauthenticated_source_skips_everything() {
    let mut source = FakeSource::new().list("ls1", "L1", vec![movie("tt1")]);
    source.exportable = false;
    let destination = Arc::new(FakeDestination::default().with_list("Stale", vec![]));

    let report = orchestrator(source, destination.clone(), SyncOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.total_changes(), 0);
    assert!(destination.calls().is_empty());
}

#[tokio::test]
async fn test_synced_list_is_matched_by_source_id_not_slug() {
    let source = FakeSource::new().list("ls1", "Amélie", vec![movie("tt1")]);
    let destination = Arc::new(
        FakeDestination::default()
            .with_synced_list("ls1", "Amélie", "amelie", vec![])
            .with_synced_list("ls7", "Old", "old", vec![]),
    );

    let report = orchestrator(source, destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.calls(),
        vec!["add_list_items amelie tt1".to_string(), "delete_list old".to_string()]
    );
    assert_eq!(report.lists_created, 0);
    assert_eq!(report.lists_deleted, 1);
    assert_eq!(destination.list_items("amelie"), vec![movie("tt1")]);
}

#[tokio::test]
async fn test_vanished_destination_list_is_recreated() {
    let source = FakeSource::new().list("ls1", "L1", vec![movie("tt1")]);
    let destination = Arc::new(
        FakeDestination::default()
            .with_synced_list("ls1", "L1", "l1", vec![movie("tt0")])
            .vanishing("l1"),
    );

    let report = orchestrator(source, destination.clone(), lists_and_watchlist())
        .run()
        .await
        .unwrap();

    assert_eq!(
        destination.calls(),
        vec!["create_list l1".to_string(), "add_list_items l1 tt1".to_string()]
    );
    assert_eq!(report.lists_created, 1);
    assert_eq!(report.lists_deleted, 0);
}

#[test]
fn test_pairing_prefers_source_id_then_slug() {
    let source = vec![
        List::new("ls1", "Amélie", vec![]),
        List::new("ls2", "Favourites", vec![]),
    ];
    let mut renamed = List::new("ls1", "Amélie", vec![]);
    renamed.slug = "amelie".to_string();
    let destination = vec![
        List::new("ls9", "Amélie", vec![]),
        renamed,
        List::new("101", "Favourites", vec![]),
        List::new("102", "Other", vec![]),
    ];

    let (matched, unmatched) = pair_lists(&source, destination);

    let pairs: Vec<(&str, &str)> = matched
        .iter()
        .map(|(id, list)| (id.as_str(), list.slug.as_str()))
        .collect();
    assert_eq!(pairs, vec![("ls1", "amelie"), ("ls2", "favourites")]);
    let leftover: Vec<&str> = unmatched.iter().map(|l| l.slug.as_str()).collect();
    assert_eq!(leftover, vec!["amlie", "other"]);
}
