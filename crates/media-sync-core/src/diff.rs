// Reconciliation between a source snapshot and a destination snapshot

use media_sync_models::Item;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Destination-side mutation converging one list onto its source.
///
/// `add` doubles as the rating update: re-adding a rated item overwrites the
/// destination's rating. An id never appears in both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub add: Vec<Item>,
    pub remove: Vec<Item>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len()
    }

    pub fn add_ids(&self) -> Vec<&str> {
        self.add.iter().map(|item| item.id.as_str()).collect()
    }

    pub fn remove_ids(&self) -> Vec<&str> {
        self.remove.iter().map(|item| item.id.as_str()).collect()
    }
}

/// Compute the diff turning `destination` into `source`.
///
/// Items are matched on canonical id only. Duplicate ids on either side
/// collapse onto their first occurrence.
pub fn reconcile(source: &[Item], destination: &[Item]) -> Diff {
    let mut by_id: HashMap<&str, &Item> = HashMap::with_capacity(destination.len());
    for item in destination {
        by_id.entry(item.id.as_str()).or_insert(item);
    }

    let mut diff = Diff::default();
    let mut source_ids: HashSet<&str> = HashSet::with_capacity(source.len());
    let mut rating_updates = 0;

    for item in source {
        if !source_ids.insert(item.id.as_str()) {
            continue;
        }
        match by_id.get(item.id.as_str()) {
            None => diff.add.push(item.clone()),
            Some(existing) if existing.rating != item.rating => {
                rating_updates += 1;
                diff.add.push(item.clone());
            }
            Some(_) => {}
        }
    }

    let mut removed: HashSet<&str> = HashSet::new();
    for item in destination {
        if !source_ids.contains(item.id.as_str()) && removed.insert(item.id.as_str()) {
            diff.remove.push(item.clone());
        }
    }

    debug!(
        source = source.len(),
        destination = destination.len(),
        add = diff.add.len(),
        rating_updates,
        remove = diff.remove.len(),
        "Reconciled snapshots"
    );
    diff
}
