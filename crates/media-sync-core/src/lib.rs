pub mod diff;
pub mod fetch;
pub mod runner;
pub mod sync;

pub use diff::{reconcile, Diff};
pub use fetch::{fetch_all, FetchError, FetchOutcome};
pub use runner::{run_sync, sync_with};
pub use sync::{Snapshot, SyncOptions, SyncOrchestrator, SyncReport};
