pub mod config;
pub mod paths;

pub use config::{Config, ImdbAuthMode, ImdbConfig, SyncConfig, SyncMode, TraktConfig};
pub use paths::{container_base_path, PathManager};
