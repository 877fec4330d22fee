//! Wiring from a loaded [`Config`] to a finished sync run.

use crate::sync::{SyncOptions, SyncOrchestrator, SyncReport};
use anyhow::{Context, Result};
use media_sync_config::{Config, ImdbAuthMode, PathManager, SyncMode};
use media_sync_sources::imdb::ExportSettings;
use media_sync_sources::{
    DestinationClient, ImdbAuth, ImdbClient, ImdbSettings, SourceClient, TraktClient, TraktCredentials,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run one complete sync as described by `config`.
///
/// The browser behind the source client is shut down whether or not the
/// run succeeds.
pub async fn run_sync(config: &Config) -> Result<SyncReport> {
    config.validate().context("invalid configuration")?;

    let paths = PathManager::default();
    let source = ImdbClient::launch(imdb_settings(config, &paths))
        .await
        .context("failed to start IMDb client")?;

    let credentials = trakt_credentials(config);
    let timeout = Duration::from_secs(config.sync.timeout_secs);
    let connect = || async move {
        let destination = TraktClient::new(&credentials, timeout)
            .await
            .context("failed to authenticate with Trakt")?;
        info!(operation = "destination_ready", destination = destination.destination_name(), "Destination authenticated");
        Ok::<_, anyhow::Error>(Arc::new(destination) as Arc<dyn DestinationClient>)
    };

    sync_with(Arc::new(source), connect, sync_options(config)).await
}

/// Sync from an already started `source`, connecting to the destination
/// only when the source has something to export. Always cleans up `source`.
pub async fn sync_with<F, Fut>(source: Arc<dyn SourceClient>, connect: F, options: SyncOptions) -> Result<SyncReport>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn DestinationClient>>>,
{
    let result = if source.can_export() {
        match connect().await {
            Ok(destination) => SyncOrchestrator::new(source.clone(), destination, options).run().await,
            Err(e) => Err(e),
        }
    } else {
        warn!(
            source = source.source_name(),
            "Source is not authenticated, nothing can be exported; skipping destination sign-in"
        );
        Ok(SyncReport {
            dry_run: options.mode == SyncMode::DryRun,
            ..SyncReport::default()
        })
    };

    if let Err(e) = source.cleanup().await {
        warn!(error = %e, "Failed to clean up source client");
    }
    result
}

pub fn trakt_credentials(config: &Config) -> TraktCredentials {
    TraktCredentials {
        client_id: config.trakt.client_id.clone(),
        client_secret: config.trakt.client_secret.clone(),
        email: config.trakt.email.clone(),
        password: config.trakt.password.clone(),
    }
}

pub fn imdb_settings(config: &Config, paths: &PathManager) -> ImdbSettings {
    let imdb = &config.imdb;
    let auth = match imdb.auth {
        ImdbAuthMode::Cookies => ImdbAuth::Cookies {
            at_main: imdb.cookie_at_main.clone(),
            ubid_main: imdb.cookie_ubid_main.clone(),
        },
        ImdbAuthMode::Credentials => ImdbAuth::Credentials {
            email: imdb.email.clone(),
            password: imdb.password.clone(),
        },
        ImdbAuthMode::None => ImdbAuth::None,
    };

    ImdbSettings {
        auth,
        lists: imdb.lists.clone(),
        headless: imdb.headless,
        export: ExportSettings {
            poll_interval: Duration::from_secs(imdb.export_poll_interval_secs),
            max_attempts: imdb.export_max_attempts,
            rows_inspected: imdb.export_rows_inspected,
        },
        browser_data_dir: paths.browser_data_dir(),
    }
}

/// Destination-only lists are only deleted when every source list is in scope
pub fn sync_options(config: &Config) -> SyncOptions {
    SyncOptions {
        mode: config.sync.mode,
        watchlist: config.sync.watchlist,
        lists: config.sync.lists,
        ratings: config.sync.ratings,
        history: config.sync.history,
        delete_unmatched_lists: config.imdb.lists.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use media_sync_models::{Item, List};
    use media_sync_sources::Result as SourceResult;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct SignedOutSource {
        cleaned_up: AtomicBool,
    }

    #[async_trait]
    impl SourceClient for SignedOutSource {
        fn source_name(&self) -> &str {
            "signed-out"
        }

        fn can_export(&self) -> bool {
            false
        }

        async fn list_ids(&self) -> SourceResult<Vec<String>> {
            unreachable!("nothing is exported without a session")
        }

        async fn fetch_list(&self, _list_id: &str) -> SourceResult<List> {
            unreachable!("nothing is exported without a session")
        }

        async fn fetch_watchlist(&self) -> SourceResult<List> {
            unreachable!("nothing is exported without a session")
        }

        async fn fetch_ratings(&self) -> SourceResult<Vec<Item>> {
            unreachable!("nothing is exported without a session")
        }

        async fn cleanup(&self) -> SourceResult<()> {
            self.cleaned_up.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_cookie_auth_and_export_settings() {
        let mut config = Config::default();
        config.imdb.cookie_at_main = "at".into();
        config.imdb.cookie_ubid_main = "ubid".into();
        config.imdb.export_poll_interval_secs = 5;
        config.imdb.export_max_attempts = 3;
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::rooted_at(dir.path().to_path_buf());

        let settings = imdb_settings(&config, &paths);

        assert_eq!(
            settings.auth,
            ImdbAuth::Cookies {
                at_main: "at".into(),
                ubid_main: "ubid".into()
            }
        );
        assert_eq!(settings.export.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.export.max_attempts, 3);
        assert_eq!(settings.browser_data_dir, dir.path().join("data").join("browser"));
    }

    #[test]
    fn test_explicit_list_selection_keeps_destination_lists() {
        let mut config = Config::default();
        assert!(sync_options(&config).delete_unmatched_lists);

        config.imdb.lists = vec!["ls001".into()];
        config.sync.mode = SyncMode::AddOnly;
        config.sync.history = false;
        let options = sync_options(&config);

        assert!(!options.delete_unmatched_lists);
        assert_eq!(options.mode, SyncMode::AddOnly);
        assert!(!options.history);
    }

    #[tokio::test]
    async fn test_signed_out_source_never_connects_to_destination() {
        let source = Arc::new(SignedOutSource::default());
        let connected = AtomicBool::new(false);
        let options = SyncOptions {
            mode: SyncMode::DryRun,
            ..SyncOptions::default()
        };

        let report = sync_with(
            source.clone(),
            || async {
                connected.store(true, Ordering::SeqCst);
                Err::<Arc<dyn DestinationClient>, _>(anyhow::anyhow!("device sign-in attempted"))
            },
            options,
        )
        .await
        .unwrap();

        assert!(!connected.load(Ordering::SeqCst));
        assert!(source.cleaned_up.load(Ordering::SeqCst));
        assert!(report.dry_run);
        assert_eq!(report.total_changes(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_client_starts() {
        let err = run_sync(&Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }
}
