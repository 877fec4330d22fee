use crate::error::{Result, SourceError};
use crate::imdb::auth::{self, Identity, ImdbAuth};
use crate::imdb::browser::BrowserSession;
use crate::imdb::export::{self, ExportResource, ExportSettings};
use crate::imdb::page::PageDriver;
use crate::imdb::parser::{self, ExportShape};
use crate::retry::{Sleeper, TokioSleeper};
use crate::traits::SourceClient;
use async_trait::async_trait;
use media_sync_models::{Item, List};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const LIST_LINK_SELECTOR: &str = r#"a[href*="/list/ls"]"#;

#[derive(Debug, Clone)]
pub struct ImdbSettings {
    pub auth: ImdbAuth,
    /// Explicit list selection; empty means every list the account owns
    pub lists: Vec<String>,
    pub headless: bool,
    pub export: ExportSettings,
    pub browser_data_dir: PathBuf,
}

pub struct ImdbClient {
    settings: ImdbSettings,
    page: Option<Arc<dyn PageDriver>>,
    // Export requests and polls navigate the shared page, one resource at a time
    page_lock: Mutex<()>,
    session: Mutex<Option<BrowserSession>>,
    identity: Option<Identity>,
    sleeper: Arc<dyn Sleeper>,
}

impl ImdbClient {
    /// Launch chromium, sign in and hydrate the account identity.
    ///
    /// With `ImdbAuth::None` no browser is started.
    pub async fn launch(settings: ImdbSettings) -> Result<Self> {
        if settings.auth == ImdbAuth::None {
            return Self::unauthenticated(settings);
        }

        let session = BrowserSession::launch(settings.headless, &settings.browser_data_dir).await?;
        let page: Arc<dyn PageDriver> = match session.open_page().await {
            Ok(page) => Arc::new(page),
            Err(e) => {
                session.shutdown().await?;
                return Err(e);
            }
        };

        match Self::sign_in(page.as_ref(), &settings, &TokioSleeper).await {
            Ok(identity) => Ok(Self {
                settings,
                page: Some(page),
                page_lock: Mutex::new(()),
                session: Mutex::new(Some(session)),
                identity,
                sleeper: Arc::new(TokioSleeper),
            }),
            Err(e) => {
                session.shutdown().await?;
                Err(e)
            }
        }
    }

    /// Drive an existing page instead of launching a browser
    pub async fn with_page(page: Arc<dyn PageDriver>, sleeper: Arc<dyn Sleeper>, settings: ImdbSettings) -> Result<Self> {
        let identity = Self::sign_in(page.as_ref(), &settings, sleeper.as_ref()).await?;
        Ok(Self {
            settings,
            page: Some(page),
            page_lock: Mutex::new(()),
            session: Mutex::new(None),
            identity,
            sleeper,
        })
    }

    fn unauthenticated(settings: ImdbSettings) -> Result<Self> {
        Ok(Self {
            settings,
            page: None,
            page_lock: Mutex::new(()),
            session: Mutex::new(None),
            identity: None,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    async fn sign_in(page: &dyn PageDriver, settings: &ImdbSettings, sleeper: &dyn Sleeper) -> Result<Option<Identity>> {
        if auth::authenticate(page, &settings.auth, sleeper).await? {
            Ok(Some(auth::hydrate(page).await?))
        } else {
            Ok(None)
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Page and identity of an authenticated session
    fn session(&self) -> Option<(&dyn PageDriver, &Identity)> {
        match (&self.page, &self.identity) {
            (Some(page), Some(identity)) => Some((page.as_ref(), identity)),
            _ => None,
        }
    }

    /// Export, download and parse one resource. Empty resources yield no items.
    async fn export_items(&self, page: &dyn PageDriver, resource: &ExportResource) -> Result<(String, Option<parser::ParsedExport>)> {
        let _guard = self.page_lock.lock().await;
        let outcome = export::export(page, resource, &self.settings.export, self.sleeper.as_ref()).await?;
        let parsed = match outcome.file {
            Some(path) => Some(parse_and_discard(&path)?),
            None => None,
        };
        Ok((outcome.label, parsed))
    }

    async fn discover_list_ids(&self, page: &dyn PageDriver, identity: &Identity) -> Result<Vec<String>> {
        let url = format!("https://www.imdb.com/user/{}/lists", identity.user_id);
        let _guard = self.page_lock.lock().await;
        page.navigate(&url).await?;
        let hrefs = page.attributes(LIST_LINK_SELECTOR, "href").await?;

        let mut ids: Vec<String> = Vec::new();
        for id in hrefs.iter().filter_map(|href| list_id_from_href(href)) {
            if id != identity.watchlist_id && !ids.contains(&id) {
                ids.push(id);
            }
        }
        info!(count = ids.len(), "Discovered IMDb lists");
        Ok(ids)
    }
}

fn parse_and_discard(path: &Path) -> Result<parser::ParsedExport> {
    let parsed = parser::parse_export_file(path)?;
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), "Could not remove export file: {}", e);
    }
    Ok(parsed)
}

/// `ls` followed by digits, taken from a `/list/ls.../` link
pub fn list_id_from_href(href: &str) -> Option<String> {
    let start = href.find("/list/ls")? + "/list/".len();
    let id: String = href[start..]
        .chars()
        .enumerate()
        .take_while(|(i, c)| if *i < 2 { true } else { c.is_ascii_digit() })
        .map(|(_, c)| c)
        .collect();
    (id.len() > 2).then_some(id)
}

/// List membership is synced without ratings
fn without_ratings(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|mut item| {
            item.rating = None;
            item.rated_at = None;
            item
        })
        .collect()
}

#[async_trait]
impl SourceClient for ImdbClient {
    fn source_name(&self) -> &str {
        "IMDb"
    }

    fn can_export(&self) -> bool {
        self.session().is_some()
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        if !self.settings.lists.is_empty() {
            return Ok(self.settings.lists.clone());
        }
        match self.session() {
            Some((page, identity)) => self.discover_list_ids(page, identity).await,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_list(&self, list_id: &str) -> Result<List> {
        let Some((page, _)) = self.session() else {
            return Ok(List::new(list_id, list_id, Vec::new()));
        };
        let (name, parsed) = self.export_items(page, &ExportResource::list(list_id)).await?;
        let items = parsed.map(|p| without_ratings(p.items)).unwrap_or_default();
        info!(list = %list_id, name = %name, count = items.len(), "Fetched IMDb list");
        Ok(List::new(list_id, name, items))
    }

    async fn fetch_watchlist(&self) -> Result<List> {
        let Some((page, identity)) = self.session() else {
            return Ok(List::watchlist("", Vec::new()));
        };
        let resource = ExportResource::watchlist(&identity.watchlist_id);
        let (_, parsed) = self.export_items(page, &resource).await?;
        let items = parsed.map(|p| without_ratings(p.items)).unwrap_or_default();
        info!(count = items.len(), "Fetched IMDb watchlist");
        Ok(List::watchlist(identity.watchlist_id.clone(), items))
    }

    async fn fetch_ratings(&self) -> Result<Vec<Item>> {
        let Some((page, identity)) = self.session() else {
            return Ok(Vec::new());
        };
        let (_, parsed) = self.export_items(page, &ExportResource::ratings(&identity.user_id)).await?;
        let items = match parsed {
            Some(p) if p.shape == ExportShape::Ratings => p.items,
            Some(p) => {
                return Err(SourceError::Parse(format!(
                    "ratings export has {:?} layout",
                    p.shape
                )))
            }
            None => Vec::new(),
        };
        info!(count = items.len(), "Fetched IMDb ratings");
        Ok(items)
    }

    async fn cleanup(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown().await?;
        } else {
            debug!("No browser session to shut down");
        }
        Ok(())
    }
}

impl Drop for ImdbClient {
    fn drop(&mut self) {
        if self.session.get_mut().is_some() {
            warn!("IMDb client dropped without cleanup, browser session left running");
        }
    }
}
