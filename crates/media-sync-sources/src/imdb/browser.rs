//! Chromium-backed [`PageDriver`].

use crate::error::{Result, SourceError};
use crate::imdb::download;
use crate::imdb::page::PageDriver;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{SetDownloadBehaviorBehavior, SetDownloadBehaviorParams};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use which::which;

const IMDB_COOKIE_DOMAIN: &str = ".imdb.com";
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const DOWNLOAD_CHECKS: u32 = 30;
const DOWNLOAD_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const MAX_HANDLER_ERRORS: usize = 10;

fn browser_err(e: impl std::fmt::Display) -> SourceError {
    SourceError::Browser(e.to_string())
}

/// A launched chromium process plus the task pumping its CDP events
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    download_dir: PathBuf,
}

impl BrowserSession {
    pub async fn launch(headless: bool, user_data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(user_data_dir)?;
        let download_dir = download::export_dir()?;

        let executable = match find_system_chromium() {
            Some(path) => path,
            None => fetch_chromium(user_data_dir).await?,
        };
        let config = build_browser_config(&executable, headless, user_data_dir, &download_dir)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SourceError::Browser(format!("failed to launch chromium: {}", e)))?;

        let handler = tokio::spawn(async move {
            let mut errors = 0;
            while let Some(event) = handler.next().await {
                match event {
                    Ok(_) => errors = 0,
                    Err(e) => {
                        errors += 1;
                        warn!(errors, "Browser handler error: {:?}", e);
                        if errors >= MAX_HANDLER_ERRORS {
                            error!("Browser handler giving up, chromium has likely crashed");
                            break;
                        }
                    }
                }
            }
        });

        info!(executable = %executable.display(), headless, "Chromium launched");
        Ok(Self {
            browser,
            handler,
            download_dir,
        })
    }

    pub async fn open_page(&self) -> Result<ChromiumPage> {
        let page = self.browser.new_page("about:blank").await.map_err(browser_err)?;
        page.execute(SetDownloadBehaviorParams {
            behavior: SetDownloadBehaviorBehavior::Allow,
            download_path: Some(self.download_dir.to_string_lossy().to_string()),
            browser_context_id: None,
            events_enabled: None,
        })
        .await
        .map_err(|e| SourceError::Browser(format!("failed to configure downloads: {}", e)))?;
        debug!(dir = %self.download_dir.display(), "Download directory configured");

        Ok(ChromiumPage {
            page,
            download_dir: self.download_dir.clone(),
        })
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close chromium cleanly: {}", e);
        }
        let _ = timeout(Duration::from_secs(2), &mut self.handler).await;
        if let Err(e) = std::fs::remove_dir_all(&self.download_dir) {
            warn!(dir = %self.download_dir.display(), "Failed to remove export directory: {}", e);
        }
        info!("Chromium shut down");
        Ok(())
    }
}

fn is_docker() -> bool {
    Path::new("/.dockerenv").exists()
        || std::fs::read_to_string("/proc/self/cgroup")
            .map(|s| s.contains("docker") || s.contains("containerd"))
            .unwrap_or(false)
}

fn find_system_chromium() -> Option<PathBuf> {
    let candidates = [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/local/bin/chromium",
        "/opt/chromium/chromium",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/opt/homebrew/bin/chromium",
    ];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .or_else(|| which("chromium").or_else(|_| which("chromium-browser")).ok())
}

async fn fetch_chromium(user_data_dir: &Path) -> Result<PathBuf> {
    info!("No system Chromium found, downloading via BrowserFetcher");
    let target = user_data_dir
        .parent()
        .unwrap_or(user_data_dir)
        .join("chromium_downloads");
    tokio::fs::create_dir_all(&target).await?;

    let options = BrowserFetcherOptions::builder()
        .with_path(&target)
        .build()
        .map_err(|e| SourceError::Browser(format!("invalid fetcher options: {}", e)))?;
    let revision = BrowserFetcher::new(options)
        .fetch()
        .await
        .map_err(|e| SourceError::Browser(format!("failed to fetch chromium: {}", e)))?;
    Ok(revision.executable_path)
}

fn build_browser_config(
    executable: &Path,
    headless: bool,
    user_data_dir: &Path,
    download_dir: &Path,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder().chrome_executable(executable);
    if !headless && !is_docker() {
        builder = builder.with_head();
    }
    if cfg!(target_os = "linux") || is_docker() {
        builder = builder.arg("--no-sandbox").arg("--disable-dev-shm-usage");
    }
    builder
        .arg("--disable-extensions")
        .arg("--disable-notifications")
        .arg("--disable-features=WebAuthentication")
        .arg("--disable-sync")
        .arg("--log-level=3")
        .arg(format!("--download-directory={}", download_dir.display()))
        .arg(format!("--user-data-dir={}", user_data_dir.display()))
        .arg("--window-size=1280,900")
        .build()
        .map_err(|e| SourceError::Browser(format!("invalid browser config: {}", e)))
}

pub struct ChromiumPage {
    page: Page,
    download_dir: PathBuf,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "Navigating");
        match timeout(NAVIGATION_TIMEOUT, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SourceError::Browser(format!("navigation to {} failed: {}", url, e))),
            Err(_) => Err(SourceError::Browser(format!(
                "navigation to {} timed out after {}s",
                url,
                NAVIGATION_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element
                .inner_text()
                .await
                .map_err(browser_err)?
                .map(|t| t.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(_) => return Ok(Vec::new()),
        };
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            let text = element.inner_text().await.map_err(browser_err)?;
            texts.push(text.unwrap_or_default().trim().to_string());
        }
        Ok(texts)
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => element.attribute(name).await.map_err(browser_err),
            Err(_) => Ok(None),
        }
    }

    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<String>> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(_) => return Ok(Vec::new()),
        };
        let mut values = Vec::new();
        for element in elements {
            if let Some(value) = element.attribute(name).await.map_err(browser_err)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| SourceError::scrape(selector, "current page"))?;
        element.scroll_into_view().await.map_err(browser_err)?;
        element.click().await.map_err(browser_err)?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| SourceError::scrape(selector, "current page"))?;
        element.click().await.map_err(browser_err)?;
        element.type_str(value).await.map_err(browser_err)?;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[(String, String)]) -> Result<()> {
        let params = cookies
            .iter()
            .map(|(name, value)| {
                CookieParam::builder()
                    .name(name.clone())
                    .value(value.clone())
                    .domain(IMDB_COOKIE_DOMAIN)
                    .path("/")
                    .build()
                    .map_err(SourceError::Browser)
            })
            .collect::<Result<Vec<_>>>()?;
        self.page.set_cookies(params).await.map_err(browser_err)?;
        Ok(())
    }

    async fn download(&self, selector: &str) -> Result<PathBuf> {
        let before = download::csv_files(&self.download_dir)?;
        self.click(selector).await?;
        download::wait_for_new_csv(&self.download_dir, &before, DOWNLOAD_CHECKS, DOWNLOAD_CHECK_INTERVAL).await
    }
}
