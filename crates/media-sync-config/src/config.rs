use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const MASK: &str = "********";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub imdb: ImdbConfig,
    #[serde(default)]
    pub trakt: TraktConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImdbAuthMode {
    #[default]
    Cookies,
    Credentials,
    /// Public-only: nothing is exported from IMDb
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImdbConfig {
    #[serde(default)]
    pub auth: ImdbAuthMode,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub cookie_at_main: String,
    #[serde(default)]
    pub cookie_ubid_main: String,
    /// Explicit list ids (`ls...`). Empty syncs every list of the account.
    #[serde(default)]
    pub lists: Vec<String>,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_export_poll_interval_secs")]
    pub export_poll_interval_secs: u64,
    #[serde(default = "default_export_max_attempts")]
    pub export_max_attempts: u32,
    #[serde(default = "default_export_rows_inspected")]
    pub export_rows_inspected: usize,
}

impl Default for ImdbConfig {
    fn default() -> Self {
        Self {
            auth: ImdbAuthMode::default(),
            email: String::new(),
            password: String::new(),
            cookie_at_main: String::new(),
            cookie_ubid_main: String::new(),
            lists: Vec::new(),
            headless: default_true(),
            export_poll_interval_secs: default_export_poll_interval_secs(),
            export_max_attempts: default_export_max_attempts(),
            export_rows_inspected: default_export_rows_inspected(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraktConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Adds, removals, list creation and deletion
    #[default]
    Full,
    /// Adds and list creation only
    AddOnly,
    /// Read and reconcile, log the plan, mutate nothing
    DryRun,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::AddOnly => "add-only",
            SyncMode::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "add-only" | "add_only" => Ok(SyncMode::AddOnly),
            "dry-run" | "dry_run" => Ok(SyncMode::DryRun),
            other => bail!("unknown sync mode '{}' (expected full, add-only or dry-run)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default = "default_true")]
    pub watchlist: bool,
    #[serde(default = "default_true")]
    pub lists: bool,
    #[serde(default = "default_true")]
    pub ratings: bool,
    /// Backfill watch history for rating changes
    #[serde(default = "default_true")]
    pub history: bool,
    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            watchlist: default_true(),
            lists: default_true(),
            ratings: default_true(),
            history: default_true(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_export_poll_interval_secs() -> u64 {
    30
}

fn default_export_max_attempts() -> u32 {
    30
}

fn default_export_rows_inspected() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn is_list_id(id: &str) -> bool {
    id.strip_prefix("ls")
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        MASK.to_string()
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// File contents (defaults when the file is absent) plus environment overrides
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `LISTSYNC_*` overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let secrets: [(&str, &mut String); 8] = [
            ("LISTSYNC_IMDB_EMAIL", &mut self.imdb.email),
            ("LISTSYNC_IMDB_PASSWORD", &mut self.imdb.password),
            ("LISTSYNC_IMDB_COOKIE_AT_MAIN", &mut self.imdb.cookie_at_main),
            ("LISTSYNC_IMDB_COOKIE_UBID_MAIN", &mut self.imdb.cookie_ubid_main),
            ("LISTSYNC_TRAKT_CLIENT_ID", &mut self.trakt.client_id),
            ("LISTSYNC_TRAKT_CLIENT_SECRET", &mut self.trakt.client_secret),
            ("LISTSYNC_TRAKT_EMAIL", &mut self.trakt.email),
            ("LISTSYNC_TRAKT_PASSWORD", &mut self.trakt.password),
        ];
        for (key, field) in secrets {
            if let Some(value) = get(key) {
                *field = value;
            }
        }

        if let Some(mode) = get("LISTSYNC_SYNC_MODE") {
            self.sync.mode = mode.parse().context("invalid LISTSYNC_SYNC_MODE")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trakt.client_id.is_empty() || self.trakt.client_secret.is_empty() {
            bail!("trakt.client_id and trakt.client_secret are required");
        }
        if self.trakt.email.is_empty() || self.trakt.password.is_empty() {
            bail!("trakt.email and trakt.password are required to authorize the device");
        }

        match self.imdb.auth {
            ImdbAuthMode::Credentials if self.imdb.email.is_empty() || self.imdb.password.is_empty() => {
                bail!("imdb.auth = \"credentials\" requires imdb.email and imdb.password");
            }
            ImdbAuthMode::Cookies if self.imdb.cookie_at_main.is_empty() || self.imdb.cookie_ubid_main.is_empty() => {
                bail!("imdb.auth = \"cookies\" requires imdb.cookie_at_main and imdb.cookie_ubid_main");
            }
            _ => {}
        }

        if let Some(bad) = self.imdb.lists.iter().find(|id| !is_list_id(id)) {
            bail!("invalid IMDb list id '{}' (expected ls followed by digits)", bad);
        }
        if self.imdb.export_max_attempts == 0 {
            bail!("imdb.export_max_attempts must be at least 1");
        }
        if self.imdb.export_rows_inspected == 0 {
            bail!("imdb.export_rows_inspected must be at least 1");
        }
        Ok(())
    }

    /// Copy with every secret replaced by a fixed mask
    pub fn masked(&self) -> Config {
        let mut config = self.clone();
        config.imdb.password = mask(&config.imdb.password);
        config.imdb.cookie_at_main = mask(&config.imdb.cookie_at_main);
        config.imdb.cookie_ubid_main = mask(&config.imdb.cookie_ubid_main);
        config.trakt.client_secret = mask(&config.trakt.client_secret);
        config.trakt.password = mask(&config.trakt.password);
        config
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
