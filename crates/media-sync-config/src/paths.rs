use anyhow::Result;
use std::path::{Path, PathBuf};

/// Container base path from `LISTSYNC_BASE_PATH`, defaulting to `/app`
pub fn container_base_path() -> PathBuf {
    std::env::var("LISTSYNC_BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app"))
}

pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("listsync");
        Ok(Self::rooted_at(base_dir))
    }

    pub fn from_docker_env() -> Self {
        Self::rooted_at(container_base_path())
    }

    /// Config file at `base`, data and logs in subdirectories
    pub fn rooted_at(base: PathBuf) -> Self {
        Self {
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
            config_dir: base,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Chromium profile, kept between runs so IMDb sessions survive
    pub fn browser_data_dir(&self) -> PathBuf {
        self.data_dir.join("browser")
    }

    pub fn log_file_name(&self) -> &'static str {
        "listsync.log"
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        // The container image creates the base directory
        let base = container_base_path();
        if base.exists() {
            return Self::from_docker_env();
        }
        Self::new().unwrap_or_else(|_| Self::from_docker_env())
    }
}
