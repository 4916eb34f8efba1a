//! Application configuration
//!
//! Configuration is a JSON document split into sections. Every field has a
//! default, so partial files are valid. Environment variables (optionally from a
//! `.env` file) override the API key and download directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{FileOperation, Result, WorkshopError};

pub const DEFAULT_USER_AGENT: &str = "Steam Workshop Downloader/1.0";
pub const DEFAULT_API_BASE: &str = "https://api.steampowered.com";
pub const DEFAULT_COMMUNITY_BASE: &str = "https://steamcommunity.com";
pub const DEFAULT_FALLBACK_DOWNLOAD_BASE: &str = "https://steamworkshopdownloader.io/download";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub downloads: DownloadSettings,
    pub cache: CacheSettings,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    pub language: String,
    pub check_updates_on_start: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            check_updates_on_start: true,
        }
    }
}

/// Settings for the download manager and its HTTP transfers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadSettings {
    pub default_directory: PathBuf,
    pub max_concurrent_downloads: usize,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
    /// Initial delay between retries (doubles each retry)
    pub retry_delay_ms: u64,
    /// Maximum retry delay cap
    pub max_retry_delay_ms: u64,
    pub allow_resume: bool,
    /// Unpack finished .zip/.tar/.tar.gz downloads next to the archive
    pub extract_archives: bool,
    /// Used when an item has no direct `file_url`
    pub fallback_download_base: String,
    pub user_agent: String,
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Calculate retry delay for the given attempt using exponential backoff
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.min(32) as u32);
        let delay = self.retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_directory: default_download_dir(),
            max_concurrent_downloads: 3,
            chunk_size: 8192,
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            allow_resume: true,
            extract_archives: false,
            fallback_download_base: DEFAULT_FALLBACK_DOWNLOAD_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// TTLs are in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub ttl_games: u64,
    pub ttl_workshop: u64,
    pub ttl_search: u64,
    pub ttl_images: u64,
    pub image_max_age_days: u64,
    pub max_cache_size_mb: u64,
    pub cleanup_interval_secs: u64,
}

impl CacheSettings {
    pub fn data_dir(&self) -> PathBuf {
        self.directory.join("data")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.directory.join("images")
    }

    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_images)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            ttl_games: 3600,
            ttl_workshop: 1800,
            ttl_search: 900,
            ttl_images: 86_400,
            image_max_age_days: 7,
            max_cache_size_mb: 500,
            cleanup_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub community_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Cap on the pause between retried API calls
    pub max_retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            community_url: DEFAULT_COMMUNITY_BASE.to_string(),
            api_key: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 10_000,
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Steam Workshop")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("cache"))
        .join("steam-workshop")
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("steam-workshop")
        .join("config.json")
}

/// Default location of the remembered login session
pub fn default_session_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("steam-workshop")
        .join("session.json")
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| WorkshopError::fs(path, FileOperation::Read, e))?;
        let config: AppConfig = serde_json::from_str(&text).map_err(|e| WorkshopError::Json {
            context: format!("config file {}", path.display()),
            source: e,
        })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, apply environment overrides and validate
    pub fn load_with_env(path: &Path) -> Result<Self> {
        dotenv::dotenv().ok(); // Ignore error if .env not present
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WorkshopError::fs(parent, FileOperation::CreateDir, e))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| WorkshopError::Json {
            context: "serializing config".to_string(),
            source: e,
        })?;
        std::fs::write(path, text).map_err(|e| WorkshopError::fs(path, FileOperation::Write, e))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("STEAM_API_KEY") {
            if !key.trim().is_empty() {
                self.api.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(dir) = std::env::var("WORKSHOP_DOWNLOAD_DIR") {
            if !dir.trim().is_empty() {
                self.downloads.default_directory = PathBuf::from(dir);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.downloads.max_concurrent_downloads == 0 {
            return Err(WorkshopError::Configuration {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                field: Some("downloads.max_concurrent_downloads".to_string()),
                suggestion: Some("Use a value between 1 and 10".to_string()),
            });
        }
        if self.downloads.timeout_secs == 0 || self.api.timeout_secs == 0 {
            return Err(WorkshopError::Configuration {
                message: "timeouts must be greater than zero".to_string(),
                field: Some("timeout_secs".to_string()),
                suggestion: Some("The default is 30 seconds".to_string()),
            });
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(WorkshopError::Configuration {
                message: "cleanup_interval_secs must be greater than zero".to_string(),
                field: Some("cache.cleanup_interval_secs".to_string()),
                suggestion: Some("The default is 300 seconds".to_string()),
            });
        }
        if self.downloads.chunk_size == 0 {
            return Err(WorkshopError::Configuration {
                message: "chunk_size must be at least 1 byte".to_string(),
                field: Some("downloads.chunk_size".to_string()),
                suggestion: Some("The default is 8192".to_string()),
            });
        }
        for (field, value) in [
            ("api.base_url", &self.api.base_url),
            ("api.community_url", &self.api.community_url),
            ("downloads.fallback_download_base", &self.downloads.fallback_download_base),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(WorkshopError::Configuration {
                    message: format!("'{}' is not a valid URL", value),
                    field: Some(field.to_string()),
                    suggestion: Some("Use an absolute http(s) URL".to_string()),
                });
            }
        }
        Ok(())
    }
}
