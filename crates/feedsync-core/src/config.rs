use home::home_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::constant::{
    CONFIG_DIR, CONFIG_ENV, CONFIG_FILE, DEFAULT_API_URL, DEFAULT_LIVE_URL, DEFAULT_PAGE_SIZE,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TOKEN_TTL_SECS,
};
use crate::{FeedError, FeedResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Backend root; `/graphql` and `/post-image` are resolved against it.
    /// Example: http://localhost:8080/
    pub api_url: Url,
    /// Websocket endpoint of the push channel.
    pub live_url: Url,
    /// Posts per page; must match what the backend pages by.
    pub page_size: usize,
    /// Bearer token obtained at login.
    /// Optional
    pub token: Option<String>,
    /// Lifetime of `token` from the moment the client starts.
    pub token_ttl_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default api url is valid"),
            live_url: Url::parse(DEFAULT_LIVE_URL).expect("default live url is valid"),
            page_size: DEFAULT_PAGE_SIZE,
            token: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl FeedConfig {
    /// `$FEEDSYNC_CONF` if set, otherwise `~/.feedsync/feedsync.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let home_dir = home_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        home_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Loads the config. An explicit `path` must exist; the default location
    /// is optional and falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> FeedResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !path.exists() {
            if required {
                return Err(FeedError::config_error(format!(
                    "Config file {} does not exist",
                    path.display()
                ))
                .into());
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> FeedResult<Self> {
        let config: FeedConfig = toml::from_str(raw)
            .map_err(|err| FeedError::config_error(format!("Parsing error: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config to path
    pub fn save(&self, path: &Path) -> FeedResult<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.page_size == 0 {
            return Err(FeedError::config_error("page_size must be at least 1".into()));
        }
        if !matches!(self.api_url.scheme(), "http" | "https") {
            return Err(FeedError::config_error(format!(
                "api_url must be http(s), got {}",
                self.api_url
            )));
        }
        if !matches!(self.live_url.scheme(), "ws" | "wss") {
            return Err(FeedError::config_error(format!(
                "live_url must be ws(s), got {}",
                self.live_url
            )));
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
