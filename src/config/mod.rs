//! Configuration and credential storage

use anyhow::{Context, Result};
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{StoredToken, TokenStore};
use crate::meeting::CancelPolicy;
use crate::models::Role;

const DEFAULT_API_URL: &str = "https://api.gigmeet.example/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Environment override for the API base URL.
pub const API_URL_ENV: &str = "GIGMEET_API_URL";

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_join_timeout() -> u64 {
    DEFAULT_JOIN_TIMEOUT_SECS
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Marketplace API base URL (without trailing slash)
    pub api_base_url: Option<String>,
    /// Stored session access token
    pub access_token: Option<StoredToken>,
    /// Stored session refresh token
    pub refresh_token: Option<String>,
    /// Logged-in user's ID (from last login)
    pub user_id: Option<String>,
    /// Logged-in user's marketplace role
    pub role: Option<Role>,
    /// Viewer timezone as minutes east of UTC, used for "today" and calendar days
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Per-phase timeout when joining a meeting
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
    /// Page size for list queries
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Who may cancel a meeting, checked locally before the server is asked
    #[serde(default)]
    pub cancel_policy: CancelPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            access_token: None,
            refresh_token: None,
            user_id: None,
            role: None,
            utc_offset_minutes: 0,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            join_timeout_secs: DEFAULT_JOIN_TIMEOUT_SECS,
            page_limit: DEFAULT_PAGE_LIMIT,
            cancel_policy: CancelPolicy::default(),
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "gigmeet", "gigmeet")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// API base URL: environment, then config file, then built-in default.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timezone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).with_context(|| {
            format!("UTC offset out of range: {} minutes", self.utc_offset_minutes)
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs.max(1))
    }

    pub fn set_identity(&mut self, user_id: String, role: Role) {
        self.user_id = Some(user_id);
        self.role = Some(role);
    }
}

impl TokenStore for Config {
    fn get_access_token(&self) -> Option<StoredToken> {
        self.access_token.clone()
    }

    fn set_access_token(&mut self, token: String, expires_in: Option<u64>) {
        self.access_token = Some(StoredToken::new(token, expires_in));
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.refresh_token.clone()
    }

    fn set_refresh_token(&mut self, token: String) {
        self.refresh_token = Some(token);
    }

    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user_id = None;
        self.role = None;
    }
}
