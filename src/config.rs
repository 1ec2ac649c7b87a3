//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where clients reach the backend and which public key they present
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub api_key: String,
}

impl BackendConfig {
    /// Read the two client values from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(ENV_BACKEND_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_BACKEND_URL))?;
        let api_key = std::env::var(ENV_BACKEND_KEY)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_BACKEND_KEY))?;

        Ok(Self { url, api_key })
    }

    /// Both values must be present for a usable client
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_BACKEND_URL));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_BACKEND_KEY));
        }
        Ok(())
    }
}

/// Service URL used by clients
pub const ENV_BACKEND_URL: &str = "BOOKMARK_BACKEND_URL";
/// Public API key used by clients
pub const ENV_BACKEND_KEY: &str = "BOOKMARK_BACKEND_KEY";

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public origin of the pages, used for OAuth redirects
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Extra redirect prefixes accepted from `redirect_to`
    #[serde(default)]
    pub additional_redirect_urls: Vec<String>,

    /// Key clients must present; falls back to `backend.api_key`
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_site_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            site_url: default_site_url(),
            additional_redirect_urls: Vec::new(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("bookmark-live").join("bookmarks.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./bookmark_data/bookmarks.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Identity and session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_provider_name")]
    pub default_provider: String,

    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_session_ttl() -> i64 {
    24 * 7
}

fn default_provider_name() -> String {
    "google".to_string()
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut providers = HashMap::new();
    providers.insert("google".to_string(), ProviderConfig::google());
    providers
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl(),
            default_provider: default_provider_name(),
            providers: default_providers(),
        }
    }
}

/// OAuth 2.0 provider endpoints and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    pub fn google() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
        }
    }

    /// A provider without a client id cannot start a flow
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }
}

/// Change-feed hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_max_channels")]
    pub max_channels_per_connection: usize,
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_channels() -> usize {
    100
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_channels_per_connection: default_max_channels(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        format!("bookmark_live={},tower_http=info", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("bookmark-live").join("config.toml")),
            Some(PathBuf::from("/etc/bookmark-live/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Key the server checks on every API request
    pub fn server_api_key(&self) -> &str {
        if self.server.api_key.is_empty() {
            &self.backend.api_key
        } else {
            &self.server.api_key
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Backend (client side)
        if let Some(url) = var(ENV_BACKEND_URL) {
            self.backend.url = url;
        }
        if let Some(key) = var(ENV_BACKEND_KEY) {
            self.backend.api_key = key;
        }

        // Server
        if let Some(host) = var("BOOKMARK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("BOOKMARK_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Some(site_url) = var("BOOKMARK_SITE_URL") {
            self.server.site_url = site_url;
        }
        if let Some(key) = var("BOOKMARK_API_KEY") {
            self.server.api_key = key;
        }

        // Storage
        if let Some(db_path) = var("BOOKMARK_DB_PATH") {
            self.storage.db_path = db_path;
        }

        // Google credentials
        if let Some(id) = var("BOOKMARK_GOOGLE_CLIENT_ID") {
            self.auth
                .providers
                .entry("google".to_string())
                .or_insert_with(ProviderConfig::google)
                .client_id = id;
        }
        if let Some(secret) = var("BOOKMARK_GOOGLE_CLIENT_SECRET") {
            self.auth
                .providers
                .entry("google".to_string())
                .or_insert_with(ProviderConfig::google)
                .client_secret = secret;
        }

        // Logging
        if let Some(level) = var("BOOKMARK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("BOOKMARK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing required setting {0}")]
    Missing(&'static str),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Bookmark Live Configuration
#
# Environment variables override these settings:
# - BOOKMARK_BACKEND_URL, BOOKMARK_BACKEND_KEY
# - BOOKMARK_HOST, BOOKMARK_PORT, BOOKMARK_SITE_URL, BOOKMARK_API_KEY
# - BOOKMARK_DB_PATH
# - BOOKMARK_GOOGLE_CLIENT_ID, BOOKMARK_GOOGLE_CLIENT_SECRET
# - BOOKMARK_LOG_LEVEL, BOOKMARK_LOG_FORMAT

[backend]
# Service URL clients connect to
url = "http://localhost:8090"

# Public API key sent by clients with every request
api_key = "change-me"

[server]
host = "0.0.0.0"
port = 8090

# Public origin of the pages; OAuth flows return here
site_url = "http://localhost:8090"

# Other origins allowed as OAuth redirect targets
additional_redirect_urls = []

# Request timeout in seconds
request_timeout_secs = 30

[storage]
db_path = "~/.local/share/bookmark-live/bookmarks.db"

[auth]
session_ttl_hours = 168
default_provider = "google"

[auth.providers.google]
client_id = ""
client_secret = ""
authorize_url = "https://accounts.google.com/o/oauth2/v2/auth"
token_url = "https://oauth2.googleapis.com/token"
userinfo_url = "https://openidconnect.googleapis.com/v1/userinfo"
scopes = ["openid", "email", "profile"]

[realtime]
max_connections = 1000
max_channels_per_connection = 100

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
