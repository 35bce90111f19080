//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/finsync/config.toml`
//! - macOS: `~/Library/Application Support/com.finsync.finsync/config.toml`
//! - Windows: `%APPDATA%/finsync/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `FINSYNC_BASE_URL`: API base URL
//! - `FINSYNC_TOKEN_URL`: Token endpoint URL
//! - `FINSYNC_TIMEOUT`: Request timeout in seconds
//! - `FINSYNC_CONFIG`: Override config file path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::error::{FinsyncError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the API base URL.
pub const ENV_BASE_URL: &str = "FINSYNC_BASE_URL";
/// Environment variable for the token endpoint URL.
pub const ENV_TOKEN_URL: &str = "FINSYNC_TOKEN_URL";
/// Environment variable for timeout in seconds.
pub const ENV_TIMEOUT: &str = "FINSYNC_TIMEOUT";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "FINSYNC_CONFIG";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.finsync.example/";
/// Default API version sent in `X-Api-Version`.
pub const DEFAULT_API_VERSION: &str = "2.0";
/// Default keyring service name for the token encryption key.
pub const DEFAULT_KEYRING_SERVICE: &str = "finsync";

const MAX_TIMEOUT_SECONDS: u64 = 300;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Values supplied on the command line, if any.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub token_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub config_path: Option<PathBuf>,
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// API base URL, always ending in `/`.
    pub base_url: String,
    /// Token endpoint URL.
    pub token_url: String,
    /// API version header value.
    pub api_version: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Refresh proactively when the access token expires within this window.
    pub refresh_leeway: Duration,
    /// Upper bound on how long a caller waits for a shared refresh.
    pub refresh_wait_timeout: Duration,
    /// Keyring service holding the token encryption key.
    pub keyring_service: String,
    /// Record cache database.
    pub database_path: PathBuf,
    /// Encrypted credentials file.
    pub credentials_path: PathBuf,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each overridable configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub base_url: ConfigSource,
    pub token_url: ConfigSource,
    pub timeout: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI overrides, the process environment,
    /// and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or any
    /// resolved value is out of range.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ResolvedConfig::resolve`].
    pub fn resolve_with(
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let paths = AppPaths::new();
        let config_path = overrides
            .config_path
            .clone()
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from))
            .unwrap_or_else(|| paths.config_file());
        let config = Config::load_from(&config_path)?;
        config.validate()?;
        Self::from_config(&config, overrides, &env, &paths)
    }

    /// Apply overrides and env on top of an already loaded config.
    ///
    /// # Errors
    ///
    /// Returns [`FinsyncError::ConfigInvalid`] when an override is out of range.
    pub fn from_config(
        config: &Config,
        overrides: &ConfigOverrides,
        env: &impl Fn(&str) -> Option<String>,
        paths: &AppPaths,
    ) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let base_url = Self::resolve_string(
            overrides.base_url.as_deref(),
            env(ENV_BASE_URL),
            config.api.base_url.as_deref(),
            DEFAULT_BASE_URL,
            &mut sources.base_url,
        );
        let base_url = normalize_base_url(&base_url, "api.base_url")?;

        let default_token_url = format!("{base_url}oauth/token");
        let token_url = Self::resolve_string(
            overrides.token_url.as_deref(),
            env(ENV_TOKEN_URL),
            config.api.token_url.as_deref(),
            &default_token_url,
            &mut sources.token_url,
        );
        if token_url.trim().is_empty() {
            return Err(invalid("api.token_url", &token_url, "must not be empty"));
        }

        let timeout_seconds = Self::resolve_timeout(overrides, &env, config, &mut sources.timeout)?;
        let timeout = Duration::from_secs(timeout_seconds);

        let refresh_wait_timeout = config
            .auth
            .refresh_wait_timeout_seconds
            .map_or(timeout, Duration::from_secs);

        Ok(Self {
            base_url,
            token_url,
            api_version: config.api.api_version.clone(),
            timeout,
            refresh_leeway: Duration::from_secs(config.auth.refresh_leeway_seconds),
            refresh_wait_timeout,
            keyring_service: config.auth.keyring_service.clone(),
            database_path: config
                .storage
                .database_path
                .clone()
                .unwrap_or_else(|| paths.database_file()),
            credentials_path: config
                .storage
                .credentials_path
                .clone()
                .unwrap_or_else(|| paths.credentials_file()),
            sources,
        })
    }

    fn resolve_string(
        cli: Option<&str>,
        env: Option<String>,
        file: Option<&str>,
        default: &str,
        source: &mut ConfigSource,
    ) -> String {
        // 1. CLI flag
        if let Some(value) = cli {
            *source = ConfigSource::Cli;
            return value.to_string();
        }

        // 2. Environment variable
        if let Some(value) = env.filter(|v| !v.is_empty()) {
            *source = ConfigSource::Env;
            return value;
        }

        // 3. Config file
        if let Some(value) = file {
            *source = ConfigSource::ConfigFile;
            return value.to_string();
        }

        // 4. Default
        *source = ConfigSource::Default;
        default.to_string()
    }

    fn resolve_timeout(
        overrides: &ConfigOverrides,
        env: &impl Fn(&str) -> Option<String>,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<u64> {
        let (value, from) = if let Some(timeout) = overrides.timeout_seconds {
            (timeout, ConfigSource::Cli)
        } else if let Some(raw) = env(ENV_TIMEOUT) {
            let parsed = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(ENV_TIMEOUT, &raw, "expected a whole number of seconds"))?;
            (parsed, ConfigSource::Env)
        } else {
            (config.api.timeout_seconds, ConfigSource::ConfigFile)
        };

        check_timeout("api.timeout_seconds", value)?;
        *source = from;
        Ok(value)
    }
}

fn invalid(key: &str, value: &str, message: &str) -> FinsyncError {
    FinsyncError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

fn check_timeout(key: &str, seconds: u64) -> Result<()> {
    if seconds == 0 || seconds > MAX_TIMEOUT_SECONDS {
        return Err(invalid(
            key,
            &seconds.to_string(),
            "timeout must be between 1 and 300 seconds",
        ));
    }
    Ok(())
}

/// Trim and ensure a trailing slash so relative paths join under the base.
fn normalize_base_url(raw: &str, key: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(key, raw, "must not be empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(invalid(key, raw, "must start with http:// or https://"));
    }
    if trimmed.ends_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/"))
    }
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API settings.
    pub api: ApiConfig,
    /// Authentication settings.
    pub auth: AuthConfig,
    /// Local storage settings.
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL.
    pub base_url: Option<String>,
    /// Token endpoint; defaults to `{base_url}oauth/token`.
    pub token_url: Option<String>,
    /// Timeout for network requests in seconds.
    pub timeout_seconds: u64,
    /// Value of the `X-Api-Version` header.
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Refresh before sending when the token expires within this many seconds.
    pub refresh_leeway_seconds: u64,
    /// Max seconds to wait on a shared refresh; defaults to the request timeout.
    pub refresh_wait_timeout_seconds: Option<u64>,
    /// Keyring service holding the encryption key.
    pub keyring_service: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record cache database path.
    pub database_path: Option<PathBuf>,
    /// Encrypted credentials file path.
    pub credentials_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_url: None,
            timeout_seconds: 30,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_leeway_seconds: 60,
            refresh_wait_timeout_seconds: None,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| FinsyncError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| FinsyncError::ConfigParse {
            path: path.display().to_string(),
            message: format!("failed to serialize config: {e}"),
        })?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - A configured base URL is an http(s) URL
    /// - A configured token URL is not empty
    /// - Timeouts are within 1-300 seconds
    ///
    /// # Errors
    ///
    /// Returns [`FinsyncError::ConfigInvalid`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.api.base_url {
            normalize_base_url(base_url, "api.base_url")?;
        }
        if let Some(token_url) = &self.api.token_url
            && token_url.trim().is_empty()
        {
            return Err(invalid("api.token_url", token_url, "must not be empty"));
        }
        check_timeout("api.timeout_seconds", self.api.timeout_seconds)?;
        if let Some(wait) = self.auth.refresh_wait_timeout_seconds {
            check_timeout("auth.refresh_wait_timeout_seconds", wait)?;
        }
        if self.api.api_version.trim().is_empty() {
            return Err(invalid("api.api_version", &self.api.api_version, "must not be empty"));
        }
        Ok(())
    }
}
