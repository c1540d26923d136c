//! Configuration management for the fileshare server.
//!
//! Settings are layered: built-in defaults, an optional TOML file (default
//! path `~/.config/fileshare/config.toml`), `FILESHARE_*` environment
//! variables, then command line flags. The result is frozen into a
//! [`ServerSettings`] value before the listener is bound and never changes
//! afterwards.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listen host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8001;

/// Default URL prefix.
pub const DEFAULT_PREFIX: &str = "/";

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no directory to share: pass PATH or set share.root")]
    MissingRoot,

    #[error("shared directory does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("shared path is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Main configuration structure for the fileshare server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerConfig,

    /// What is shared and how.
    pub share: ShareConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to listen on, empty for all interfaces.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// URL prefix at which the share is reachable.
    pub prefix: String,
}

/// Shared directory and access policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShareConfig {
    /// Directory to share.
    pub root: Option<PathBuf>,

    /// Follow symlinks. Symlinks can point outside the shared directory.
    pub follow_symlinks: bool,

    /// Hide entries whose name starts with '.'.
    pub skip_hidden: bool,

    /// Reject uploads, moves, removals and directory creation.
    pub read_only: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit logs as JSON lines.
    pub json: bool,

    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            root: None,
            follow_symlinks: false,
            skip_hidden: true,
            read_only: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fileshare")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - FILESHARE_ROOT: directory to share
    /// - FILESHARE_PREFIX: URL prefix
    /// - FILESHARE_LOG_LEVEL: log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FILESHARE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding share root from environment: {}", root);
                self.share.root = Some(PathBuf::from(root));
            }
        }

        if let Ok(prefix) = std::env::var("FILESHARE_PREFIX") {
            if !prefix.is_empty() {
                tracing::info!("Overriding prefix from environment: {}", prefix);
                self.server.prefix = prefix;
            }
        }

        if let Ok(level) = std::env::var("FILESHARE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = self.share.root.as_ref().ok_or(ConfigError::MissingRoot)?;

        let metadata =
            fs::metadata(root).map_err(|_| ConfigError::RootNotFound(root.clone()))?;
        if !metadata.is_dir() {
            return Err(ConfigError::RootNotADirectory(root.clone()));
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Access policy described by this configuration.
    pub fn policy(&self) -> PolicyFlags {
        PolicyFlags {
            follow_symlinks: self.share.follow_symlinks,
            skip_hidden: self.share.skip_hidden,
            read_only: self.share.read_only,
        }
    }

    /// Validate and freeze the configuration into server settings.
    ///
    /// The shared root is canonicalized here, once.
    pub fn into_settings(&self) -> Result<ServerSettings> {
        self.validate()?;
        let root = self.share.root.as_ref().ok_or(ConfigError::MissingRoot)?;

        let mut settings = ServerSettings::new(root, &self.server.prefix, self.policy())
            .with_context(|| format!("Failed to resolve shared directory: {}", root.display()))?;
        settings.host = self.server.host.clone();
        settings.port = self.server.port;
        Ok(settings)
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

/// Process-wide access policy, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyFlags {
    /// Resolve symlinks when mapping paths and walking trees.
    pub follow_symlinks: bool,
    /// Treat entries whose name starts with '.' as nonexistent.
    pub skip_hidden: bool,
    /// Reject every mutating request.
    pub read_only: bool,
}

impl Default for PolicyFlags {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            skip_hidden: true,
            read_only: false,
        }
    }
}

/// URL prefix with exactly one leading and one trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPrefix(String);

impl UrlPrefix {
    /// Normalize a configured prefix. `""`, `"/"` and `"//"` all become `"/"`.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            Self(DEFAULT_PREFIX.to_string())
        } else {
            Self(format!("/{trimmed}/"))
        }
    }

    /// The normalized prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Route path for an endpoint below the prefix, e.g. `/share/zip`.
    pub fn route(&self, endpoint: &str) -> String {
        format!("{}{}", self.0, endpoint)
    }
}

impl Default for UrlPrefix {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl fmt::Display for UrlPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable settings the server runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// Canonical shared directory.
    pub root: PathBuf,
    /// Normalized URL prefix.
    pub prefix: UrlPrefix,
    /// Access policy.
    pub policy: PolicyFlags,
    /// Host to listen on, empty for all interfaces.
    pub host: String,
    /// Port to listen on, 0 for an ephemeral port.
    pub port: u16,
}

impl ServerSettings {
    /// Build settings for `root`, canonicalizing it.
    pub fn new(root: impl AsRef<Path>, prefix: &str, policy: PolicyFlags) -> std::io::Result<Self> {
        Ok(Self {
            root: fs::canonicalize(root)?,
            prefix: UrlPrefix::new(prefix),
            policy,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        })
    }

    /// Host to bind, mapping an empty host to all interfaces.
    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}
