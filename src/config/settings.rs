use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 60.0;

/// Families of built-in tools that can be switched on and off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolFamily {
    File,
    Search,
    Shell,
}

impl fmt::Display for ToolFamily {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Search => f.write_str("search"),
            Self::Shell => f.write_str("shell"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    /// Filesystem roots tools may touch; passed through to tool providers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_paths: Option<Vec<PathBuf>>,
    pub enable_file_tools: bool,
    pub enable_shell_tools: bool,
    pub enable_search_tools: bool,
    pub max_concurrent_requests: usize,
    /// Per-request deadline in seconds
    pub request_timeout: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid server name: {0:?} (cannot be empty)")]
    InvalidName(String),
    #[error("Invalid max_concurrent_requests: {0} (must be at least 1)")]
    InvalidConcurrency(usize),
    #[error("Invalid request_timeout: {0} (must be a positive number of seconds)")]
    InvalidTimeout(f64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            name: "mcp-tool-server".to_string(),
            version: "0.1.0".to_string(),
            allowed_paths: None,
            enable_file_tools: true,
            enable_shell_tools: true,
            enable_search_tools: true,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".mcp-tool-server"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("mcp-tool-server"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`.
    /// A missing file yields the defaults.
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file_path().context("Failed to determine config file path")?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = self.to_toml().context("Failed to serialize config to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }

        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrent_requests));
        }

        if !self.request_timeout.is_finite() || self.request_timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout(self.request_timeout));
        }

        Ok(())
    }

    /// The per-request deadline; unusable values fall back to the default
    #[inline]
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs(60))
    }

    #[inline]
    pub fn is_enabled(&self, family: ToolFamily) -> bool {
        match family {
            ToolFamily::File => self.enable_file_tools,
            ToolFamily::Search => self.enable_search_tools,
            ToolFamily::Shell => self.enable_shell_tools,
        }
    }

    /// Public identity and feature flags
    #[inline]
    pub fn to_summary(&self) -> Value {
        json!({
            "name": self.name,
            "version": self.version,
            "enable_file_tools": self.enable_file_tools,
            "enable_shell_tools": self.enable_shell_tools,
            "enable_search_tools": self.enable_search_tools,
        })
    }
}
