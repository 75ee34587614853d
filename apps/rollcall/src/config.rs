//! # Configuration
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config`, or `rollcall.toml` in the working directory)
//! 3. `ROLLCALL_*` environment variables
//! 4. command-line flags (applied by the CLI)
//!
//! ## Environment Variables
//!
//! - `ROLLCALL_HOST`, `ROLLCALL_PORT`: HTTP bind address
//! - `ROLLCALL_DATABASE`: path to the redb file
//! - `ROLLCALL_RATE_LIMIT`: requests per second (0 disables)
//! - `ROLLCALL_CORS_ORIGINS`: comma-separated origins, or `*` for all
//! - `ROLLCALL_LOG_FORMAT`: `text` or `json`

use rollcall_core::RollcallError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

/// Default requests per second for the global limiter.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// CONFIG TYPES
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(RollcallError::Validation(vec![format!(
                "log format must be one of [text, json], got '{}'",
                other
            )])),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second across all clients. 0 disables the limiter.
    pub rate_limit: u32,
    /// Allowed CORS origins. Empty means localhost only; `["*"]` allows all.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("rollcall.redb"),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Defaults, then the config file, then the process environment.
    ///
    /// An explicit `path` must exist. Without one, `rollcall.toml` is read
    /// only if present.
    pub fn load(path: Option<&Path>) -> Result<Self, RollcallError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, RollcallError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RollcallError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, RollcallError> {
        toml::from_str(text)
            .map_err(|e| RollcallError::Serialization(format!("Invalid config: {}", e)))
    }

    /// Override fields from `ROLLCALL_*` variables found through `lookup`.
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RollcallError> {
        let mut problems = Vec::new();

        if let Some(host) = lookup("ROLLCALL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ROLLCALL_PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => problems.push(format!(
                    "ROLLCALL_PORT must be a port number, got '{}'",
                    port
                )),
            }
        }
        if let Some(db) = lookup("ROLLCALL_DATABASE") {
            self.database = PathBuf::from(db);
        }
        if let Some(limit) = lookup("ROLLCALL_RATE_LIMIT") {
            match limit.trim().parse() {
                Ok(n) => self.server.rate_limit = n,
                Err(_) => problems.push(format!(
                    "ROLLCALL_RATE_LIMIT must be a non-negative integer, got '{}'",
                    limit
                )),
            }
        }
        if let Some(origins) = lookup("ROLLCALL_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(format) = lookup("ROLLCALL_LOG_FORMAT") {
            match format.parse() {
                Ok(f) => self.log.format = f,
                Err(e) => problems.push(e.to_string()),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RollcallError::Validation(problems))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
