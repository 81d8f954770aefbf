//! Configuration for teamboard, read from `.teamboard/teamboard.toml`.
//!
//! Layering is defaults → file → environment → CLI flags. The environment
//! step also reads a `.env` file when one is present (see `main`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = ".teamboard/board.db"
//!
//! [permissions]
//! mode = "members"   # or "open"
//!
//! [logging]
//! level = "info"
//! format = "pretty"  # or "json"
//! dir = ".teamboard/logs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::board::permissions::PermissionMode;
use crate::board::server::ServerConfig;

pub const CONFIG_DIR: &str = ".teamboard";
pub const CONFIG_FILE: &str = "teamboard.toml";

pub const ENV_PORT: &str = "TEAMBOARD_PORT";
pub const ENV_DB: &str = "TEAMBOARD_DB";
pub const ENV_LOG: &str = "TEAMBOARD_LOG";
pub const ENV_PERMISSIONS: &str = "TEAMBOARD_PERMISSIONS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local front-end dev server.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("board.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Kept as a string so `validate` can report a bad value instead of the
/// whole file failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionsSection {
    #[serde(default = "default_permission_mode")]
    pub mode: String,
}

fn default_permission_mode() -> String {
    PermissionMode::default().as_str().to_string()
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            mode: default_permission_mode(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `info` or `teamboard=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write daily-rotated log files here.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BoardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse teamboard.toml")
    }

    /// Load `teamboard.toml` from `dir`, or defaults if it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path if given, else from `.teamboard/`, then
    /// apply environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(Path::new(CONFIG_DIR))?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize teamboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `TEAMBOARD_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} '{}'", ENV_PORT, port))?;
        }
        if let Some(path) = lookup(ENV_DB) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.logging.level = level;
        }
        if let Some(mode) = lookup(ENV_PERMISSIONS) {
            self.permissions.mode = mode;
        }
        Ok(())
    }

    pub fn permission_mode(&self) -> Result<PermissionMode> {
        PermissionMode::from_str(&self.permissions.mode).map_err(anyhow::Error::msg)
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.database.path.clone(),
            dev_mode: self.server.dev_mode,
            permissions: self.permission_mode()?,
        })
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = PermissionMode::from_str(&self.permissions.mode) {
            warnings.push(e);
        }
        if self.server.port == 0 {
            warnings.push("Invalid port 0: the server needs a fixed port".to_string());
        }
        if self.database.path.as_os_str().is_empty() {
            warnings.push("Database path must not be empty".to_string());
        }

        warnings
    }
}
