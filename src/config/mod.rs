//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (applied by the binary on top)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::directory::{AgentDirectory, OpenDirectory, StaticDirectory};
use crate::error::{Result, SignalError};
use crate::protocol::ServerDescription;

/// Environment variable overriding the listen host
pub const ENV_HOST: &str = "QSP_SIGNAL_HOST";
/// Environment variable overriding the listen port
pub const ENV_PORT: &str = "QSP_SIGNAL_PORT";
/// Environment variable overriding the exchange timeout
pub const ENV_EXCHANGE_TIMEOUT: &str = "QSP_SIGNAL_EXCHANGE_TIMEOUT_SECS";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ListenConfig,

    /// Agent session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Description announced to agents
    #[serde(default)]
    pub description: DescriptionConfig,

    /// Known agents
    #[serde(default)]
    pub agents: AgentsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SignalError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| SignalError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/qsp-signal/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("qsp-signal").join("config.toml"))
    }

    /// Load from `path`, else from the default location if it exists, else
    /// defaults; then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .parse()
                .map_err(|e| SignalError::Config(format!("{ENV_PORT}={port}: {e}")))?;
        }
        if let Some(secs) = lookup(ENV_EXCHANGE_TIMEOUT) {
            self.session.exchange_timeout_secs = secs
                .parse()
                .map_err(|e| SignalError::Config(format!("{ENV_EXCHANGE_TIMEOUT}={secs}: {e}")))?;
        }
        Ok(self)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the agent directory: open when no agent is configured
    pub fn directory(&self) -> Result<Arc<dyn AgentDirectory>> {
        if self.agents.known.is_empty() {
            Ok(Arc::new(OpenDirectory))
        } else {
            Ok(Arc::new(StaticDirectory::parse(&self.agents.known)?))
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Origins allowed to call the client API from a browser
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Enable request logging
    pub logging: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: vec!["http://localhost:5173".to_string()],
            max_body_size: 1024 * 1024, // 1 MB
            logging: true,
        }
    }
}

impl ListenConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Agent session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a client waits for an agent answer
    pub exchange_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exchange_timeout_secs: 30,
        }
    }
}

/// Description announced in `SERVER_HELLO`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionConfig {
    /// Human-readable server name
    pub server_name: String,
    /// Server implementation type
    pub server_type: String,
    /// Protocol major version
    pub protocol_major_version: u32,
    /// Protocol minor version
    pub protocol_minor_version: u32,
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        let description = ServerDescription::default();
        Self {
            server_name: description.server_name,
            server_type: description.server_type,
            protocol_major_version: description.protocol_major_version,
            protocol_minor_version: description.protocol_minor_version,
        }
    }
}

impl From<&DescriptionConfig> for ServerDescription {
    fn from(config: &DescriptionConfig) -> Self {
        Self {
            server_name: config.server_name.clone(),
            server_type: config.server_type.clone(),
            version: crate::VERSION.to_string(),
            protocol_major_version: config.protocol_major_version,
            protocol_minor_version: config.protocol_minor_version,
        }
    }
}

/// Known agents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Registered agent UUIDs; empty accepts every agent
    pub known: Vec<String>,
}
