//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::protocol::ServerDescription;
use crate::relay::DEFAULT_EXCHANGE_TIMEOUT;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// How long a client waits for an agent answer
    pub exchange_timeout: Duration,
    /// Description announced to agents
    pub description: ServerDescription,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Enable request logging
    pub logging: bool,
    /// Origins allowed by CORS (empty disables CORS)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            description: ServerDescription::default(),
            max_body_size: 1024 * 1024, // 1MB
            logging: true,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl ServerConfig {
    /// Build from the file/env configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            addr: config.server.listen_addr().parse()?,
            exchange_timeout: Duration::from_secs(config.session.exchange_timeout_secs),
            description: ServerDescription::from(&config.description),
            max_body_size: config.server.max_body_size,
            logging: config.server.logging,
            cors_origins: config.server.cors_origins.clone(),
        })
    }

    /// Create with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Bind to all interfaces
    pub fn bind_all(mut self) -> Self {
        self.addr = SocketAddr::from(([0, 0, 0, 0], self.addr.port()));
        self
    }

    /// Set address directly
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Set exchange timeout
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Set the announced description
    pub fn with_description(mut self, description: ServerDescription) -> Self {
        self.description = description;
        self
    }

    /// Set max body size
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Allow an additional CORS origin
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Disable logging
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Disable CORS
    pub fn without_cors(mut self) -> Self {
        self.cors_origins.clear();
        self
    }
}
