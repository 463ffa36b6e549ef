//! Server state shared across handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::ServerConfig;
use crate::directory::AgentDirectory;
use crate::protocol::SessionEngine;
use crate::relay::{SessionRegistry, SignalRelay};

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Live agent sessions
    pub registry: SessionRegistry,
    /// Client-to-agent relay
    pub relay: SignalRelay,
    /// Agent socket engine
    pub engine: SessionEngine,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig, directory: Arc<dyn AgentDirectory>) -> Self {
        let registry = SessionRegistry::new();
        let relay =
            SignalRelay::new(registry.clone()).with_exchange_timeout(config.exchange_timeout);
        let engine = SessionEngine::new(registry.clone(), directory)
            .with_description(config.description.clone());

        Self {
            config,
            registry,
            relay,
            engine,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
