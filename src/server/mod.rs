//! Signaling HTTP server.
//!
//! Serves both sides of the relay on one listener:
//! - `/server/session`: agent WebSocket
//! - `/client/signal`, `/client/agents`: client HTTP API
//! - `/health`, `/status`: monitoring
//!
//! # Example
//!
//! ```rust,ignore
//! use qsp_signal::server::{Server, ServerConfig};
//! use qsp_signal::directory::OpenDirectory;
//!
//! let config = ServerConfig::default().with_port(8080);
//! let server = Server::new(config, Arc::new(OpenDirectory));
//! server.run().await?;
//! ```

mod config;
mod handlers;
mod socket;
mod state;

use std::sync::Arc;

use tokio::net::TcpListener;

pub use config::ServerConfig;
pub use handlers::{
    create_router, health_check, ClientSignalRequest, ClientSignalResponse, HealthResponse,
    StatusResponse,
};
pub use socket::agent_socket;
pub use state::AppState;

use crate::directory::AgentDirectory;
use crate::error::{Result, SignalError};

/// Signaling server
#[derive(Debug, Clone)]
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Create a server checking agents against `directory`
    pub fn new(config: ServerConfig, directory: Arc<dyn AgentDirectory>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, directory)),
        }
    }

    /// Shared state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.state.config.addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            %addr,
            exchange_timeout_secs = self.state.config.exchange_timeout.as_secs(),
            directory = self.state.engine.directory_name(),
            "signal server listening"
        );

        axum::serve(listener, create_router(Arc::clone(&self.state)))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| SignalError::Server(e.to_string()))?;

        tracing::info!(
            remaining_sessions = self.state.registry.len(),
            "signal server stopped"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
