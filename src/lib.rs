//! # QSP Signal - WebRTC Signaling Relay
//!
//! Rendezvous server letting browser clients open WebRTC connections to
//! station agents that sit behind NAT.
//!
//! ## Features
//!
//! - **Agent sessions**: agents keep one WebSocket open and announce themselves
//!   with a hello handshake
//! - **SDP relay**: a client posts an offer over HTTP and gets the agent's
//!   answer back in the same response
//! - **Concurrent exchanges**: many offers may be in flight on one agent socket,
//!   correlated by per-session exchange IDs
//! - **Agent directory**: optional allow-list of agent IDs checked on hello
//!
//! ## Architecture
//!
//! ```text
//! Client (HTTP)                Signal Server                    Agent (WS)
//!    |                              |                                |
//!    |                              |------ SERVER_HELLO ----------->|
//!    |                              |<----- AGENT_HELLO -------------|
//!    |                              |        (session registered)    |
//!    |                              |                                |
//!    |-- POST /client/signal ------>|                                |
//!    |   {agentSessionId, sdp}      |------ CLIENT_INIT (id=n) ----->|
//!    |                              |<----- INIT_RESPONSE (id=n) ----|
//!    |<----- {serverSdp} -----------|                                |
//! ```
//!
//! The HTTP request stays open while the agent answers. It fails with 404
//! when the session is unknown, 500 when the agent drops, and 504 when the
//! agent does not answer in time.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use qsp_signal::{Config, Server, ServerConfig};
//!
//! let config = Config::load(None)?;
//! let server = Server::new(ServerConfig::from_config(&config)?, config.directory()?);
//! server.run().await?;
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Wire messages, agent sessions and the socket engine
//! - [`relay`]: Session registry and client-to-agent relay
//! - [`directory`]: Known-agent lookup used during the handshake
//! - [`server`]: HTTP/WebSocket server (Axum-based)
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod directory;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;

// Re-exports for convenience
pub use config::Config;
pub use directory::{AgentDirectory, OpenDirectory, StaticDirectory};
pub use error::{Result, SignalError};
pub use protocol::{AgentSession, CloseCause, SessionEngine, SessionState, WireMessage};
pub use relay::{SessionRegistry, SignalRelay};
pub use server::{AppState, Server, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
