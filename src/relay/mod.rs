//! Session registry and signal relay.
//!
//! The relay is the bridge between stateless client requests and the long-lived
//! agent sockets:
//!
//! ```text
//! HTTP handler ──> SignalRelay ──> SessionRegistry::lookup(session_id)
//!                      │
//!                      ├─ AgentSession::open_exchange   (CLIENT_INIT queued)
//!                      │
//!                      └─ await reply ◄── SessionEngine resolves on INIT_RESPONSE
//! ```
//!
//! Lookup misses fail immediately; nothing is queued for sessions that are not
//! (or no longer) registered.

mod registry;
mod signal;

pub use registry::{SessionListing, SessionRegistry};
pub use signal::{SignalRelay, DEFAULT_EXCHANGE_TIMEOUT};
