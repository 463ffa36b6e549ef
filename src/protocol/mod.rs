//! Agent session protocol.
//!
//! Agents (station gateways) keep one WebSocket open to the server. Clients
//! never talk to agents directly: the server pushes their offers down the
//! agent's socket and correlates the answers by exchange ID.
//!
//! # Message Flow
//!
//! ```text
//! Agent                             Server
//!    |                                |
//!    |<------- SERVER_HELLO ---------|  Sent as soon as the socket opens
//!    |-------- AGENT_HELLO --------->|  Identity; session becomes addressable
//!    |                                |
//!    |<------- CLIENT_INIT (id=1) ---|  Client offer relayed
//!    |<------- CLIENT_INIT (id=2) ---|  (many exchanges may be in flight)
//!    |-------- INIT_RESPONSE (id=2)->|  Agent answer, matched by id
//!    |-------- INIT_RESPONSE (id=1)->|
//!    |                                |
//!    |<------- ERROR (code) ---------|  Any violation, then the socket closes
//! ```
//!
//! ## Error Codes
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 101  | Frame failed to decode                              |
//! | 102  | Message type not accepted from agents               |
//! | 103  | `INIT_RESPONSE` for an unknown or expired exchange  |
//! | 104  | `AGENT_HELLO` after the handshake completed         |
//! | 105  | `AGENT_HELLO` from an agent the directory rejects   |
//!
//! ## Exchange IDs
//!
//! Each session issues exchange IDs from its own counter, starting at 1 and
//! strictly increasing. IDs are never reused within a session, even after the
//! exchange was answered, expired or failed. ID 0 marks uncorrelated messages.

mod codec;
mod engine;
mod message;
mod session;

pub use codec::{decode, encode, DecodeError};
pub use engine::{CloseCause, SessionEngine};
pub use message::{
    AgentIdentity, ProtocolErrorCode, SdpPayload, ServerDescription, WireMessage, AGENT_HELLO,
    CLIENT_INIT, ERROR, INIT_RESPONSE, SERVER_HELLO,
};
pub use session::{
    AgentSession, Exchange, OutboundSink, PendingReply, ReplyReceiver, SessionState,
    FIRST_EXCHANGE_ID,
};

/// Protocol major version announced in `SERVER_HELLO`
pub const PROTOCOL_MAJOR_VERSION: u32 = 0;

/// Protocol minor version announced in `SERVER_HELLO`
pub const PROTOCOL_MINOR_VERSION: u32 = 1;
