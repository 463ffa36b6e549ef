//! Wire messages exchanged with agents over the session socket.
//!
//! Every frame is a JSON object tagged by its `command` field and carrying an
//! `exchangeId` (0 when the message is not part of a correlated exchange).

use std::fmt;

use serde::{Deserialize, Serialize};

/// `command` value of the server's greeting
pub const SERVER_HELLO: &str = "SERVER_HELLO";
/// `command` value of the agent's greeting
pub const AGENT_HELLO: &str = "AGENT_HELLO";
/// `command` value of a client offer pushed to the agent
pub const CLIENT_INIT: &str = "CLIENT_INIT";
/// `command` value of the agent's answer
pub const INIT_RESPONSE: &str = "INIT_RESPONSE";
/// `command` value of a protocol error
pub const ERROR: &str = "ERROR";

/// Description the server announces in `SERVER_HELLO`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescription {
    /// Human-readable server name
    pub server_name: String,
    /// Server implementation type
    pub server_type: String,
    /// Server version
    pub version: String,
    /// Protocol major version
    pub protocol_major_version: u32,
    /// Protocol minor version
    pub protocol_minor_version: u32,
}

impl Default for ServerDescription {
    fn default() -> Self {
        Self {
            server_name: "Dev server".to_string(),
            server_type: "QSP Simple Signal Server".to_string(),
            version: crate::VERSION.to_string(),
            protocol_major_version: super::PROTOCOL_MAJOR_VERSION,
            protocol_minor_version: super::PROTOCOL_MINOR_VERSION,
        }
    }
}

/// Identity an agent presents in `AGENT_HELLO`.
///
/// Set once per session, when the handshake completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    /// Agent software type
    pub agent_type: String,
    /// Display name of the agent (usually the station)
    pub agent_name: String,
    /// Agent software version
    pub version: String,
    /// Protocol major version spoken by the agent
    pub protocol_major_version: u32,
    /// Protocol minor version spoken by the agent
    pub protocol_minor_version: u32,
    /// Registered agent identifier, checked against the agent directory
    pub agent_id: String,
}

/// Opaque session description relayed verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpPayload {
    /// SDP text
    pub sdp: String,
}

/// Protocol error codes sent to agents before a forced close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorCode {
    /// Inbound frame failed to decode
    DecodeFailure,
    /// Message type not valid as inbound
    InvalidCommand,
    /// `INIT_RESPONSE` for an exchange that is not pending
    UnknownExchange,
    /// `AGENT_HELLO` after the handshake completed
    DuplicateHello,
    /// `AGENT_HELLO` from an agent the directory does not know
    UnknownAgent,
}

impl ProtocolErrorCode {
    /// Numeric code carried in `errorCode`
    pub fn code(self) -> u16 {
        match self {
            Self::DecodeFailure => 101,
            Self::InvalidCommand => 102,
            Self::UnknownExchange => 103,
            Self::DuplicateHello => 104,
            Self::UnknownAgent => 105,
        }
    }

    /// Look up a code by its numeric value
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            101 => Some(Self::DecodeFailure),
            102 => Some(Self::InvalidCommand),
            103 => Some(Self::UnknownExchange),
            104 => Some(Self::DuplicateHello),
            105 => Some(Self::UnknownAgent),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Message on the agent socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    /// Server greeting, sent as soon as the socket opens
    #[serde(rename_all = "camelCase")]
    ServerHello {
        /// Server description
        data: ServerDescription,
        /// Always 0
        #[serde(default)]
        exchange_id: u64,
    },
    /// Agent greeting, completes the handshake
    #[serde(rename_all = "camelCase")]
    AgentHello {
        /// Agent identity
        data: AgentIdentity,
        /// Usually 0
        #[serde(default)]
        exchange_id: u64,
    },
    /// Client offer pushed to the agent
    #[serde(rename_all = "camelCase")]
    ClientInit {
        /// Client SDP
        data: SdpPayload,
        /// Correlation ID
        #[serde(default)]
        exchange_id: u64,
    },
    /// Agent answer to a `ClientInit`
    #[serde(rename_all = "camelCase")]
    InitResponse {
        /// Agent SDP
        data: SdpPayload,
        /// Correlation ID of the answered `ClientInit`
        #[serde(default)]
        exchange_id: u64,
    },
    /// Protocol error
    #[serde(rename_all = "camelCase")]
    Error {
        /// Numeric error code
        error_code: u16,
        /// Human-readable detail
        #[serde(default)]
        error_message: String,
        /// Exchange the error refers to, 0 if none
        #[serde(default)]
        exchange_id: u64,
    },
}

impl WireMessage {
    /// Create a SERVER_HELLO message
    pub fn server_hello(description: ServerDescription) -> Self {
        Self::ServerHello {
            data: description,
            exchange_id: 0,
        }
    }

    /// Create an AGENT_HELLO message
    pub fn agent_hello(identity: AgentIdentity) -> Self {
        Self::AgentHello {
            data: identity,
            exchange_id: 0,
        }
    }

    /// Create a CLIENT_INIT message
    pub fn client_init(sdp: impl Into<String>, exchange_id: u64) -> Self {
        Self::ClientInit {
            data: SdpPayload { sdp: sdp.into() },
            exchange_id,
        }
    }

    /// Create an INIT_RESPONSE message
    pub fn init_response(sdp: impl Into<String>, exchange_id: u64) -> Self {
        Self::InitResponse {
            data: SdpPayload { sdp: sdp.into() },
            exchange_id,
        }
    }

    /// Create an ERROR message
    pub fn error(code: ProtocolErrorCode, message: impl Into<String>, exchange_id: u64) -> Self {
        Self::Error {
            error_code: code.code(),
            error_message: message.into(),
            exchange_id,
        }
    }

    /// Discriminator value of this message
    pub fn command(&self) -> &'static str {
        match self {
            Self::ServerHello { .. } => SERVER_HELLO,
            Self::AgentHello { .. } => AGENT_HELLO,
            Self::ClientInit { .. } => CLIENT_INIT,
            Self::InitResponse { .. } => INIT_RESPONSE,
            Self::Error { .. } => ERROR,
        }
    }

    /// Exchange ID carried by this message
    pub fn exchange_id(&self) -> u64 {
        match self {
            Self::ServerHello { exchange_id, .. }
            | Self::AgentHello { exchange_id, .. }
            | Self::ClientInit { exchange_id, .. }
            | Self::InitResponse { exchange_id, .. }
            | Self::Error { exchange_id, .. } => *exchange_id,
        }
    }

    /// Error code, for ERROR messages
    pub fn error_code(&self) -> Option<u16> {
        match self {
            Self::Error { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }
}
