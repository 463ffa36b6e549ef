//! Text codec for [`WireMessage`].

use thiserror::Error;

use super::message::WireMessage;

/// Inbound frame could not be turned into a [`WireMessage`].
///
/// Covers malformed JSON, a missing or unknown `command`, and missing
/// required fields. Extra fields are not an error.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

impl DecodeError {
    /// Line of the input where parsing failed
    pub fn line(&self) -> usize {
        self.source.line()
    }

    /// Column of the input where parsing failed
    pub fn column(&self) -> usize {
        self.source.column()
    }
}

/// Encode a message as a JSON text frame
pub fn encode(message: &WireMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decode a JSON text frame
pub fn decode(text: &str) -> Result<WireMessage, DecodeError> {
    Ok(serde_json::from_str(text)?)
}
