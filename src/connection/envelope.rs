//! JSON message envelope carried over the real-time transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name of the identity announcement sent after every handshake.
pub const AUTHENTICATE_EVENT: &str = "authenticate";

/// A single named event on the wire: `{"event": "...", "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    /// Announcement telling the server which user owns this connection.
    #[must_use]
    pub fn authenticate(user_id: &str) -> Self {
        Self::new(AUTHENTICATE_EVENT, Value::String(user_id.to_owned()))
    }

    /// Encode into a JSON text payload.
    ///
    /// # Errors
    ///
    /// Returns a serde error if `data` holds a non-serializable map key.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns a serde error for malformed JSON or a missing `event` field.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
