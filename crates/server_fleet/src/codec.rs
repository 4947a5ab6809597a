//! Byte-level transform applied to socket envelopes.
//!
//! Backends that dial in over the socket protocol expect every frame to pass
//! through the same reversible transform in both directions. The transform is
//! chosen once per controller and shared by every socket connection.

use crate::error::TransportError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Reversible encoding applied to serialized envelopes on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    /// Frames carry the JSON text unchanged.
    #[default]
    Plain,
    /// Frames carry the standard base64 encoding of the JSON text.
    Base64,
}

impl WireEncoding {
    /// Transforms an outgoing serialized envelope into frame text.
    pub fn encode(self, payload: &str) -> String {
        match self {
            WireEncoding::Plain => payload.to_owned(),
            WireEncoding::Base64 => STANDARD.encode(payload.as_bytes()),
        }
    }

    /// Reverses [`encode`](Self::encode) on a received frame.
    pub fn decode(self, frame: &[u8]) -> Result<String, TransportError> {
        let bytes = match self {
            WireEncoding::Plain => frame.to_vec(),
            WireEncoding::Base64 => STANDARD
                .decode(frame.trim_ascii())
                .map_err(|e| TransportError::Codec(e.to_string()))?,
        };
        String::from_utf8(bytes).map_err(|e| TransportError::Codec(e.to_string()))
    }
}
