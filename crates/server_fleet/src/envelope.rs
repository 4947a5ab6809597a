//! Envelope types for the socket protocol.
//!
//! Every request sent to a socket backend is wrapped in a [`RequestEnvelope`]
//! and answered with exactly one [`ResponseEnvelope`]. Replies carry no
//! request identifier; they are matched to requests by order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kinds of request a socket backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Run a console command; the reply's `data.response` holds its output.
    Command,
    /// Show a chat message to every player on the backend.
    Message,
    /// Ask for the list of online players.
    PlayerList,
}

/// A request sent from the controller to a socket backend.
///
/// ```json
/// { "type": "command", "data": { "command": "list" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub data: Value,
}

impl RequestEnvelope {
    pub fn command(command: &str) -> Self {
        Self {
            kind: RequestKind::Command,
            data: serde_json::json!({ "command": command }),
        }
    }

    pub fn message(message: &str) -> Self {
        Self {
            kind: RequestKind::Message,
            data: serde_json::json!({ "message": message }),
        }
    }

    pub fn player_list() -> Self {
        Self {
            kind: RequestKind::PlayerList,
            data: Value::Object(Default::default()),
        }
    }
}

/// A reply from a socket backend.
///
/// Only replies with `success == true` carry usable data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Value,
}

impl ResponseEnvelope {
    /// Returns the payload of a successful reply.
    pub fn into_data(self) -> Option<Value> {
        self.success.then_some(self.data)
    }
}
