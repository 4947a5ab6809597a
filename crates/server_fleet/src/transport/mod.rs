//! Transport layer abstractions for reaching a backend.
//!
//! A backend is reached either over a persistent socket it opened to us
//! ([`SocketTransport`]) or over a remote console session we open to it
//! ([`RconTransport`]). Both expose the same request/response surface so the
//! registry never needs to know which one it is talking to.

pub mod rcon;
pub mod socket;

pub use rcon::RconTransport;
pub use socket::SocketTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which transport a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Framed JSON envelopes over a socket the backend dialed in on.
    SocketRpc,
    /// Synchronous remote console session dialed by the controller.
    RconSync,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::SocketRpc => f.write_str("socket"),
            TransportKind::RconSync => f.write_str("rcon"),
        }
    }
}

/// A single session with a backend.
///
/// Implementations handle one request at a time: each call sends a request
/// and waits for the reply that follows it on the wire. Callers must not
/// overlap requests on the same transport.
///
/// `Ok(None)` means the backend answered but reported failure. `Err` means
/// the session itself is broken and must not be used again.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Runs a console command and returns its output.
    async fn send_command(&mut self, command: &str) -> Result<Option<Value>, TransportError>;

    /// Shows a plain chat message to every player.
    async fn send_message(&mut self, message: &str) -> Result<Option<Value>, TransportError>;

    /// Requests the list of online players.
    async fn send_player_list(&mut self) -> Result<Option<Value>, TransportError>;

    /// Closes the session. Called at most once.
    async fn close(&mut self) -> Result<(), TransportError>;
}
