//! Error types for the server fleet.
//!
//! Failures are split by the point at which they happen:
//!
//! * [`ConnectError`] - opening a session to a backend. Reported to the caller.
//! * [`TransportError`] - a send/receive exchange on an established session.
//!   These never leave [`ServerConnection`](crate::ServerConnection); they are
//!   logged, flip the connection to not-live and become an absent result.
//! * [`StoreError`] - reading or writing persisted connection parameters.
//! * [`ServerError`] - the inbound listener (bind, accept, handshake).

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Failure to establish a session with a backend.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Nothing is accepting connections at the configured endpoint.
    #[error("connection refused by {addr}: {source}")]
    ConnectionRefused {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The remote console rejected the shared secret.
    #[error("remote console for server [{name}] rejected the password")]
    AuthenticationFailed { name: String },

    /// The session opened but the initial exchange did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Failure while exchanging a request/response on a live session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer closed the session, or it was closed locally while a request
    /// was waiting for its reply.
    #[error("transport closed")]
    Closed,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wire decoding failed: {0}")]
    Codec(String),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Failure reading or writing the connection parameter store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("store could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Listener-level failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket creation, binding or accepting failed.
    #[error("network error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(String),
}
