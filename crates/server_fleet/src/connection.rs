//! Live connections to backends.
//!
//! A [`ServerConnection`] owns one transport session and moves through
//! `Live -> Disconnected` exactly once. It becomes not-live when it is
//! disconnected explicitly or when any exchange fails, and never becomes live
//! again; reconnecting means building a new `ServerConnection`.

use crate::codec::WireEncoding;
use crate::error::{ConnectError, TransportError};
use crate::transport::{RconTransport, SocketTransport, Transport, TransportKind};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// One live session with a backend.
///
/// Requests on the same connection are serialized: the transport matches
/// replies to requests by order, so a second request waits for the first to
/// finish. Different connections are fully independent.
///
/// Exchanges never fail loudly. A broken or unresponsive session is logged,
/// marked not-live and reported to the caller as `None`.
pub struct ServerConnection {
    name: String,
    kind: TransportKind,
    server_type: Option<String>,
    connected_at: SystemTime,
    live: AtomicBool,
    transport: Mutex<Option<Box<dyn Transport>>>,
    closed: watch::Sender<bool>,
    request_timeout: Duration,
}

enum Request<'a> {
    Command(&'a str),
    Message(&'a str),
    PlayerList,
}

impl Request<'_> {
    async fn send(&self, transport: &mut dyn Transport) -> Result<Option<Value>, TransportError> {
        match self {
            Request::Command(command) => transport.send_command(command).await,
            Request::Message(message) => transport.send_message(message).await,
            Request::PlayerList => transport.send_player_list().await,
        }
    }
}

impl ServerConnection {
    /// Wraps an established transport session.
    pub fn new(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        server_type: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            name: name.into(),
            kind: transport.kind(),
            server_type,
            connected_at: SystemTime::now(),
            live: AtomicBool::new(true),
            transport: Mutex::new(Some(transport)),
            closed,
            request_timeout,
        }
    }

    /// Opens and authenticates a remote console session.
    ///
    /// The whole attempt is bounded by `request_timeout`.
    pub async fn connect_rcon(
        name: &str,
        addr: SocketAddr,
        password: &str,
        request_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let transport = timeout(request_timeout, RconTransport::connect(name, addr, password))
            .await
            .map_err(|_| ConnectError::Handshake(format!("no answer from {addr} within {request_timeout:?}")))??;
        Ok(Self::new(name, Box::new(transport), None, request_timeout))
    }

    /// Wraps a WebSocket the backend opened to the controller.
    pub fn from_socket<S>(
        name: impl Into<String>,
        stream: WebSocketStream<S>,
        server_type: Option<String>,
        encoding: WireEncoding,
        request_timeout: Duration,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let transport = SocketTransport::new(stream, encoding);
        Self::new(name, Box::new(transport), server_type, request_timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// The variant the backend declared when it connected, if any.
    pub fn server_type(&self) -> Option<&str> {
        self.server_type.as_deref()
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Runs a console command and returns its output.
    pub async fn send_command(&self, command: &str) -> Option<Value> {
        debug!("Executing [{}] on server [{}]", command, self.name);
        self.exchange(Request::Command(command)).await
    }

    /// Shows a plain chat message to every player on the backend.
    pub async fn send_message(&self, message: &str) -> Option<Value> {
        self.exchange(Request::Message(message)).await
    }

    /// Requests the backend's online player list.
    pub async fn send_player_list(&self) -> Option<Value> {
        self.exchange(Request::PlayerList).await
    }

    /// Marks the connection not-live and closes its transport.
    ///
    /// A request waiting for its reply is aborted and returns `None`.
    /// Calling this again is harmless; the transport is closed only once.
    pub async fn disconnect(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);

        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            self.close_transport(transport).await;
        }
        info!("✅ Disconnected from server [{}]", self.name);
    }

    async fn exchange(&self, request: Request<'_>) -> Option<Value> {
        if !self.is_live() {
            return None;
        }

        let closed = self.closed.subscribe();
        let mut guard = self.transport.lock().await;
        if !self.is_live() {
            return None;
        }
        let transport = guard.as_mut()?;

        let outcome = tokio::select! {
            biased;
            _ = wait_closed(closed) => {
                debug!("Request to server [{}] aborted by disconnect", self.name);
                return None;
            }
            result = timeout(self.request_timeout, request.send(transport.as_mut())) => {
                result.unwrap_or_else(|_| Err(TransportError::Timeout(self.request_timeout)))
            }
        };

        match outcome {
            Ok(value) => value,
            Err(error) => {
                self.live.store(false, Ordering::SeqCst);
                warn!("⚠️ Connection to server [{}] lost: {}", self.name, error);
                if let Some(transport) = guard.take() {
                    self.close_transport(transport).await;
                }
                None
            }
        }
    }

    async fn close_transport(&self, mut transport: Box<dyn Transport>) {
        match timeout(self.request_timeout, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Closing transport for server [{}] failed: {}", self.name, e),
            Err(_) => debug!("Closing transport for server [{}] timed out", self.name),
        }
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("server_type", &self.server_type)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Resolves once the close signal has been raised.
async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}
