//! Inbound socket listener.
//!
//! Socket backends dial the controller rather than the other way round. Each
//! one opens a WebSocket and identifies itself with request headers:
//!
//! * `name` - required, the server name it registers under
//! * `type` - optional, the backend variant (e.g. `paper`, `velocity`)
//!
//! A handshake without a usable `name` is refused with `400 Bad Request`.

use crate::error::ServerError;
use crate::registry::ServerRegistry;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

/// Header carrying the backend's server name.
pub const NAME_HEADER: &str = "name";
/// Header carrying the backend's declared variant.
pub const TYPE_HEADER: &str = "type";

const LISTEN_BACKLOG: i32 = 1024;

/// Accepts WebSocket connections from backends and hands them to the
/// registry.
pub struct SocketListener {
    registry: Arc<ServerRegistry>,
    bind_address: SocketAddr,
    shutdown_sender: broadcast::Sender<()>,
    stopping: AtomicBool,
}

impl SocketListener {
    pub fn new(registry: Arc<ServerRegistry>, bind_address: SocketAddr) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            registry,
            bind_address,
            shutdown_sender,
            stopping: AtomicBool::new(false),
        }
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Creates the listening socket with `SO_REUSEADDR` set.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let socket = Socket::new(Domain::for_address(self.bind_address), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Network(format!("Setting SO_REUSEADDR failed: {e}")))?;

        socket
            .bind(&self.bind_address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener
            .set_nonblocking(true)
            .map_err(|e| ServerError::Network(format!("Setting non-blocking mode failed: {e}")))?;

        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))?;
        info!("✅ Listening for backends on {}", self.bind_address);
        Ok(listener)
    }

    /// Binds and serves until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener.
    ///
    /// Each connection is handshaken on its own task, so a slow backend never
    /// holds up the others.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            return Ok(());
        }

        let result = loop {
            tokio::select! {
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received, no longer accepting backends");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let registry = self.registry.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, registry).await {
                                warn!("⚠️ Rejected backend connection from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break Err(ServerError::Network(format!("Accept failed: {e}")));
                    }
                }
            }
        };

        info!("Listener on {} stopped", self.bind_address);
        result
    }

    /// Stops the accept loop. Established connections stay up.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_sender.send(());
    }
}

/// Identity a backend presented during the handshake.
#[derive(Debug, Default)]
struct Handshake {
    name: Option<String>,
    server_type: Option<String>,
}

fn header(request: &Request, key: &str) -> Option<String> {
    request
        .headers()
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ServerRegistry>,
) -> Result<(), ServerError> {
    debug!("Incoming backend connection from {}", addr);

    let mut handshake = Handshake::default();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        handshake.name = header(request, NAME_HEADER);
        handshake.server_type = header(request, TYPE_HEADER);
        if handshake.name.is_none() {
            let mut rejection = ErrorResponse::new(Some(format!("missing `{NAME_HEADER}` header")));
            *rejection.status_mut() = StatusCode::BAD_REQUEST;
            return Err(rejection);
        }
        Ok(response)
    };

    let websocket = accept_hdr_async(stream, callback)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let name = handshake
        .name
        .ok_or_else(|| ServerError::Internal("handshake accepted without a name".to_string()))?;
    info!(
        "🔗 Backend [{}] ({}) connected from {}",
        name,
        handshake.server_type.as_deref().unwrap_or("unknown type"),
        addr
    );
    registry
        .attach_socket(&name, websocket, handshake.server_type, true)
        .await;
    Ok(())
}
