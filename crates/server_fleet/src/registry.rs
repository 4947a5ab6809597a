//! The server registry.
//!
//! [`ServerRegistry`] owns every [`ServerConnection`] the controller has made,
//! resolves [`Target`]s to live connections and fans commands out across the
//! fleet. Entries are never removed: a disconnected server keeps its slot so
//! it can still be addressed by name (and yields nothing), and the persisted
//! name order that ordinals resolve against never shifts.

use crate::broadcast;
use crate::config::RegistryConfig;
use crate::connection::ServerConnection;
use crate::error::ConnectError;
use crate::store::{ConnectionParams, ConnectionStore};
use crate::target::Target;
use crate::transport::TransportKind;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Per-server responses of a fan-out, keyed by server name.
///
/// Every server that was live when the fan-out started has a key. Its value
/// is `None` when the server answered with a failure or dropped mid-flight.
pub type Responses = BTreeMap<String, Option<Value>>;

/// Result of [`ServerRegistry::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// No target was given; one entry per live server.
    All(Responses),
    /// A single target was given. `None` covers unknown, offline and failed
    /// targets alike.
    One(Option<Value>),
}

impl Execution {
    /// Whether the execution produced no data at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Execution::All(responses) => responses.values().all(Option::is_none),
            Execution::One(value) => value.is_none(),
        }
    }
}

/// One row of [`ServerRegistry::statuses`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    /// 1-based position in the persisted list, if the server is persisted.
    pub ordinal: Option<usize>,
    /// `None` when the server is persisted but was never connected.
    pub kind: Option<TransportKind>,
    pub server_type: Option<String>,
    pub connected_at: Option<SystemTime>,
    pub live: bool,
}

/// Owns all server connections and routes commands to them.
///
/// Lifecycle operations on the same name (connect, disconnect, unload) are
/// serialized; routing reads run concurrently with everything else.
pub struct ServerRegistry {
    config: RegistryConfig,
    store: Arc<dyn ConnectionStore>,
    connections: RwLock<HashMap<String, Arc<ServerConnection>>>,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ServerRegistry {
    /// Creates an empty registry backed by `store`.
    ///
    /// Nothing is dialed until [`init`](Self::init) is called.
    pub fn new(config: RegistryConfig, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            config,
            store,
            connections: RwLock::new(HashMap::new()),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    /// Dials every persisted remote console.
    ///
    /// Socket entries are skipped; those backends dial in on their own and
    /// only contribute their position to ordinal addressing. Nothing is
    /// written back to the store.
    ///
    /// # Returns
    ///
    /// The number of servers that came up.
    pub async fn init(&self) -> usize {
        let entries = self.store.servers().await;
        let attempts = entries.iter().filter_map(|entry| match &entry.params {
            ConnectionParams::Rcon { port, password } => {
                Some(self.connect_rcon(&entry.name, *port, password, false))
            }
            ConnectionParams::Socket { .. } => None,
        });

        let results = join_all(attempts).await;
        let connected = results.iter().filter(|result| result.is_ok()).count();
        info!(
            "🔌 Connected to {} of {} remote console(s) ({} persisted server(s))",
            connected,
            results.len(),
            entries.len()
        );
        connected
    }

    /// Whether any tracked connection is live.
    pub async fn is_any_online(&self) -> bool {
        self.connections.read().await.values().any(|c| c.is_live())
    }

    /// The connection tracked under `name`, live or not.
    pub async fn connection(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.connections.read().await.get(name).cloned()
    }

    /// Resolves a target to a live connection.
    ///
    /// Ordinals are 1-based positions in the store's name list; `0` and
    /// anything past the end resolve to nothing. A name or ordinal whose
    /// connection is missing or not live also resolves to nothing.
    pub async fn resolve(&self, target: &Target) -> Option<Arc<ServerConnection>> {
        let name = match target {
            Target::ByName(name) => name.clone(),
            Target::ByOrdinal(index) => {
                let names = self.store.ordered_names().await;
                let position = index.checked_sub(1)?;
                names.into_iter().nth(position)?
            }
        };

        self.connection(&name).await.filter(|connection| connection.is_live())
    }

    /// Runs `command` on one server, or on every live server when `target`
    /// is `None`.
    ///
    /// Never fails: offline and unknown servers simply contribute nothing.
    pub async fn execute(&self, command: &str, target: Option<&Target>) -> Execution {
        match target {
            Some(target) => Execution::One(self.execute_on(command, target).await),
            None => Execution::All(self.execute_all(command).await),
        }
    }

    /// Runs `command` on the server `target` resolves to.
    pub async fn execute_on(&self, command: &str, target: &Target) -> Option<Value> {
        match self.resolve(target).await {
            Some(connection) => connection.send_command(command).await,
            None => {
                debug!("No live server matches [{}], skipping command", target);
                None
            }
        }
    }

    /// Runs `command` on every live server concurrently.
    pub async fn execute_all(&self, command: &str) -> Responses {
        let targets = self.live_connections(None).await;
        self.fan_out(targets, command).await
    }

    /// Sends a colored chat broadcast to every live server.
    ///
    /// # Arguments
    ///
    /// * `source` - Label of the origin, always shown as `[source] `
    /// * `player` - Optional speaker, shown as `<player> `
    /// * `message` - Optional message text
    /// * `except_server` - Optional name of a server to leave out, usually
    ///   the one the message came from
    ///
    /// Empty strings count as absent.
    pub async fn broadcast(
        &self,
        source: &str,
        player: Option<&str>,
        message: Option<&str>,
        except_server: Option<&str>,
    ) -> Responses {
        let command = broadcast::compose(&self.config.colors, source, player, message);
        let except = except_server.filter(|name| !name.is_empty());
        let targets = self.live_connections(except).await;
        debug!("📢 Broadcasting to {} server(s)", targets.len());
        self.fan_out(targets, &command).await
    }

    /// Opens a remote console session to `port` on the configured host.
    ///
    /// With `update` set, the parameters are appended to the store and saved
    /// once the session is up. A failed attempt is logged and returned; it is
    /// never retried.
    pub async fn connect_rcon(
        &self,
        name: &str,
        port: u16,
        password: &str,
        update: bool,
    ) -> Result<Arc<ServerConnection>, ConnectError> {
        let _guard = self.lock_name(name).await;
        let addr = SocketAddr::new(self.config.rcon_host, port);

        let connection =
            match ServerConnection::connect_rcon(name, addr, password, self.config.request_timeout).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!("❌ Failed to connect to server [{}] at {}: {}", name, addr, e);
                    return Err(e);
                }
            };

        let params = ConnectionParams::Rcon {
            port,
            password: password.to_string(),
        };
        Ok(self.insert(connection, params, update).await)
    }

    /// Registers a WebSocket a backend opened to the controller.
    pub async fn attach_socket<S>(
        &self,
        name: &str,
        stream: WebSocketStream<S>,
        server_type: Option<String>,
        update: bool,
    ) -> Arc<ServerConnection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let _guard = self.lock_name(name).await;
        let connection = ServerConnection::from_socket(
            name,
            stream,
            server_type.clone(),
            self.config.wire_encoding,
            self.config.request_timeout,
        );
        self.insert(connection, ConnectionParams::Socket { server_type }, update).await
    }

    /// Registers an already established connection.
    ///
    /// This is the common tail of every connect path and the hook for
    /// transports this crate does not ship.
    pub async fn register(
        &self,
        connection: ServerConnection,
        params: ConnectionParams,
        update: bool,
    ) -> Arc<ServerConnection> {
        let _guard = self.lock_name(connection.name()).await;
        self.insert(connection, params, update).await
    }

    /// Disconnects the server tracked under `name`.
    ///
    /// The entry stays in the registry as not-live. Returns whether a live
    /// connection was actually closed.
    pub async fn disconnect_server(&self, name: &str) -> bool {
        let _guard = self.lock_name(name).await;
        match self.connection(name).await {
            Some(connection) if connection.is_live() => {
                connection.disconnect().await;
                true
            }
            Some(_) => {
                debug!("Server [{}] is already disconnected", name);
                false
            }
            None => {
                warn!("⚠️ Cannot disconnect unknown server [{}]", name);
                false
            }
        }
    }

    /// Disconnects every live connection. Used at shutdown.
    pub async fn unload_all(&self) {
        let names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        info!("🧹 Disconnecting {} tracked server(s)", names.len());

        join_all(names.iter().map(|name| async move {
            let _guard = self.lock_name(name).await;
            if let Some(connection) = self.connection(name).await {
                if connection.is_live() {
                    connection.disconnect().await;
                }
            }
        }))
        .await;
    }

    /// One row per known server: persisted servers first in ordinal order,
    /// then servers that connected without being persisted, by name.
    pub async fn statuses(&self) -> Vec<ServerStatus> {
        let names = self.store.ordered_names().await;
        let connections = self.connections.read().await;

        let row = |name: &str, ordinal: Option<usize>| {
            let connection = connections.get(name);
            ServerStatus {
                name: name.to_string(),
                ordinal,
                kind: connection.map(|c| c.kind()),
                server_type: connection.and_then(|c| c.server_type().map(str::to_string)),
                connected_at: connection.map(|c| c.connected_at()),
                live: connection.is_some_and(|c| c.is_live()),
            }
        };

        let mut rows: Vec<ServerStatus> = names
            .iter()
            .enumerate()
            .map(|(index, name)| row(name, Some(index + 1)))
            .collect();

        let mut extra: Vec<&String> = connections.keys().filter(|name| !names.contains(*name)).collect();
        extra.sort();
        rows.extend(extra.into_iter().map(|name| row(name, None)));
        rows
    }

    async fn insert(
        &self,
        connection: ServerConnection,
        params: ConnectionParams,
        update: bool,
    ) -> Arc<ServerConnection> {
        let connection = Arc::new(connection);
        let name = connection.name().to_string();

        let previous = self
            .connections
            .write()
            .await
            .insert(name.clone(), connection.clone());
        if let Some(previous) = previous.filter(|c| c.is_live()) {
            info!("🔁 Server [{}] reconnected, closing the previous session", name);
            previous.disconnect().await;
        }

        if update {
            self.persist(&name, params).await;
        }

        info!("✅ Connected to server [{}] via {}", name, connection.kind());
        connection
    }

    async fn persist(&self, name: &str, params: ConnectionParams) {
        if let Err(e) = self.store.append(name, params).await {
            warn!("⚠️ Failed to record server [{}]: {}", name, e);
            return;
        }
        if let Err(e) = self.store.save().await {
            warn!("⚠️ Failed to save connection store: {}", e);
        }
    }

    async fn live_connections(&self, except: Option<&str>) -> Vec<Arc<ServerConnection>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_live() && Some(c.name()) != except)
            .cloned()
            .collect()
    }

    async fn fan_out(&self, targets: Vec<Arc<ServerConnection>>, command: &str) -> Responses {
        let replies = join_all(targets.iter().map(|c| c.send_command(command))).await;
        targets
            .iter()
            .map(|c| c.name().to_string())
            .zip(replies)
            .collect()
    }

    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .name_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
