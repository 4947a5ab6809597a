//! Test doubles shared by the unit tests: a scripted transport, a fake
//! remote console and a store that counts writes.

use crate::error::{StoreError, TransportError};
use crate::store::{ConnectionParams, ConnectionStore, MemoryStore, ServerEntry};
use crate::transport::rcon::{RconPacket, AUTH_FAILED_ID, PACKET_COMMAND, PACKET_LOGIN, PACKET_RESPONSE};
use crate::transport::{Transport, TransportKind};
use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Behavior {
    /// Reply with the request text.
    Echo,
    /// Fail every request as if the peer hung up.
    Fail,
    /// Never reply.
    Hang,
}

/// Observes what a [`ScriptedTransport`] was asked to do.
#[derive(Debug, Clone, Default)]
pub(crate) struct Probe {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl Probe {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_sent(&self, count: usize) {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transport never received {count} request(s)");
    }
}

pub(crate) struct ScriptedTransport {
    behavior: Behavior,
    probe: Probe,
}

impl ScriptedTransport {
    pub(crate) fn new(behavior: Behavior) -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                behavior,
                probe: probe.clone(),
            },
            probe,
        )
    }

    async fn respond(&mut self, request: String) -> Result<Option<Value>, TransportError> {
        self.probe.sent.lock().unwrap().push(request.clone());
        match self.behavior {
            Behavior::Echo => Ok(Some(Value::String(request))),
            Behavior::Fail => Err(TransportError::Closed),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::SocketRpc
    }

    async fn send_command(&mut self, command: &str) -> Result<Option<Value>, TransportError> {
        self.respond(command.to_string()).await
    }

    async fn send_message(&mut self, message: &str) -> Result<Option<Value>, TransportError> {
        self.respond(format!("message:{message}")).await
    }

    async fn send_player_list(&mut self) -> Result<Option<Value>, TransportError> {
        self.respond("player_list".to_string()).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Accepts remote console sessions, checks the password, then echoes
/// commands back prefixed with `ran: `.
pub(crate) async fn spawn_console(password: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                while let Ok(Some(packet)) = RconPacket::read_from(&mut stream).await {
                    let reply = match packet.kind {
                        PACKET_LOGIN if packet.body == password => RconPacket::new(packet.id, PACKET_COMMAND, ""),
                        PACKET_LOGIN => RconPacket::new(AUTH_FAILED_ID, PACKET_COMMAND, ""),
                        _ => RconPacket::new(packet.id, PACKET_RESPONSE, format!("ran: {}", packet.body)),
                    };
                    if stream.write_all(&reply.encode()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// A [`MemoryStore`] that counts `append` and `save` calls.
#[derive(Debug, Default)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    appends: AtomicUsize,
    saves: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn with_entries(entries: Vec<ServerEntry>) -> Self {
        Self {
            inner: MemoryStore::with_entries(entries),
            ..Default::default()
        }
    }

    pub(crate) fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionStore for CountingStore {
    async fn servers(&self) -> Vec<ServerEntry> {
        self.inner.servers().await
    }

    async fn append(&self, name: &str, params: ConnectionParams) -> Result<(), StoreError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append(name, params).await
    }

    async fn save(&self) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save().await
    }
}
