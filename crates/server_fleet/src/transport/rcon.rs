//! Remote console transport.
//!
//! Speaks the Source RCON framing used by game servers' remote consoles:
//!
//! ```text
//! i32 LE  length of the rest of the packet
//! i32 LE  request id
//! i32 LE  packet type
//! bytes   body, NUL terminated
//! u8      0x00 pad
//! ```
//!
//! A session logs in once with the shared password and then runs one command
//! at a time, waiting for the reply carrying the same request id.

use super::{Transport, TransportKind};
use crate::broadcast;
use crate::error::{ConnectError, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Packet type of a command reply.
pub const PACKET_RESPONSE: i32 = 0;
/// Packet type of a command request. Login replies reuse the same value.
pub const PACKET_COMMAND: i32 = 2;
/// Packet type of a login request.
pub const PACKET_LOGIN: i32 = 3;
/// Request id the server answers a rejected login with.
pub const AUTH_FAILED_ID: i32 = -1;

const HEADER_LEN: usize = 8;
const MAX_PACKET_LEN: usize = 1 << 20;

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self { id, kind, body: body.into() }
    }

    /// Serializes the packet including its length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let len = (HEADER_LEN + body.len() + 2) as i32;
        let mut bytes = Vec::with_capacity(4 + len as usize);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&self.id.to_le_bytes());
        bytes.extend_from_slice(&self.kind.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    /// Reads one packet.
    ///
    /// Returns `Ok(None)` when the stream ends on a packet boundary. A stream
    /// that ends partway through a packet fails with `UnexpectedEof`.
    pub async fn read_from<R>(reader: &mut R) -> io::Result<Option<Self>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_bytes = [0u8; 4];
        let mut filled = 0;
        while filled < len_bytes.len() {
            match reader.read(&mut len_bytes[filled..]).await? {
                0 if filled == 0 => return Ok(None),
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("stream ended after {filled} of 4 length bytes"),
                    ))
                }
                n => filled += n,
            }
        }

        let len = i32::from_le_bytes(len_bytes);
        if len < (HEADER_LEN + 2) as i32 || len as usize > MAX_PACKET_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid packet length {len}"),
            ));
        }

        let mut data = vec![0u8; len as usize];
        reader.read_exact(&mut data).await?;

        let id = le_i32(&data[0..4]);
        let kind = le_i32(&data[4..8]);
        let body = &data[HEADER_LEN..];
        let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
        Ok(Some(Self {
            id,
            kind,
            body: String::from_utf8_lossy(&body[..end]).into_owned(),
        }))
    }
}

fn le_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// An authenticated remote console session.
pub struct RconTransport {
    stream: TcpStream,
    addr: SocketAddr,
    next_id: i32,
}

impl RconTransport {
    /// Opens a session to `addr` and logs in with `password`.
    ///
    /// `name` is only used to label errors.
    pub async fn connect(name: &str, addr: SocketAddr, password: &str) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectError::ConnectionRefused { addr, source })?;
        let mut transport = Self {
            stream,
            addr,
            next_id: 1,
        };
        transport.login(name, password).await?;
        Ok(transport)
    }

    /// Runs a console command and returns the reply text.
    pub async fn execute(&mut self, command: &str) -> Result<String, TransportError> {
        let id = self.next_request_id();
        self.write(&RconPacket::new(id, PACKET_COMMAND, command)).await?;
        debug!("📤 Sent RCON command #{} to {}", id, self.addr);

        loop {
            let packet = self.read().await?;
            if packet.id == id {
                return Ok(packet.body);
            }
            debug!("Skipping stray RCON packet #{} from {}", packet.id, self.addr);
        }
    }

    async fn login(&mut self, name: &str, password: &str) -> Result<(), ConnectError> {
        let id = self.next_request_id();
        self.write(&RconPacket::new(id, PACKET_LOGIN, password))
            .await
            .map_err(|e| ConnectError::Handshake(e.to_string()))?;

        loop {
            let packet = self
                .read()
                .await
                .map_err(|e| ConnectError::Handshake(e.to_string()))?;
            if packet.id == AUTH_FAILED_ID {
                return Err(ConnectError::AuthenticationFailed { name: name.to_owned() });
            }
            // Some servers send an empty response packet ahead of the login reply.
            if packet.id == id && packet.kind == PACKET_COMMAND {
                return Ok(());
            }
        }
    }

    async fn write(&mut self, packet: &RconPacket) -> Result<(), TransportError> {
        self.stream.write_all(&packet.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<RconPacket, TransportError> {
        match RconPacket::read_from(&mut self.stream).await {
            Ok(Some(packet)) => Ok(packet),
            Ok(None) => Err(TransportError::Closed),
            Err(e) if matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof) => {
                Err(TransportError::Protocol(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn next_request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }
}

#[async_trait]
impl Transport for RconTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RconSync
    }

    async fn send_command(&mut self, command: &str) -> Result<Option<Value>, TransportError> {
        self.execute(command).await.map(|reply| Some(Value::String(reply)))
    }

    async fn send_message(&mut self, message: &str) -> Result<Option<Value>, TransportError> {
        self.send_command(&broadcast::tellraw_text(message)).await
    }

    async fn send_player_list(&mut self) -> Result<Option<Value>, TransportError> {
        self.send_command("list").await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
