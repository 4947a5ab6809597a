//! Socket transport: JSON envelopes over a WebSocket the backend opened.

use super::{Transport, TransportKind};
use crate::codec::WireEncoding;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// A WebSocket session with a backend that dialed in to the controller.
///
/// Each request is written as one text frame holding the encoded
/// [`RequestEnvelope`]; the next data frame received is taken as its reply.
/// Ping and pong frames in between are skipped.
pub struct SocketTransport<S> {
    stream: WebSocketStream<S>,
    encoding: WireEncoding,
}

impl<S> SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-accepted WebSocket stream.
    pub fn new(stream: WebSocketStream<S>, encoding: WireEncoding) -> Self {
        Self { stream, encoding }
    }

    /// Sends one envelope and waits for the reply that follows it.
    ///
    /// Returns the reply's `data` when the backend reports success.
    pub async fn request(&mut self, envelope: &RequestEnvelope) -> Result<Option<Value>, TransportError> {
        let payload = serde_json::to_string(envelope)?;
        self.stream
            .send(Message::Text(self.encoding.encode(&payload).into()))
            .await
            .map_err(map_ws_error)?;
        debug!("📤 Sent {:?} envelope, awaiting reply", envelope.kind);

        let frame = self.next_data_frame().await?;
        let text = self.encoding.decode(&frame)?;
        let response: ResponseEnvelope = serde_json::from_str(&text)?;
        if !response.success {
            debug!("Backend reported failure for {:?} envelope", envelope.kind);
        }
        Ok(response.into_data())
    }

    async fn next_data_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(map_ws_error(e)),
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes.to_vec()),
                Some(Ok(Message::Close(_))) => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
            }
        }
    }
}

fn map_ws_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::WebSocket(other),
    }
}

#[async_trait]
impl<S> Transport for SocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> TransportKind {
        TransportKind::SocketRpc
    }

    async fn send_command(&mut self, command: &str) -> Result<Option<Value>, TransportError> {
        let data = self.request(&RequestEnvelope::command(command)).await?;
        Ok(data.filter(|data| !is_empty_payload(data)).map(|data| {
            data.get("response")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()))
        }))
    }

    async fn send_message(&mut self, message: &str) -> Result<Option<Value>, TransportError> {
        self.request(&RequestEnvelope::message(message)).await
    }

    async fn send_player_list(&mut self) -> Result<Option<Value>, TransportError> {
        self.request(&RequestEnvelope::player_list()).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// A successful reply whose `data` carries nothing counts as no result.
fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
