//! End-to-end tests over loopback sockets.
//!
//! Socket backends are simulated by WebSocket clients that dial the
//! controller's listener and answer envelopes; remote consoles by a small
//! RCON server.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use server_fleet::transport::rcon::{RconPacket, AUTH_FAILED_ID, PACKET_COMMAND, PACKET_LOGIN, PACKET_RESPONSE};
use server_fleet::{
    ConnectionParams, ConnectionStore, Execution, MemoryStore, RegistryConfig, ServerRegistry, SocketListener,
    Target, TransportKind, WireEncoding,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Backend = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Controller {
    registry: Arc<ServerRegistry>,
    store: Arc<MemoryStore>,
    listener: Arc<SocketListener>,
    addr: SocketAddr,
    serving: JoinHandle<()>,
}

impl Controller {
    async fn start(config: RegistryConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ServerRegistry::new(config, store.clone()));
        let listener = Arc::new(SocketListener::new(registry.clone(), "127.0.0.1:0".parse().unwrap()));
        let bound = listener.bind().expect("bind listener");
        let addr = bound.local_addr().unwrap();

        let serving = {
            let listener = listener.clone();
            tokio::spawn(async move {
                listener.serve(bound).await.expect("accept loop failed");
            })
        };

        Self {
            registry,
            store,
            listener,
            addr,
            serving,
        }
    }

    async fn stop(self) {
        self.listener.shutdown();
        timeout(Duration::from_secs(1), self.serving)
            .await
            .expect("listener did not stop")
            .unwrap();
        self.registry.unload_all().await;
    }

    /// Waits until `name` resolves to a live connection.
    async fn wait_for(&self, name: &str) {
        for _ in 0..200 {
            if self.registry.resolve(&Target::from(name)).await.is_some() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("server [{name}] never came online");
    }
}

async fn dial(addr: SocketAddr, name: Option<&str>, server_type: Option<&str>) -> Result<Backend, WsError> {
    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    if let Some(name) = name {
        request.headers_mut().insert("name", HeaderValue::from_str(name).unwrap());
    }
    if let Some(server_type) = server_type {
        request.headers_mut().insert("type", HeaderValue::from_str(server_type).unwrap());
    }
    connect_async(request).await.map(|(stream, _)| stream)
}

/// Answers envelopes until the controller closes the socket.
///
/// Commands are answered with `"<name>: <command>"`, messages are echoed and
/// the player list is a fixed pair of names. A command of `fail` gets an
/// unsuccessful reply.
fn serve_backend(name: &'static str, mut backend: Backend, encoding: WireEncoding) -> JoinHandle<Vec<Value>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(Ok(frame)) = backend.next().await {
            let text = match frame {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Close(_) => break,
                _ => continue,
            };
            let request: Value = serde_json::from_str(&encoding.decode(text.as_bytes()).unwrap()).unwrap();

            let reply = match request["type"].as_str() {
                Some("command") if request["data"]["command"] == "fail" => json!({ "success": false }),
                Some("command") => {
                    let command = request["data"]["command"].as_str().unwrap_or_default();
                    json!({ "success": true, "data": { "response": format!("{name}: {command}") } })
                }
                Some("message") => json!({ "success": true, "data": { "echo": request["data"]["message"] } }),
                Some("player_list") => json!({ "success": true, "data": { "players": ["Alice", "Bob"] } }),
                _ => json!({ "success": false }),
            };
            seen.push(request);

            if backend
                .send(Message::Text(encoding.encode(&reply.to_string()).into()))
                .await
                .is_err()
            {
                break;
            }
        }
        seen
    })
}

async fn spawn_console(password: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                while let Ok(Some(packet)) = RconPacket::read_from(&mut stream).await {
                    let reply = match packet.kind {
                        PACKET_LOGIN if packet.body == password => RconPacket::new(packet.id, PACKET_COMMAND, ""),
                        PACKET_LOGIN => RconPacket::new(AUTH_FAILED_ID, PACKET_COMMAND, ""),
                        _ => RconPacket::new(packet.id, PACKET_RESPONSE, format!("console: {}", packet.body)),
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

#[tokio::test(flavor = "multi_thread")]
async fn test_socket_backend_registers_and_answers() {
    let controller = Controller::start(RegistryConfig::default()).await;
    let backend = dial(controller.addr, Some("lobby"), Some("velocity")).await.unwrap();
    let seen = serve_backend("lobby", backend, WireEncoding::Plain);
    controller.wait_for("lobby").await;

    let connection = controller.registry.connection("lobby").await.unwrap();
    assert_eq!(connection.kind(), TransportKind::SocketRpc);
    assert_eq!(connection.server_type(), Some("velocity"));

    let result = controller.registry.execute("list", Some(&Target::from("lobby"))).await;
    assert_eq!(result, Execution::One(Some(json!("lobby: list"))));

    assert_eq!(connection.send_player_list().await, Some(json!({ "players": ["Alice", "Bob"] })));
    assert_eq!(connection.send_message("hello").await, Some(json!({ "echo": "hello" })));
    assert_eq!(connection.send_command("fail").await, None);
    assert!(connection.is_live());

    // Socket backends are persisted on connect.
    assert_eq!(
        controller.store.servers().await[0].params,
        ConnectionParams::Socket {
            server_type: Some("velocity".to_string())
        }
    );

    controller.stop().await;
    let seen = timeout(Duration::from_secs(1), seen).await.unwrap().unwrap();
    let kinds: Vec<_> = seen.iter().map(|r| r["type"].as_str().unwrap().to_string()).collect();
    assert_eq!(kinds, vec!["command", "player_list", "message", "command"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fan_out_across_both_transports() {
    let console = spawn_console("secret").await;
    let controller = Controller::start(RegistryConfig::default()).await;

    controller
        .registry
        .connect_rcon("survival", console.port(), "secret", true)
        .await
        .unwrap();
    let backend = dial(controller.addr, Some("lobby"), None).await.unwrap();
    serve_backend("lobby", backend, WireEncoding::Plain);
    controller.wait_for("lobby").await;

    let responses = controller.registry.execute_all("say hi").await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses["survival"], Some(json!("console: say hi")));
    assert_eq!(responses["lobby"], Some(json!("lobby: say hi")));

    // Ordinals follow connect order.
    let first = controller.registry.resolve(&Target::ByOrdinal(1)).await.unwrap();
    assert_eq!(first.name(), "survival");

    let responses = controller.registry.broadcast("Bot", Some("Alice"), Some("hi"), Some("lobby")).await;
    assert_eq!(responses.keys().collect::<Vec<_>>(), vec!["survival"]);
    let reply = responses["survival"].as_ref().unwrap().as_str().unwrap();
    assert!(reply.starts_with("console: tellraw @a ["));
    assert!(reply.contains(r#""text":"<Alice> ""#));

    let registry = controller.registry.clone();
    controller.stop().await;
    assert!(!registry.is_any_online().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_base64_wire_encoding() {
    let config = RegistryConfig {
        wire_encoding: WireEncoding::Base64,
        ..Default::default()
    };
    let controller = Controller::start(config).await;
    let backend = dial(controller.addr, Some("lobby"), None).await.unwrap();
    serve_backend("lobby", backend, WireEncoding::Base64);
    controller.wait_for("lobby").await;

    let result = controller.registry.execute("list", Some(&Target::from("1"))).await;
    assert_eq!(result, Execution::One(Some(json!("lobby: list"))));

    controller.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handshake_without_name_is_refused() {
    let controller = Controller::start(RegistryConfig::default()).await;

    match dial(controller.addr, None, Some("paper")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake without a name was accepted"),
    }
    assert!(controller.store.servers().await.is_empty());
    assert!(!controller.registry.is_any_online().await);

    controller.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_hangup_takes_server_offline() {
    let controller = Controller::start(RegistryConfig::default()).await;
    let a = dial(controller.addr, Some("a"), None).await.unwrap();
    serve_backend("a", a, WireEncoding::Plain);
    let mut b = dial(controller.addr, Some("b"), None).await.unwrap();
    controller.wait_for("a").await;
    controller.wait_for("b").await;

    b.close(None).await.unwrap();
    drop(b);

    let first = controller.registry.execute_all("list").await;
    assert_eq!(first["a"], Some(json!("a: list")));
    assert_eq!(first["b"], None);

    let second = controller.registry.execute_all("list").await;
    assert_eq!(second.keys().collect::<Vec<_>>(), vec!["a"]);
    assert!(controller.registry.resolve(&Target::ByOrdinal(2)).await.is_none());

    controller.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnecting_backend_replaces_its_old_session() {
    let controller = Controller::start(RegistryConfig::default()).await;
    let first = dial(controller.addr, Some("lobby"), None).await.unwrap();
    let old = serve_backend("lobby", first, WireEncoding::Plain);
    controller.wait_for("lobby").await;
    let old_connection = controller.registry.connection("lobby").await.unwrap();

    let second = dial(controller.addr, Some("lobby"), Some("paper")).await.unwrap();
    serve_backend("lobby", second, WireEncoding::Plain);
    for _ in 0..200 {
        if !old_connection.is_live() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(!old_connection.is_live());

    // The old backend sees its socket closed.
    timeout(Duration::from_secs(1), old).await.unwrap().unwrap();

    let current = controller.registry.connection("lobby").await.unwrap();
    assert_eq!(current.server_type(), Some("paper"));
    assert_eq!(controller.store.ordered_names().await, vec!["lobby"]);

    controller.stop().await;
}
