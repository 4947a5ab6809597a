//! # Server Fleet - Remote Backend Control
//!
//! Drives a fleet of game-server backends from a single controller process.
//! Every backend, whatever protocol it speaks, is exposed through the same
//! "execute command / broadcast message" surface.
//!
//! ## Transports
//!
//! * **Socket RPC** - The backend opens a WebSocket to the controller's
//!   [`SocketListener`] and answers JSON envelopes `{type, data}` with
//!   `{success, data}`. Frames pass through a [`WireEncoding`].
//! * **Remote console** - The controller dials the backend's RCON port with
//!   a shared password and runs commands synchronously.
//!
//! Both sit behind the [`Transport`] trait, so the [`ServerRegistry`] never
//! branches on which one a server uses.
//!
//! ## Addressing
//!
//! Commands go to every live server or to one [`Target`]: a literal name, or a
//! 1-based ordinal into the persisted server list held by a
//! [`ConnectionStore`]. Digit-only strings are ordinals.
//!
//! ```rust,no_run
//! use server_fleet::{Execution, MemoryStore, RegistryConfig, ServerRegistry, Target};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let registry = ServerRegistry::new(RegistryConfig::default(), Arc::new(MemoryStore::new()));
//! registry.init().await;
//!
//! if let Execution::One(Some(players)) = registry.execute("list", Some(&Target::from("1"))).await {
//!     println!("{players}");
//! }
//! registry.broadcast("Bot", Some("Alice"), Some("hi"), None).await;
//! registry.unload_all().await;
//! # }
//! ```
//!
//! ## Failure Model
//!
//! Offline servers, unknown targets and broken sessions never surface as
//! errors from routing calls. A failed exchange is logged, the connection is
//! marked not-live for good and the caller gets `None`. Only connecting can
//! fail loudly, with a [`ConnectError`].

pub use broadcast::BroadcastColors;
pub use codec::WireEncoding;
pub use config::RegistryConfig;
pub use connection::ServerConnection;
pub use error::{ConnectError, ServerError, StoreError, TransportError};
pub use listener::SocketListener;
pub use registry::{Execution, Responses, ServerRegistry, ServerStatus};
pub use store::{ConnectionParams, ConnectionStore, MemoryStore, ServerEntry, TomlFileStore};
pub use target::Target;
pub use transport::{Transport, TransportKind};

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod registry;
pub mod store;
pub mod target;
pub mod transport;

#[cfg(test)]
mod testing;
