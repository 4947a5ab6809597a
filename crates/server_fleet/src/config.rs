//! Registry configuration types and defaults.

use crate::broadcast::BroadcastColors;
use crate::codec::WireEncoding;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Configuration shared by every connection in a [`ServerRegistry`](crate::ServerRegistry).
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Host every remote console is dialed on; only the port varies per server.
    pub rcon_host: IpAddr,

    /// Upper bound on a single request/response exchange, and on opening a
    /// remote console session.
    pub request_timeout: Duration,

    /// Transform applied to socket envelopes in both directions.
    pub wire_encoding: WireEncoding,

    /// Segment colors for chat broadcasts.
    pub colors: BroadcastColors,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rcon_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            request_timeout: Duration::from_secs(10),
            wire_encoding: WireEncoding::Plain,
            colors: BroadcastColors::default(),
        }
    }
}
