//! Realtime connection management.
//!
//! This module contains:
//! - [`transport`]: the `Connector` / `Transport` seam
//! - [`websocket`]: STOMP over `tokio-tungstenite` (URL resolution,
//!   handshake, heart-beats)
//! - [`manager`]: the single shared connection with lazy connect,
//!   auto-reconnect and transport-level subscription routing

pub mod manager;
pub mod transport;
pub mod websocket;

pub use manager::{ConnectionManager, ConnectionState};
pub(crate) use manager::InboundFrame;
pub use transport::{Connector, Transport};
pub use websocket::{resolve_ws_url, WebSocketConnector, WebSocketTransport};

/// Capacity of each per-subscription frame channel.
pub(crate) const DEFAULT_FRAME_CHANNEL_CAPACITY: usize = 1024;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
