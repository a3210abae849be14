//! The seam between the connection manager and the wire.
//!
//! A [`Connector`] opens one STOMP session at a time; the resulting
//! [`Transport`] carries frames until it reports terminal failure. The
//! production implementation lives in [`super::websocket`]; tests plug in an
//! in-memory broker.

use async_trait::async_trait;

use crate::error::Result;
use crate::stomp::StompFrame;

/// One established STOMP session.
///
/// `next_frame` must be cancel-safe: the connection task polls it inside
/// `tokio::select!` and drops the future whenever a command wins the race.
#[async_trait]
pub trait Transport: Send {
    /// Write one frame.
    async fn send(&mut self, frame: StompFrame) -> Result<()>;

    /// Next inbound frame. `None` means the session closed cleanly,
    /// `Some(Err(_))` means it failed; either way the transport is done.
    async fn next_frame(&mut self) -> Option<Result<StompFrame>>;

    /// Release the session. Idempotent.
    async fn close(&mut self);
}

/// Opens sessions. Called once per connect or reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the transport handshake (including STOMP `CONNECT` →
    /// `CONNECTED`) and return the live session.
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}
