//! STOMP 1.2 framing for the realtime transport.
//!
//! The chat broker speaks STOMP over WebSocket: every WebSocket text message
//! carries one frame (or a bare EOL heart-beat).
//!
//! - [`frame`]: frame model, encoder and decoder
//! - [`heartbeat`]: `heart-beat` header parsing and negotiation

pub mod frame;
pub mod heartbeat;

pub use frame::{StompCommand, StompFrame};
pub use heartbeat::HeartBeat;

/// STOMP protocol versions offered in the `CONNECT` frame.
pub const ACCEPT_VERSION: &str = "1.2,1.1";
