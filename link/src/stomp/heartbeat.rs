use std::time::Duration;

use crate::error::{ChatLinkError, Result};

/// A `heart-beat` header value: `outgoing,incoming` in milliseconds.
///
/// From the client's point of view `outgoing_ms` is how often it can send
/// and `incoming_ms` is how often it wants to receive. 0 means "cannot" /
/// "does not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Parse a `heart-beat` header value such as `"4000,4000"`.
    pub fn parse(value: &str) -> Result<Self> {
        let (out, inc) = value.split_once(',').ok_or_else(|| {
            ChatLinkError::MalformedFrame {
                channel: "heart-beat".to_string(),
                reason: format!("expected 'cx,cy', got '{}'", value),
            }
        })?;
        let parse = |s: &str| {
            s.trim().parse::<u64>().map_err(|e| ChatLinkError::MalformedFrame {
                channel: "heart-beat".to_string(),
                reason: format!("invalid interval '{}': {}", s, e),
            })
        };
        Ok(Self::new(parse(out)?, parse(inc)?))
    }

    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Effective intervals for a session, given what the client announced
    /// and what the server answered in `CONNECTED`.
    pub fn negotiate(client: HeartBeat, server: HeartBeat) -> HeartBeat {
        let outgoing_ms = if client.outgoing_ms == 0 || server.incoming_ms == 0 {
            0
        } else {
            client.outgoing_ms.max(server.incoming_ms)
        };
        let incoming_ms = if client.incoming_ms == 0 || server.outgoing_ms == 0 {
            0
        } else {
            client.incoming_ms.max(server.outgoing_ms)
        };
        HeartBeat::new(outgoing_ms, incoming_ms)
    }

    /// How often the client must send a heart-beat, if at all.
    pub fn send_interval(&self) -> Option<Duration> {
        (self.outgoing_ms > 0).then(|| Duration::from_millis(self.outgoing_ms))
    }

    /// How long the client tolerates silence before declaring the session
    /// dead: twice the negotiated incoming interval.
    pub fn receive_deadline(&self) -> Option<Duration> {
        (self.incoming_ms > 0).then(|| Duration::from_millis(self.incoming_ms * 2))
    }
}
