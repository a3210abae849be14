use std::fmt;

use super::{heartbeat::HeartBeat, ACCEPT_VERSION};
use crate::error::{ChatLinkError, Result};

/// STOMP frame commands, client and server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Ack => "ACK",
            StompCommand::Nack => "NACK",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let cmd = match s {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "ACK" => StompCommand::Ack,
            "NACK" => StompCommand::Nack,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            _ => return None,
        };
        Some(cmd)
    }

    /// `CONNECT` and `CONNECTED` headers are never escaped (STOMP 1.2).
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame.
///
/// Headers keep their wire order; when a header repeats, the first
/// occurrence is the one that counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

fn malformed(reason: impl Into<String>) -> ChatLinkError {
    ChatLinkError::MalformedFrame {
        channel: "transport".to_string(),
        reason: reason.into(),
    }
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ── Client frames ───────────────────────────────────────────────────

    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(StompCommand::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", heart_beat.header_value())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    /// A `SEND` carrying a JSON body.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    // ── Server frames ───────────────────────────────────────────────────

    pub fn connected(heart_beat: HeartBeat) -> Self {
        Self::new(StompCommand::Connected)
            .with_header("version", "1.2")
            .with_header("heart-beat", heart_beat.header_value())
    }

    pub fn message(subscription: &str, destination: &str, message_id: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(StompCommand::Message)
            .with_header("subscription", subscription)
            .with_header("destination", destination)
            .with_header("message-id", message_id)
            .with_header("content-type", "application/json")
            .with_header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn error(message: &str) -> Self {
        Self::new(StompCommand::Error).with_header("message", message)
    }

    /// Human-readable reason carried by an `ERROR` frame.
    pub fn error_message(&self) -> String {
        match self.header("message") {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ if !self.body.is_empty() => self.body.clone(),
            _ => "broker reported an error".to_string(),
        }
    }

    // ── Codec ───────────────────────────────────────────────────────────

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame from a WebSocket text payload.
    ///
    /// Returns `Ok(None)` for a heart-beat (a payload made only of EOLs).
    /// Frames after the first are ignored with a warning; use
    /// [`decode_all`](StompFrame::decode_all) for payloads that batch frames.
    pub fn decode(raw: &str) -> Result<Option<StompFrame>> {
        let Some((frame, rest)) = Self::decode_next(raw)? else {
            return Ok(None);
        };
        let trailing = rest.trim_matches(|c| c == '\r' || c == '\n');
        if !trailing.is_empty() {
            log::warn!(
                "[chat-link] Ignoring {} trailing bytes after {} frame",
                trailing.len(),
                frame.command
            );
        }
        Ok(Some(frame))
    }

    /// Decode every frame in a WebSocket text payload, in order.
    ///
    /// Heart-beat EOLs between frames are skipped. Decoding stops at the
    /// first malformed frame, which is returned as the last item.
    pub fn decode_all(raw: &str) -> Vec<Result<StompFrame>> {
        let mut frames = Vec::new();
        let mut rest = raw;
        loop {
            match Self::decode_next(rest) {
                Ok(Some((frame, next))) => {
                    frames.push(Ok(frame));
                    rest = next;
                },
                Ok(None) => break,
                Err(e) => {
                    frames.push(Err(e));
                    break;
                },
            }
        }
        frames
    }

    /// Next frame in `raw` and whatever follows its NUL terminator.
    fn decode_next(raw: &str) -> Result<Option<(StompFrame, &str)>> {
        let trimmed = raw.trim_start_matches(|c| c == '\r' || c == '\n');
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) =
            split_line(trimmed).ok_or_else(|| malformed("missing command line"))?;
        let command = StompCommand::parse(command_line)
            .ok_or_else(|| malformed(format!("unknown command '{}'", command_line)))?;
        let escape = command.escapes_headers();

        let mut frame = StompFrame::new(command);
        loop {
            let (line, next) =
                split_line(rest).ok_or_else(|| malformed("unterminated header block"))?;
            rest = next;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("header without ':' in '{}'", line)))?;
            if escape {
                frame.headers.push((unescape(name)?, unescape(value)?));
            } else {
                frame.headers.push((name.to_string(), value.to_string()));
            }
        }

        let body_len = match frame.header("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| malformed(format!("invalid content-length '{}'", len)))?;
                if rest.as_bytes().get(len) != Some(&0) {
                    return Err(malformed("body does not match content-length"));
                }
                len
            },
            None => rest
                .find('\0')
                .ok_or_else(|| malformed("missing NUL terminator"))?,
        };
        let body = rest
            .get(..body_len)
            .ok_or_else(|| malformed("content-length splits a UTF-8 character"))?;
        frame.body = body.to_string();
        Ok(Some((frame, &rest[body_len + 1..])))
    }
}

fn split_line(s: &str) -> Option<(&str, &str)> {
    let idx = s.find('\n')?;
    let line = &s[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &s[idx + 1..]))
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> Result<String> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(malformed(format!("undefined escape '\\{}'", other)));
            },
            None => return Err(malformed("dangling '\\' in header")),
        }
    }
    Ok(out)
}
