//! STOMP 1.2 text frame codec.
//!
//! A frame is `COMMAND\n(header:value\n)*\nbody\0`. Header values are escaped
//! (`\\`, `\n`, `\r`, `\c`) on every command except CONNECT and CONNECTED.
//! A bare EOL is a heart-beat and decodes to nothing.

use std::fmt;

use crate::shared::error::{SyncError, SyncResult};

/// STOMP protocol version spoken by the client
pub const STOMP_VERSION: &str = "1.2";

/// Frame command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(raw: &str) -> SyncResult<Self> {
        Ok(match raw {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            other => return Err(SyncError::serialization(format!("unknown STOMP command '{}'", other))),
        })
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, token: Option<&str>) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(token) = token {
            frame = frame.header("Authorization", format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize to wire text, NUL-terminated
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text. Returns `Ok(None)` for a heart-beat.
    pub fn parse(raw: &str) -> SyncResult<Option<Self>> {
        Ok(Self::parse_next(raw)?.map(|(frame, _)| frame))
    }

    /// Parse every frame carried by one transport message. Heart-beats are
    /// skipped; a malformed frame is reported and parsing resumes after its NUL.
    pub fn parse_all(raw: &str) -> Vec<SyncResult<Self>> {
        let mut frames = Vec::new();
        let mut rest = raw;
        loop {
            match Self::parse_next(rest) {
                Ok(Some((frame, next))) => {
                    frames.push(Ok(frame));
                    rest = next;
                }
                Ok(None) => break,
                Err(e) => {
                    frames.push(Err(e));
                    match rest.find('\0') {
                        Some(end) => rest = &rest[end + 1..],
                        None => break,
                    }
                }
            }
        }
        frames
    }

    /// First frame of `raw` and the text after its terminator
    fn parse_next(raw: &str) -> SyncResult<Option<(Self, &str)>> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() {
            return Ok(None);
        }

        let (head, body) = split_head(raw)
            .ok_or_else(|| SyncError::serialization("STOMP frame without header terminator"))?;

        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
        let command_line = lines.next().unwrap_or_default();
        let command = Command::parse(command_line)?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| SyncError::serialization(format!("malformed STOMP header '{}'", line)))?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };
        let declared = frame
            .get_header("content-length")
            .and_then(|len| len.trim().parse::<usize>().ok());
        let (content, rest) = match declared {
            Some(len) if len <= body.len() && body.is_char_boundary(len) => {
                let after = &body[len..];
                (&body[..len], after.strip_prefix('\0').unwrap_or(after))
            }
            _ => match body.find('\0') {
                Some(end) => (&body[..end], &body[end + 1..]),
                None => (body, ""),
            },
        };
        frame.body = content.to_string();

        Ok(Some((frame, rest)))
    }
}

/// Split off the header block, stopping at this frame's NUL
fn split_head(raw: &str) -> Option<(&str, &str)> {
    let nul = raw.find('\0');
    let blank = [("\n\n", 2), ("\r\n\r\n", 4)]
        .into_iter()
        .filter_map(|(separator, len)| raw.find(separator).map(|idx| (idx, len)))
        .min_by_key(|(idx, _)| *idx);
    match blank {
        Some((idx, len)) if nul.map_or(true, |nul| idx < nul) => Some((&raw[..idx], &raw[idx + len..])),
        _ => {
            // A frame with no headers and no body may end right after the command
            let end = nul.unwrap_or(raw.len());
            let head = raw[..end].trim_end_matches(['\r', '\n']);
            if head.contains('\n') {
                return None;
            }
            Some((head, &raw[end..]))
        }
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> SyncResult<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(SyncError::serialization(format!(
                    "invalid STOMP header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
