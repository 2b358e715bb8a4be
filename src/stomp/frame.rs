use std::fmt;

/// STOMP frame commands used by this client.
///
/// Client frames: CONNECT, SUBSCRIBE, UNSUBSCRIBE, DISCONNECT.
/// Server frames: CONNECTED, MESSAGE, RECEIPT, ERROR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl FrameCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameCommand::Connect => "CONNECT",
            FrameCommand::Connected => "CONNECTED",
            FrameCommand::Subscribe => "SUBSCRIBE",
            FrameCommand::Unsubscribe => "UNSUBSCRIBE",
            FrameCommand::Disconnect => "DISCONNECT",
            FrameCommand::Message => "MESSAGE",
            FrameCommand::Receipt => "RECEIPT",
            FrameCommand::Error => "ERROR",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(FrameCommand::Connect),
            "CONNECTED" => Some(FrameCommand::Connected),
            "SUBSCRIBE" => Some(FrameCommand::Subscribe),
            "UNSUBSCRIBE" => Some(FrameCommand::Unsubscribe),
            "DISCONNECT" => Some(FrameCommand::Disconnect),
            "MESSAGE" => Some(FrameCommand::Message),
            "RECEIPT" => Some(FrameCommand::Receipt),
            "ERROR" => Some(FrameCommand::Error),
            _ => None,
        }
    }
}

impl fmt::Display for FrameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framing errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    Empty,
    UnknownCommand(String),
    MalformedHeader(String),
    MissingNullTerminator,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Empty => write!(f, "empty frame"),
            FrameError::UnknownCommand(cmd) => write!(f, "unknown STOMP command '{}'", cmd),
            FrameError::MalformedHeader(line) => {
                write!(f, "malformed header line '{}': expected 'key:value'", line)
            }
            FrameError::MissingNullTerminator => write!(f, "frame body missing NUL terminator"),
        }
    }
}

impl std::error::Error for FrameError {}

/// A single STOMP frame.
///
/// Wire layout: `COMMAND\n` followed by `key:value\n` header lines, a blank
/// line, the body, and a NUL terminator. Header values are escaped per STOMP
/// 1.2 except on CONNECT/CONNECTED frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: FrameCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: FrameCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// First header value for `key`, if present. STOMP repeats are resolved
    /// by taking the first occurrence.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame advertising STOMP 1.2 and the client heartbeat offer.
    pub fn connect(host: &str, heartbeat_out_ms: u64, heartbeat_in_ms: u64) -> Self {
        Frame::new(FrameCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header(
                "heart-beat",
                &format!("{},{}", heartbeat_out_ms, heartbeat_in_ms),
            )
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(FrameCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(FrameCommand::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(FrameCommand::Disconnect)
    }

    /// Destination topic of a MESSAGE frame.
    pub fn destination(&self) -> Option<&str> {
        self.header_value("destination")
    }

    /// Serializes the frame to its wire form.
    pub fn serialize(&self) -> String {
        let escape = self.command != FrameCommand::Connect && self.command != FrameCommand::Connected;
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
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

    /// Parses one wire frame.
    ///
    /// Returns `Ok(None)` for a heartbeat (bare EOL). Accepts both `\n` and
    /// `\r\n` line endings and a missing trailing NUL (stompjs omits it on
    /// heartbeat-only payloads; some brokers pad after it).
    pub fn parse(raw: &str) -> Result<Option<Frame>, FrameError> {
        let trimmed_of_nul = raw.trim_end_matches(['\0', '\n', '\r']);
        if trimmed_of_nul.is_empty() {
            return if raw.is_empty() {
                Err(FrameError::Empty)
            } else {
                // EOL-only payload is a heartbeat
                Ok(None)
            };
        }

        let mut lines = raw.split('\n');
        let command_raw = lines.next().ok_or(FrameError::Empty)?;
        let command_line = command_raw.trim_end_matches('\r');
        let command = FrameCommand::from_str(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
        let unescape = command != FrameCommand::Connect && command != FrameCommand::Connected;

        let mut headers = Vec::new();
        let mut consumed = command_raw.len() + 1;
        for line in lines {
            let line_len = line.len() + 1;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                consumed += line_len;
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if unescape {
                headers.push((unescape_header(key), unescape_header(value)));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
            consumed += line_len;
        }

        let rest = &raw[consumed.min(raw.len())..];
        let body = match rest.find('\0') {
            Some(idx) => rest[..idx].to_string(),
            None => rest.to_string(),
        };

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some(other) => {
                // Unknown escape: keep as-is rather than failing the frame
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Negotiated heartbeat schedule for one connection.
///
/// `send_interval` is how often this client must emit a heartbeat;
/// `expect_interval` is the window within which the server must show life.
/// Either may be `None` when heartbeats are disabled in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPlan {
    pub send_interval: Option<std::time::Duration>,
    pub expect_interval: Option<std::time::Duration>,
}

/// Resolves the client offer `cx,cy` against the server's `heart-beat: sx,sy`.
///
/// Per STOMP 1.2: the client sends every max(cx, sy) ms if both are non-zero,
/// and expects server activity every max(cy, sx) ms if both are non-zero.
/// An absent or unparseable server header disables heartbeats entirely.
pub fn negotiate_heartbeats(
    client_out_ms: u64,
    client_in_ms: u64,
    server_header: Option<&str>,
) -> HeartbeatPlan {
    let (server_out_ms, server_in_ms) = match server_header.and_then(parse_heartbeat_header) {
        Some(pair) => pair,
        None => {
            return HeartbeatPlan {
                send_interval: None,
                expect_interval: None,
            }
        }
    };

    let send_interval = if client_out_ms > 0 && server_in_ms > 0 {
        Some(std::time::Duration::from_millis(
            client_out_ms.max(server_in_ms),
        ))
    } else {
        None
    };
    let expect_interval = if client_in_ms > 0 && server_out_ms > 0 {
        Some(std::time::Duration::from_millis(
            client_in_ms.max(server_out_ms),
        ))
    } else {
        None
    };

    HeartbeatPlan {
        send_interval,
        expect_interval,
    }
}

fn parse_heartbeat_header(header: &str) -> Option<(u64, u64)> {
    let (sx, sy) = header.split_once(',')?;
    Some((sx.trim().parse().ok()?, sy.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_serialize_subscribe() {
        let frame = Frame::subscribe("sub-0", "/topic/prices");
        assert_eq!(
            frame.serialize(),
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/prices\n\n\0"
        );
    }

    #[test]
    fn test_serialize_connect_offers_heartbeat() {
        let frame = Frame::connect("localhost", 10000, 10000);
        let wire = frame.serialize();
        assert!(wire.starts_with("CONNECT\n"));
        assert!(wire.contains("accept-version:1.2\n"));
        assert!(wire.contains("heart-beat:10000,10000\n"));
    }

    #[test]
    fn test_parse_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/bist100\nmessage-id:7\nsubscription:sub-1\n\n{\"current\":9845.3}\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.command, FrameCommand::Message);
        assert_eq!(frame.destination(), Some("/topic/bist100"));
        assert_eq!(frame.body, "{\"current\":9845.3}");
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let raw = "CONNECTED\r\nversion:1.2\r\nheart-beat:10000,10000\r\n\r\n\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.command, FrameCommand::Connected);
        assert_eq!(frame.header_value("heart-beat"), Some("10000,10000"));
    }

    #[test]
    fn test_parse_heartbeat_is_none() {
        assert_eq!(Frame::parse("\n").unwrap(), None);
        assert_eq!(Frame::parse("\r\n").unwrap(), None);
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert_eq!(Frame::parse(""), Err(FrameError::Empty));
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = Frame::parse("WIBBLE\n\n\0").unwrap_err();
        assert_eq!(err, FrameError::UnknownCommand("WIBBLE".to_string()));
    }

    #[test]
    fn test_parse_malformed_header() {
        let err = Frame::parse("MESSAGE\nno-colon-here\n\n\0").unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader(_)));
    }

    #[test]
    fn test_header_escaping_round_trip() {
        let frame = Frame::new(FrameCommand::Message).header("note", "a:b\nc\\d");
        let wire = frame.serialize();
        assert!(wire.contains("note:a\\cb\\nc\\\\d\n"));
        let parsed = Frame::parse(&wire).unwrap().unwrap();
        assert_eq!(parsed.header_value("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn test_connected_headers_not_unescaped() {
        // CONNECT/CONNECTED are exempt from escaping per STOMP 1.2
        let raw = "CONNECTED\nserver:broker\\c1\n\n\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.header_value("server"), Some("broker\\c1"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let raw = "MESSAGE\ndestination:/topic/a\ndestination:/topic/b\n\n\0";
        let frame = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.destination(), Some("/topic/a"));
    }

    #[test]
    fn test_body_without_nul_terminator() {
        let frame = Frame::parse("MESSAGE\ndestination:/topic/a\n\n[1,2]").unwrap().unwrap();
        assert_eq!(frame.body, "[1,2]");
    }

    // ── heartbeat negotiation ────────────────────────────────────────────────

    #[test]
    fn test_negotiate_symmetric() {
        let plan = negotiate_heartbeats(10000, 10000, Some("10000,10000"));
        assert_eq!(plan.send_interval, Some(Duration::from_millis(10000)));
        assert_eq!(plan.expect_interval, Some(Duration::from_millis(10000)));
    }

    #[test]
    fn test_negotiate_takes_max_of_each_direction() {
        // server wants to receive every 20s, emits every 5s
        let plan = negotiate_heartbeats(10000, 10000, Some("5000,20000"));
        assert_eq!(plan.send_interval, Some(Duration::from_millis(20000)));
        assert_eq!(plan.expect_interval, Some(Duration::from_millis(10000)));
    }

    #[test]
    fn test_negotiate_zero_disables_direction() {
        let plan = negotiate_heartbeats(10000, 10000, Some("0,10000"));
        assert_eq!(plan.send_interval, Some(Duration::from_millis(10000)));
        assert_eq!(plan.expect_interval, None);

        let plan = negotiate_heartbeats(0, 10000, Some("10000,10000"));
        assert_eq!(plan.send_interval, None);
    }

    #[test]
    fn test_negotiate_missing_header_disables_all() {
        let plan = negotiate_heartbeats(10000, 10000, None);
        assert_eq!(plan.send_interval, None);
        assert_eq!(plan.expect_interval, None);
    }

    #[test]
    fn test_negotiate_garbage_header_disables_all() {
        let plan = negotiate_heartbeats(10000, 10000, Some("fast,please"));
        assert_eq!(plan.send_interval, None);
        assert_eq!(plan.expect_interval, None);
    }
}
