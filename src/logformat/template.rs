// src/logformat/template.rs
use super::event::LogEvent;
use super::units::{render_latency, render_size, render_time};
use std::fmt;

/// Marker rendered in place of a placeholder whose key is not recognised.
pub const UNKNOWN_PLACEHOLDER: &str = "ERR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderKey {
    Time,
    StatusCode,
    Method,
    Path,
    ClientIp,
    Latency,
    UserAgent,
    Protocol,
    RequestSize,
    ResponseSize,
}

impl PlaceholderKey {
    pub const MANDATORY: [PlaceholderKey; 5] = [
        PlaceholderKey::Time,
        PlaceholderKey::StatusCode,
        PlaceholderKey::Method,
        PlaceholderKey::Path,
        PlaceholderKey::ClientIp,
    ];

    pub const OPTIONAL: [PlaceholderKey; 5] = [
        PlaceholderKey::Latency,
        PlaceholderKey::UserAgent,
        PlaceholderKey::Protocol,
        PlaceholderKey::RequestSize,
        PlaceholderKey::ResponseSize,
    ];

    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        let parsed = match key.as_str() {
            "time" => PlaceholderKey::Time,
            "status_code" => PlaceholderKey::StatusCode,
            "method" => PlaceholderKey::Method,
            "path" => PlaceholderKey::Path,
            "client_ip" => PlaceholderKey::ClientIp,
            "latency" => PlaceholderKey::Latency,
            "user_agent" => PlaceholderKey::UserAgent,
            "protocol" => PlaceholderKey::Protocol,
            "request_size" => PlaceholderKey::RequestSize,
            "response_size" => PlaceholderKey::ResponseSize,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderKey::Time => "time",
            PlaceholderKey::StatusCode => "status_code",
            PlaceholderKey::Method => "method",
            PlaceholderKey::Path => "path",
            PlaceholderKey::ClientIp => "client_ip",
            PlaceholderKey::Latency => "latency",
            PlaceholderKey::UserAgent => "user_agent",
            PlaceholderKey::Protocol => "protocol",
            PlaceholderKey::RequestSize => "request_size",
            PlaceholderKey::ResponseSize => "response_size",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub key: PlaceholderKey,
    pub unit: Option<String>,
}

impl Placeholder {
    /// Split `key[:unit]` on the first colon.
    pub fn parse(content: &str) -> Result<Self, String> {
        let (key, unit) = match content.split_once(':') {
            Some((key, unit)) => (key, Some(unit.to_string())),
            None => (content, None),
        };
        PlaceholderKey::parse(key)
            .map(|key| Placeholder { key, unit })
            .ok_or_else(|| key.to_string())
    }

    pub fn render(&self, event: &LogEvent) -> String {
        let unit = self.unit.as_deref();
        match self.key {
            PlaceholderKey::Time => render_time(&event.time, unit),
            PlaceholderKey::StatusCode => event.status_code.to_string(),
            PlaceholderKey::Method => event.method.clone(),
            PlaceholderKey::Path => event.path.clone(),
            PlaceholderKey::ClientIp => event.client_ip.clone(),
            PlaceholderKey::Latency => render_latency(event.latency, unit),
            PlaceholderKey::UserAgent => event.user_agent.clone(),
            PlaceholderKey::Protocol => event.protocol.clone(),
            PlaceholderKey::RequestSize => render_size(event.request_size, unit),
            PlaceholderKey::ResponseSize => render_size(event.response_size, unit),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{{{}:{}}}", self.key.as_str(), unit),
            None => write!(f, "{{{}}}", self.key.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
    Unknown(String),
}

/// Resolve the inside of a single `{...}` against an event.
pub fn resolve(content: &str, event: &LogEvent) -> String {
    match Placeholder::parse(content) {
        Ok(placeholder) => placeholder.render(event),
        Err(_) => UNKNOWN_PLACEHOLDER.to_string(),
    }
}

/// A parsed, immutable line template.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFormat {
    source: String,
    segments: Vec<Segment>,
}

impl LogFormat {
    /// Single pass over the pattern; an unterminated `{` stays literal.
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                literal.push_str(&rest[open..]);
                rest = "";
                break;
            };

            let content = &after[..close];
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(match Placeholder::parse(content) {
                Ok(placeholder) => Segment::Placeholder(placeholder),
                Err(_) => Segment::Unknown(content.to_string()),
            });
            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: pattern.to_string(),
            segments,
        }
    }

    pub fn render(&self, event: &LogEvent) -> String {
        let mut line = String::with_capacity(self.source.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Placeholder(placeholder) => line.push_str(&placeholder.render(event)),
                Segment::Unknown(_) => line.push_str(UNKNOWN_PLACEHOLDER),
            }
        }
        line
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(placeholder) => Some(placeholder),
            _ => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn event() -> LogEvent {
        LogEvent {
            time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            status_code: 404,
            method: "GET".into(),
            path: "/simple".into(),
            client_ip: "10.0.0.5".into(),
            latency: Duration::from_millis(12),
            user_agent: "curl/8.4.0".into(),
            protocol: "HTTP/1.1".into(),
            request_size: 0,
            response_size: 10_001,
        }
    }

    #[test]
    fn keys_are_case_insensitive() {
        assert_eq!(resolve("METHOD", &event()), "GET");
        assert_eq!(resolve("Status_Code", &event()), "404");
    }

    #[test]
    fn unit_split_on_first_colon() {
        let p = Placeholder::parse("time:%H:%M:%S").unwrap();
        assert_eq!(p.unit.as_deref(), Some("%H:%M:%S"));
        assert_eq!(resolve("time:%H:%M:%S", &event()), "03:04:05");
    }

    #[test]
    fn unknown_key_only_breaks_its_own_placeholder() {
        let format = LogFormat::parse("{method} {cookies} {path}");
        assert_eq!(format.render(&event()), "GET ERR /simple");
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let format = LogFormat::parse("{method} {path");
        assert_eq!(format.render(&event()), "GET {path");
    }

    #[test]
    fn substitution_is_single_pass() {
        // A value that looks like a placeholder must not be expanded again.
        let mut e = event();
        e.path = "{method}".into();
        let format = LogFormat::parse("{path} {method}");
        assert_eq!(format.render(&e), "{method} GET");
    }

    #[test]
    fn full_line_with_units() {
        let format = LogFormat::parse(
            "{client_ip} [{time:%d/%b/%Y}] \"{method} {path}\" {status_code} {latency:ms} {response_size}",
        );
        assert_eq!(
            format.render(&event()),
            "10.0.0.5 [02/Jan/2024] \"GET /simple\" 404 12 10.001kb"
        );
    }

    #[test]
    fn rendering_is_idempotent() {
        let format = LogFormat::parse("{time} {latency} {request_size} {protocol} {user_agent}");
        assert_eq!(format.render(&event()), format.render(&event().clone()));
    }

    #[test]
    fn display_round_trips_the_pattern() {
        let pattern = "{client_ip} - {time:%Y} {oops}";
        assert_eq!(LogFormat::parse(pattern).to_string(), pattern);
        assert_eq!(LogFormat::parse(pattern).placeholders().count(), 2);
    }
}
