use std::fmt;

use crate::errors::DecodeError;
use crate::frame::Frame;

/// Name carried by an `event:` line.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Phase change (`{ phase }`).
    Status,
    /// Free-form progress message (`{ msg }`).
    Log,
    /// Percent complete (`{ percent }`).
    Progress,
    /// Search plan text (`{ text }`).
    Plan,
    /// Sources found (`{ count, top }`).
    Sources,
    /// Terminal success carrying the report.
    Done,
    /// Terminal failure (`{ message }`).
    Error,
    /// Frame without an `event:` line.
    Message,
    /// Any other name, kept for forward compatibility.
    Other(String),
}

impl EventName {
    pub fn parse(name: &str) -> Self {
        match name {
            "status" => Self::Status,
            "log" => Self::Log,
            "progress" => Self::Progress,
            "plan" => Self::Plan,
            "sources" => Self::Sources,
            "done" => Self::Done,
            "error" => Self::Error,
            "message" => Self::Message,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Log => "log",
            Self::Progress => "progress",
            Self::Plan => "plan",
            Self::Sources => "sources",
            Self::Done => "done",
            Self::Error => "error",
            Self::Message => "message",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventName {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// A decoded frame: event name plus parsed JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub name: EventName,
    pub payload: serde_json::Value,
}

impl StreamEvent {
    pub fn new(name: impl Into<EventName>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Synthetic `error` event used for transport failures.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            EventName::Error,
            serde_json::json!({ "message": message.into() }),
        )
    }

    /// Encodes the event in wire form, delimiter included.
    pub fn to_frame_text(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.payload)
    }

    /// Decodes one frame.
    ///
    /// Lines are trimmed, `event:` sets the name (default `message`), and all
    /// `data:` fragments are joined with newlines and parsed as one JSON value.
    /// Callers treat `Err` as "no event" and keep reading.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        let mut name: Option<&str> = None;
        let mut data_lines: Vec<&str> = Vec::new();
        for raw_line in frame.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("event:") {
                name = Some(rest.trim());
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.trim_start());
            }
        }
        if data_lines.is_empty() {
            return Err(DecodeError::MissingData);
        }
        let payload = serde_json::from_str(&data_lines.join("\n"))
            .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let name = match name {
            Some(name) if !name.is_empty() => EventName::parse(name),
            _ => EventName::Message,
        };
        Ok(Self { name, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_event() {
        let frame = Frame::new("event: status\ndata: {\"phase\":\"planning\"}");
        let event = StreamEvent::decode(&frame).expect("decode");
        assert_eq!(event.name, EventName::Status);
        assert_eq!(event.payload["phase"], "planning");
    }

    #[test]
    fn missing_event_line_defaults_to_message() {
        let event = StreamEvent::decode(&Frame::new("data: {\"x\":1}")).expect("decode");
        assert_eq!(event.name, EventName::Message);
    }

    #[test]
    fn multi_line_data_is_joined_before_parsing() {
        let frame = Frame::new("event: plan\ndata: {\"text\":\ndata: \"a\"}\n");
        let event = StreamEvent::decode(&frame).expect("decode");
        assert_eq!(event.payload["text"], "a");
    }

    #[test]
    fn lines_are_trimmed_and_comments_ignored() {
        let frame = Frame::new("  : keep-alive\r\n  event:   log  \r\n  data: {\"msg\":\"hi\"}  \r");
        let event = StreamEvent::decode(&frame).expect("decode");
        assert_eq!(event.name, EventName::Log);
        assert_eq!(event.payload["msg"], "hi");
    }

    #[test]
    fn frame_without_data_yields_nothing() {
        let err = StreamEvent::decode(&Frame::new("event: status")).expect_err("no data");
        assert_eq!(err, DecodeError::MissingData);
    }

    #[test]
    fn invalid_json_yields_nothing() {
        let err = StreamEvent::decode(&Frame::new("event: log\ndata: {not json")).expect_err("bad");
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn unknown_names_are_retained() {
        let event = StreamEvent::decode(&Frame::new("event: token\ndata: \"x\"")).expect("decode");
        assert_eq!(event.name, EventName::Other("token".into()));
        assert_eq!(event.name.to_string(), "token");
    }

    #[test]
    fn wire_encoding_decodes_back() {
        let event = StreamEvent::new("progress", serde_json::json!({"percent": 40}));
        let text = event.to_frame_text();
        assert!(text.ends_with("\n\n"));
        let frame = Frame::new(text.trim_end_matches('\n'));
        assert_eq!(StreamEvent::decode(&frame).expect("decode"), event);
    }
}
