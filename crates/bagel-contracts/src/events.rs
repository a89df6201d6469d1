use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Discriminator carried in the `msg` field of every queue/upload record.
///
/// Kinds this client never acts on still decode; anything the server adds
/// later lands in `Other` instead of failing the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Estimation,
    SendData,
    ProcessStarts,
    ProcessGenerating,
    ProcessCompleted,
    Heartbeat,
    CloseStream,
    Done,
    Other(String),
}

impl EventKind {
    pub fn from_msg(msg: &str) -> Self {
        match msg {
            "estimation" => Self::Estimation,
            "send_data" => Self::SendData,
            "process_starts" => Self::ProcessStarts,
            "process_generating" => Self::ProcessGenerating,
            "process_completed" => Self::ProcessCompleted,
            "heartbeat" => Self::Heartbeat,
            "close_stream" => Self::CloseStream,
            "done" => Self::Done,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Estimation => "estimation",
            Self::SendData => "send_data",
            Self::ProcessStarts => "process_starts",
            Self::ProcessGenerating => "process_generating",
            Self::ProcessCompleted => "process_completed",
            Self::Heartbeat => "heartbeat",
            Self::CloseStream => "close_stream",
            Self::Done => "done",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub event_id: Option<String>,
    /// Entire decoded JSON object, `msg` included.
    pub payload: EventPayload,
}

impl EventRecord {
    /// Builds a record from the JSON document that follows a `data: ` prefix.
    ///
    /// Non-object documents are rejected; a missing `msg` decodes as
    /// `Other("")` so that it is ignored downstream like any unknown kind.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(payload) = value else {
            return Err(serde::de::Error::custom("event record is not a JSON object"));
        };
        let kind = EventKind::from_msg(payload.get("msg").and_then(Value::as_str).unwrap_or(""));
        let event_id = payload
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            kind,
            event_id,
            payload,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::ProcessCompleted
    }
}
