use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents a full message received or sent over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: ChannelEvent,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Value,
}

impl RealtimeMessage {
    /// `phx_reply` の status フィールド
    pub fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }
}

/// チャンネルイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    PostgresChanges,

    #[serde(rename = "phx_join")]
    PhoenixJoin,
    #[serde(rename = "phx_reply")]
    PhoenixReply,
    #[serde(rename = "phx_error")]
    PhoenixError,
    #[serde(rename = "phx_close")]
    PhoenixClose,
    #[serde(rename = "phx_leave")]
    PhoenixLeave,

    Heartbeat,
    Presence,
    Broadcast,
    System,

    #[serde(other)]
    Unknown,
}

impl ChannelEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::PostgresChanges => "postgres_changes",
            Self::PhoenixJoin => "phx_join",
            Self::PhoenixReply => "phx_reply",
            Self::PhoenixError => "phx_error",
            Self::PhoenixClose => "phx_close",
            Self::PhoenixLeave => "phx_leave",
            Self::Heartbeat => "heartbeat",
            Self::Presence => "presence",
            Self::Broadcast => "broadcast",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 行変更の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A single row change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: Option<String>,
    pub table: Option<String>,
    /// New row image; `Null` for deletes.
    pub record: Value,
    /// Previous row image when the table publishes one.
    pub old_record: Value,
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    /// Extracts a change from a `postgres_changes` payload (`{"data": {...}}`)
    /// or from the flat payload of the older `INSERT`/`UPDATE`/`DELETE` events.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let data = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);
        let kind = data
            .get("type")
            .or_else(|| data.get("eventType"))
            .and_then(Value::as_str)
            .and_then(ChangeKind::parse)?;

        let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            kind,
            schema: text("schema"),
            table: text("table"),
            record: data.get("record").cloned().unwrap_or(Value::Null),
            old_record: data.get("old_record").cloned().unwrap_or(Value::Null),
            commit_timestamp: text("commit_timestamp"),
        })
    }
}
