//! Connection phases and assembled Server-Sent Events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event type reported for messages that carried no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// The connection phase of an event source. Exactly one is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not connected. Either waiting to reconnect or shut down.
    Closed,
    /// A GET request to the feed is in flight.
    Connecting,
    /// The response stream is open and being read.
    Open,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Closed => "closed",
            Phase::Connecting => "connecting",
            Phase::Open => "open",
        };
        f.write_str(name)
    }
}

/// One fully assembled SSE message.
///
/// `data` keeps the trailing newline appended after every `data:` field, so
/// `data: a` followed by `data: b` yields `"a\nb\n"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
    pub last_event_id: Option<String>,
    pub retry_ms: Option<u64>,
}

impl SseEvent {
    /// The event type, falling back to `"message"` when none was sent.
    pub fn kind(&self) -> &str {
        self.event_type.as_deref().unwrap_or(DEFAULT_EVENT_TYPE)
    }
}
