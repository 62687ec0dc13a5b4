//! Turns event source notifications into terminal output and a health signal.

use ret_sse::SourceEvent;
use ret_types::{Phase, SseEvent};

/// Event type the feed sends to keep an idle connection alive.
pub const KEEP_ALIVE_EVENT: &str = "keep-alive";

/// Consecutive closes without reaching `Open` before the feed is reported unhealthy.
pub const UNHEALTHY_AFTER: u32 = 5;

pub struct FeedMonitor {
    json: bool,
    closed_without_open: u32,
}

impl FeedMonitor {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            closed_without_open: 0,
        }
    }

    /// Whether the feed has recently managed to open.
    pub fn is_healthy(&self) -> bool {
        self.closed_without_open < UNHEALTHY_AFTER
    }

    /// Handle one notification, returning the line to print, if any.
    pub fn handle(&mut self, event: SourceEvent) -> Option<String> {
        match event {
            SourceEvent::StateChanged(Phase::Open) => {
                if !self.is_healthy() {
                    tracing::warn!(
                        "Feed recovered after {} failed attempts",
                        self.closed_without_open
                    );
                }
                self.closed_without_open = 0;
                tracing::info!("Feed open");
                None
            }
            SourceEvent::StateChanged(Phase::Closed) => {
                self.closed_without_open = self.closed_without_open.saturating_add(1);
                if self.closed_without_open % UNHEALTHY_AFTER == 0 {
                    tracing::warn!(
                        "Feed has closed {} times without opening",
                        self.closed_without_open
                    );
                }
                None
            }
            SourceEvent::StateChanged(Phase::Connecting) => {
                tracing::debug!("Feed connecting");
                None
            }
            SourceEvent::EventReceived(event) if event.kind() == KEEP_ALIVE_EVENT => {
                tracing::debug!("Keep-alive received");
                None
            }
            SourceEvent::EventReceived(event) => Some(self.format(&event)),
        }
    }

    fn format(&self, event: &SseEvent) -> String {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => return line,
                Err(e) => tracing::warn!("Failed to encode event as JSON: {e}"),
            }
        }

        let data = event.data.trim_end_matches('\n');
        match &event.last_event_id {
            Some(id) => format!("[{} #{id}] {data}", event.kind()),
            None => format!("[{}] {data}", event.kind()),
        }
    }
}
