//! Server-Sent Events (SSE) field parser.
//!
//! Turns lines of an SSE stream into [`SseEvent`]s. Field names are matched
//! case-insensitively; a blank line dispatches the event assembled so far.

use crate::lines::{ends_with_cr, split_lines};
use ret_types::SseEvent;

/// Incremental SSE parser that processes text into events.
///
/// Holds the unterminated tail of the last chunk, whether that chunk ended
/// in a `\r`, and the event currently being assembled. Dropping the parser discards both, so a message cut off
/// by a disconnect is never dispatched.
#[derive(Debug, Default)]
pub struct SseParser {
    carry: String,
    after_cr: bool,
    pending: Option<SseEvent>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text and return any events completed by it, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        if chunk.is_empty() {
            return Vec::new();
        }

        // The `\n` of a `\r\n` split across chunks
        let chunk = match chunk.strip_prefix('\n') {
            Some(rest) if self.after_cr => rest,
            _ => chunk,
        };

        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);
        self.after_cr = ends_with_cr(&text);

        let (lines, rest) = split_lines(&text);
        let events = lines
            .into_iter()
            .filter_map(|line| self.process_line(line))
            .collect();
        self.carry = rest.to_string();
        events
    }

    /// Apply a single line (without its terminator) to the parser state.
    ///
    /// Returns the completed event when `line` is blank and an event is in
    /// progress.
    pub fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.trim().is_empty() {
            return self.pending.take();
        }

        if line.starts_with(':') {
            tracing::trace!("SSE comment: {line}");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field.eq_ignore_ascii_case("event") {
            self.pending_mut().event_type = Some(value.to_string());
        } else if field.eq_ignore_ascii_case("data") {
            let event = self.pending_mut();
            event.data.push_str(value);
            event.data.push('\n');
        } else if field.eq_ignore_ascii_case("id") {
            self.pending_mut().last_event_id = Some(value.to_string());
        } else if field.eq_ignore_ascii_case("retry") {
            match value.trim().parse::<u64>() {
                Ok(ms) => self.pending_mut().retry_ms = Some(ms),
                Err(_) => tracing::debug!("Ignoring non-numeric SSE retry value: {value}"),
            }
        } else {
            tracing::debug!("Ignoring unknown SSE field: {line}");
        }

        None
    }

    /// Whether an event has been started but not yet dispatched.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn pending_mut(&mut self) -> &mut SseEvent {
        self.pending.get_or_insert_with(SseEvent::default)
    }
}
