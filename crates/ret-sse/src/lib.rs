//! Auto-reconnecting Server-Sent Events client for RET.
//!
//! [`EventSource`] drives a three-phase connection state machine
//! (closed, connecting, open) against a [`Transport`], parsing the response
//! stream into [`SseEvent`](ret_types::SseEvent)s and reconnecting whenever
//! the stream fails or ends.

mod backoff;
mod lines;
mod parser;
mod source;
mod state;
mod transport;

pub use backoff::{ReconnectConfig, calculate_delay};
pub use lines::{ends_with_cr, split_lines};
pub use parser::SseParser;
pub use source::{EventSource, SourceEvent};
pub use transport::{HttpTransport, ResponseBody, ServerResponse, Transport, TransportFuture};
