//! Shared types and error hierarchy for RET.

pub mod error;
pub mod event;

pub use error::{ConfigError, EventSourceError, TransportError};
pub use event::{Phase, SseEvent};
