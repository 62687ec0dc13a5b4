//! Connection state machine for event sources.
//!
//! Each state consumes itself when run and yields exactly one successor, so
//! an open response body lives only as long as the [`Connected`] state that
//! owns it and is released on the transition out of it.

use std::time::Duration;

use ret_types::{Phase, SseEvent, TransportError};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::backoff::{ReconnectConfig, calculate_delay};
use crate::parser::SseParser;
use crate::transport::{ServerResponse, Transport};

/// Maximum number of bytes taken from the response stream per run step.
pub(crate) const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Everything a state borrows from its event source while running.
pub(crate) struct RunContext<'a> {
    pub transport: &'a dyn Transport,
    pub cancel: &'a CancellationToken,
    /// The configured token, re-applied whenever an open stream is lost.
    pub auth_token: Option<&'a str>,
    pub reconnect: &'a ReconnectConfig,
    pub connect_timeout: Duration,
}

/// The result of running one state.
pub(crate) enum Step {
    /// The same state instance continues (an open stream with more to read).
    Stay(ConnectionState),
    /// A new state instance replaces the old one.
    Enter(ConnectionState),
}

#[cfg(test)]
impl Step {
    fn into_state(self) -> ConnectionState {
        match self {
            Step::Stay(state) | Step::Enter(state) => state,
        }
    }
}

pub(crate) enum ConnectionState {
    Disconnected(Disconnected),
    Connecting(Connecting),
    Connected(Connected),
}

impl ConnectionState {
    /// The state an event source starts in: closed, connecting without delay
    /// once run.
    pub fn initial(url: String, auth_token: Option<String>) -> Self {
        ConnectionState::Disconnected(Disconnected {
            url,
            auth_token,
            failures: 0,
            retry_hint_ms: None,
            delayed: false,
        })
    }

    pub fn phase(&self) -> Phase {
        match self {
            ConnectionState::Disconnected(_) => Phase::Closed,
            ConnectionState::Connecting(_) => Phase::Connecting,
            ConnectionState::Connected(_) => Phase::Open,
        }
    }

    /// Run this state's phase once and produce its successor.
    pub async fn run<F>(self, ctx: &RunContext<'_>, on_event: &mut F) -> Step
    where
        F: FnMut(SseEvent),
    {
        match self {
            ConnectionState::Disconnected(state) => Step::Enter(state.run(ctx).await),
            ConnectionState::Connecting(state) => Step::Enter(state.run(ctx).await),
            ConnectionState::Connected(state) => state.run(ctx, on_event).await,
        }
    }
}

/// Closed: waits out the reconnect delay, then hands over to [`Connecting`].
pub(crate) struct Disconnected {
    url: String,
    auth_token: Option<String>,
    /// Consecutive failed connection attempts since the stream was last open.
    failures: u32,
    retry_hint_ms: Option<u64>,
    /// False only for the initial state, which connects immediately.
    delayed: bool,
}

impl Disconnected {
    async fn run(self, ctx: &RunContext<'_>) -> ConnectionState {
        if ctx.cancel.is_cancelled() {
            return ConnectionState::Disconnected(self);
        }

        if self.delayed {
            let delay_ms = calculate_delay(
                ctx.reconnect,
                self.failures.saturating_sub(1),
                self.retry_hint_ms,
            );
            if delay_ms > 0 {
                tracing::debug!("Reconnecting to {} in {delay_ms}ms", self.url);
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return ConnectionState::Disconnected(self),
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
        }

        ConnectionState::Connecting(Connecting {
            url: self.url,
            auth_token: self.auth_token,
            failures: self.failures,
        })
    }
}

/// Connecting: exactly one GET per run step.
pub(crate) struct Connecting {
    url: String,
    auth_token: Option<String>,
    failures: u32,
}

impl Connecting {
    async fn run(self, ctx: &RunContext<'_>) -> ConnectionState {
        let request = ctx.transport.get(&self.url, self.auth_token.as_deref());
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            result = tokio::time::timeout(ctx.connect_timeout, request) => Some(result),
        };

        match outcome {
            _ if ctx.cancel.is_cancelled() => {
                tracing::debug!("Connection to {} cancelled", self.url);
                self.failed()
            }
            None => self.failed(),
            Some(Err(_)) => {
                tracing::warn!(
                    "Timed out connecting to {} after {}ms",
                    self.url,
                    ctx.connect_timeout.as_millis()
                );
                self.failed()
            }
            Some(Ok(Err(e))) => {
                tracing::warn!("Failed to connect to {}: {e}", self.url);
                self.failed()
            }
            Some(Ok(Ok(response))) if response.status == 200 => {
                tracing::info!("Connected to {}", response.url);
                ConnectionState::Connected(Connected::new(response))
            }
            Some(Ok(Ok(response))) => {
                tracing::warn!(
                    "Failed to connect to {}: HTTP status {}",
                    self.url,
                    response.status
                );
                self.failed()
            }
        }
    }

    fn failed(self) -> ConnectionState {
        ConnectionState::Disconnected(Disconnected {
            url: self.url,
            auth_token: self.auth_token,
            failures: self.failures.saturating_add(1),
            retry_hint_ms: None,
            delayed: true,
        })
    }
}

/// Open: owns the response and reads it one bounded chunk per run step.
pub(crate) struct Connected {
    response: ServerResponse,
    buffer: Vec<u8>,
    /// Bytes of a UTF-8 sequence cut off at the end of the last read.
    undecoded: Vec<u8>,
    parser: SseParser,
    retry_hint_ms: Option<u64>,
}

impl Connected {
    fn new(response: ServerResponse) -> Self {
        Self {
            response,
            buffer: vec![0; READ_BUFFER_SIZE],
            undecoded: Vec::new(),
            parser: SseParser::new(),
            retry_hint_ms: None,
        }
    }

    async fn run<F>(mut self, ctx: &RunContext<'_>, on_event: &mut F) -> Step
    where
        F: FnMut(SseEvent),
    {
        let read = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            read = self.response.body.read(&mut self.buffer) => Some(read),
        };

        let n = match read {
            None => {
                tracing::debug!("Event stream read cancelled");
                return Step::Enter(self.close(ctx));
            }
            Some(Err(e)) => {
                tracing::warn!("Event stream read failed: {e}");
                return Step::Enter(self.close(ctx));
            }
            Some(Ok(0)) => {
                tracing::info!("Event stream from {} ended", self.response.url);
                return Step::Enter(self.close(ctx));
            }
            Some(Ok(n)) => n,
        };
        tracing::debug!("Read {n} bytes from event stream");

        self.undecoded.extend_from_slice(&self.buffer[..n]);
        let text = match decode_utf8(&mut self.undecoded) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("{e}");
                return Step::Enter(self.close(ctx));
            }
        };

        for event in self.parser.feed(&text) {
            if ctx.cancel.is_cancelled() {
                break;
            }
            if event.retry_ms.is_some() {
                self.retry_hint_ms = event.retry_ms;
            }
            on_event(event);
        }

        if ctx.cancel.is_cancelled() {
            return Step::Enter(self.close(ctx));
        }
        Step::Stay(ConnectionState::Connected(self))
    }

    /// Drop the response and any half-parsed message.
    fn close(self, ctx: &RunContext<'_>) -> ConnectionState {
        ConnectionState::Disconnected(Disconnected {
            url: self.response.url,
            auth_token: ctx.auth_token.map(str::to_owned),
            failures: 0,
            retry_hint_ms: self.retry_hint_ms,
            delayed: true,
        })
    }
}

/// Decode as much of `pending` as forms complete UTF-8, leaving a trailing
/// incomplete sequence in place for the next read.
fn decode_utf8(pending: &mut Vec<u8>) -> Result<String, TransportError> {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => return Err(TransportError::Decode(e.to_string())),
    };

    let tail = pending.split_off(valid);
    let head = std::mem::replace(pending, tail);
    String::from_utf8(head).map_err(|e| TransportError::Decode(e.to_string()))
}
