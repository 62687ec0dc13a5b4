//! The public event source: runs the connection state machine until cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ret_types::{EventSourceError, Phase, SseEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectConfig;
use crate::state::{ConnectionState, RunContext, Step};
use crate::transport::{HttpTransport, Transport};

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(6000);

/// Notifications delivered to the consumer of an [`EventSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The state machine entered a new state.
    ///
    /// Fires on every state replacement, not only when the phase differs, so
    /// the same phase may be reported several times in a row (for example
    /// repeated `Closed` while a feed keeps failing).
    StateChanged(Phase),
    /// A complete message arrived on the stream.
    EventReceived(SseEvent),
}

struct Shared {
    phase: watch::Sender<Phase>,
    running: AtomicBool,
}

/// Resets the shared state when a run loop ends, however it ends.
struct RunGuard<'a>(&'a Shared);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.phase.send_replace(Phase::Closed);
        self.0.running.store(false, Ordering::Release);
    }
}

/// A long-lived, auto-reconnecting Server-Sent Events consumer.
///
/// Cloning yields another handle to the same source: clones share the phase
/// and the one-run-at-a-time guard.
#[derive(Clone)]
pub struct EventSource {
    url: String,
    auth_token: Option<String>,
    transport: Arc<dyn Transport>,
    reconnect: ReconnectConfig,
    connect_timeout: Duration,
    shared: Arc<Shared>,
}

impl EventSource {
    /// Create an event source for `url`, authenticating with `auth_token`
    /// as a bearer token when given.
    ///
    /// Fails if the URL is empty or not an absolute http(s) URL.
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
    ) -> Result<Self, EventSourceError> {
        let url = url.into();
        validate_url(&url)?;

        let (phase, _) = watch::channel(Phase::Closed);
        tracing::debug!("EventSource created for {url}");

        Ok(Self {
            url,
            auth_token: auth_token.filter(|t| !t.is_empty()),
            transport: Arc::new(HttpTransport::new()?),
            reconnect: ReconnectConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shared: Arc::new(Shared {
                phase,
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Replace the HTTP transport (e.g. with a scripted one in tests).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Set the delay policy between reconnect attempts.
    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Set the timeout for a single connection attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Snapshot of the current connection phase.
    pub fn phase(&self) -> Phase {
        *self.shared.phase.borrow()
    }

    /// Watch the connection phase, e.g. to await [`Phase::Open`].
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.shared.phase.subscribe()
    }

    /// Whether a run loop is currently active.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Spawn the run loop onto the tokio runtime.
    ///
    /// Returns `None` without doing anything if the source is already running.
    /// The task finishes once `cancel` is triggered and the source is closed.
    pub fn start<F>(&self, cancel: CancellationToken, on_event: F) -> Option<JoinHandle<()>>
    where
        F: FnMut(SourceEvent) + Send + 'static,
    {
        if !self.begin() {
            tracing::debug!("EventSource for {} already running", self.url);
            return None;
        }

        let source = self.clone();
        Some(tokio::spawn(async move {
            source.drive(cancel, on_event).await;
        }))
    }

    /// Run the loop on the current task until `cancel` is triggered and the
    /// source is closed.
    ///
    /// `on_event` is called synchronously on every state change and every
    /// received event, in order; the loop does not move on until it returns.
    /// Returns immediately if the source is already running.
    pub async fn run<F>(&self, cancel: CancellationToken, on_event: F)
    where
        F: FnMut(SourceEvent),
    {
        if !self.begin() {
            tracing::debug!("EventSource for {} already running", self.url);
            return;
        }
        self.drive(cancel, on_event).await;
    }

    fn begin(&self) -> bool {
        self.shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The trampoline: run the current state, swap in its successor, repeat.
    async fn drive<F>(&self, cancel: CancellationToken, mut on_event: F)
    where
        F: FnMut(SourceEvent),
    {
        let _guard = RunGuard(&self.shared);
        let ctx = RunContext {
            transport: self.transport.as_ref(),
            cancel: &cancel,
            auth_token: self.auth_token.as_deref(),
            reconnect: &self.reconnect,
            connect_timeout: self.connect_timeout,
        };

        let mut state = ConnectionState::initial(self.url.clone(), self.auth_token.clone());
        self.shared.phase.send_replace(state.phase());

        loop {
            if cancel.is_cancelled() && state.phase() == Phase::Closed {
                break;
            }

            let step = state
                .run(&ctx, &mut |event| on_event(SourceEvent::EventReceived(event)))
                .await;

            state = match step {
                Step::Stay(current) => current,
                Step::Enter(next) => {
                    let phase = next.phase();
                    let previous = self.shared.phase.send_replace(phase);
                    tracing::info!("State changed from {previous} to {phase}");
                    on_event(SourceEvent::StateChanged(phase));
                    next
                }
            };
        }

        tracing::debug!("EventSource for {} stopped", self.url);
    }
}

/// Reject URLs that could never be connected to.
fn validate_url(url: &str) -> Result<(), EventSourceError> {
    let invalid = |message: &str| EventSourceError::InvalidUrl {
        url: url.to_string(),
        message: message.to_string(),
    };

    if url.trim().is_empty() {
        return Err(invalid("URL is empty"));
    }

    let parsed = reqwest::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(&format!("unsupported scheme '{scheme}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty_url() {
        let err = EventSource::new("", None).err().unwrap();
        assert!(matches!(err, EventSourceError::InvalidUrl { .. }));
    }

    #[test]
    fn new_rejects_relative_url() {
        assert!(EventSource::new("/events", None).is_err());
    }

    #[test]
    fn new_rejects_non_http_scheme() {
        let err = EventSource::new("ftp://feed.example.com/", None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));
    }

    #[test]
    fn new_starts_closed() {
        let source = EventSource::new("https://feed.example.com/", Some("secret".into())).unwrap();
        assert_eq!(source.phase(), Phase::Closed);
        assert!(!source.is_running());
        assert_eq!(source.url(), "https://feed.example.com/");
        assert_eq!(source.auth_token(), Some("secret"));
    }

    #[test]
    fn empty_token_is_no_token() {
        let source = EventSource::new("https://feed.example.com/", Some(String::new())).unwrap();
        assert_eq!(source.auth_token(), None);
    }

    #[tokio::test]
    async fn run_with_cancelled_token_returns_at_once() {
        let source = EventSource::new("https://feed.example.com/", None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut seen = Vec::new();
        source.run(cancel, |event| seen.push(event)).await;

        assert!(seen.is_empty());
        assert_eq!(source.phase(), Phase::Closed);
        assert!(!source.is_running());
    }

    #[test]
    fn source_event_equality() {
        assert_eq!(
            SourceEvent::StateChanged(Phase::Open),
            SourceEvent::StateChanged(Phase::Open)
        );
        assert_ne!(
            SourceEvent::StateChanged(Phase::Open),
            SourceEvent::StateChanged(Phase::Closed)
        );
    }
}
