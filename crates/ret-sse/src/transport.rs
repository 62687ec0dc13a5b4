//! HTTP transport boundary for event sources.
//!
//! [`Transport`] is the seam between the connection state machine and the
//! network. [`HttpTransport`] is the reqwest-backed implementation; tests
//! substitute scripted transports.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures_util::TryStreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, HeaderMap, HeaderValue};
use ret_types::TransportError;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// The `Accept` header value sent with every event stream request.
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// The readable body of an event stream response.
pub type ResponseBody = Pin<Box<dyn AsyncRead + Send>>;

/// The future returned by [`Transport::get`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ServerResponse, TransportError>> + Send + 'a>>;

/// An HTTP response whose body has not been read yet.
pub struct ServerResponse {
    /// HTTP status code.
    pub status: u16,
    /// The URL the response came from, after any redirects.
    pub url: String,
    pub body: ResponseBody,
}

impl fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Issues the GET requests that open event streams.
///
/// Dyn-compatible so an event source can hold an `Arc<dyn Transport>`.
/// Cancellation is by drop: callers race the returned future (and reads on
/// the body) against their cancellation token and drop whichever loses.
pub trait Transport: Send + Sync {
    /// Send `GET url` with `Accept: text/event-stream`, adding
    /// `Authorization: Bearer <token>` when a token is given.
    ///
    /// Any status code is returned as a response; only failures to get a
    /// response at all are errors.
    fn get<'a>(&'a self, url: &'a str, bearer_token: Option<&'a str>) -> TransportFuture<'a>;
}

/// reqwest-backed [`Transport`].
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport that bypasses any system proxy, so nothing between
    /// us and the server buffers the stream.
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, url: &'a str, bearer_token: Option<&'a str>) -> TransportFuture<'a> {
        Box::pin(async move {
            let headers = request_headers(bearer_token)?;
            tracing::debug!("GET {url}");

            let response = self
                .http
                .get(url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout
                    } else {
                        TransportError::Network(e.to_string())
                    }
                })?;

            let status = response.status().as_u16();
            let url = response.url().to_string();
            let bytes = response.bytes_stream().map_err(std::io::Error::other);

            Ok(ServerResponse {
                status,
                url,
                body: Box::pin(StreamReader::new(bytes)),
            })
        })
    }
}

/// Build the headers for an event stream request.
fn request_headers(bearer_token: Option<&str>) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM_MIME));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    if let Some(token) = bearer_token.filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::InvalidHeader("bearer token".into()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}
