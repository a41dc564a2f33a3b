//! Peer-side polling client.
//!
//! Turns the two HTTP verbs into a duplex channel: a background loop polls
//! `GET /` every `poll_interval` and hands each received message to the
//! registered handlers, while [`PollingTransport::send`] pushes one message
//! with `POST /`.
//!
//! The loop never terminates on its own. An empty poll (`204`) is a normal
//! result. Transport failures are logged and retried after `retry_backoff`.
//! At most one poll is in flight at a time, and handlers for a message
//! complete before the next poll is issued.

use crate::errors::TransportError;
use crate::handler::MessageHandler;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use pitch_protocol::{Message, WireFormat};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default pause after a failed poll.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default timeout for one HTTP round trip.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Peer-side transport contract.
#[async_trait]
pub trait PollingTransport: Send + Sync {
    /// Add a handler for received messages.
    fn register_handler(&self, handler: Arc<dyn MessageHandler>);

    /// Start the polling loop. A no-op while the loop is running.
    fn connect(&self);

    /// Cancel the polling loop. In-flight requests are abandoned.
    fn disconnect(&self);

    /// Whether the polling loop is running.
    fn is_connected(&self) -> bool;

    /// Push one message, logging failures instead of returning them.
    async fn send(&self, message: &Message);
}

/// Polling client configuration.
#[derive(Clone)]
pub struct PollingClientConfig {
    /// Authority endpoint, e.g. `http://localhost:14514/`.
    pub url: String,

    /// Bearer token presented on every request.
    pub token: SecretString,

    /// Pause between polls (default: 50ms).
    pub poll_interval: Duration,

    /// Pause after a failed poll (default: 1s).
    pub retry_backoff: Duration,

    /// Timeout for one HTTP round trip (default: 10s).
    pub http_timeout: Duration,

    /// Body encoding shared with the authority (default: BSON).
    pub wire_format: WireFormat,
}

impl PollingClientConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, token: SecretString) -> Self {
        Self {
            url: url.into(),
            token,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            wire_format: WireFormat::default(),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }
}

/// Custom Debug implementation that redacts the token.
impl fmt::Debug for PollingClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingClientConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("poll_interval", &self.poll_interval)
            .field("retry_backoff", &self.retry_backoff)
            .field("http_timeout", &self.http_timeout)
            .field("wire_format", &self.wire_format)
            .finish()
    }
}

/// State shared with the background loop.
struct ClientInner {
    url: Url,
    token: SecretString,
    poll_interval: Duration,
    retry_backoff: Duration,
    wire_format: WireFormat,
    http_timeout: Duration,
    /// Connection pool for the current session. Dropped on disconnect and
    /// rebuilt on next use.
    http: Mutex<Option<reqwest::Client>>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

struct PollTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// HTTP implementation of [`PollingTransport`] on reqwest.
pub struct HttpPollingClient {
    inner: Arc<ClientInner>,
    task: Mutex<Option<PollTask>>,
}

impl HttpPollingClient {
    /// Create a disconnected client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the URL does not parse and
    /// [`TransportError::Network`] if the HTTP client cannot be built.
    pub fn new(config: PollingClientConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.url)))?;

        let http = build_http(config.http_timeout)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                url,
                token: config.token,
                poll_interval: config.poll_interval,
                retry_backoff: config.retry_backoff,
                wire_format: config.wire_format,
                http_timeout: config.http_timeout,
                http: Mutex::new(Some(http)),
                handlers: RwLock::new(Vec::new()),
            }),
            task: Mutex::new(None),
        })
    }

    /// Authority endpoint.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Push one message, returning any failure.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encode`] if the message cannot be encoded,
    /// [`TransportError::Network`] on transport failure and
    /// [`TransportError::UnexpectedStatus`] for any non-2xx response.
    pub async fn try_send(&self, message: &Message) -> Result<(), TransportError> {
        self.inner.push(message).await
    }

    /// Issue a single poll and dispatch the result, if any. Returns whether
    /// a message was received.
    ///
    /// # Errors
    ///
    /// Same failure modes as one iteration of the polling loop.
    pub async fn poll_once(&self) -> Result<bool, TransportError> {
        self.inner.poll_once().await
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<PollTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PollingTransport for HttpPollingClient {
    fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    fn connect(&self) {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!(target: "pitch.transport.client", url = %self.inner.url, "Already connected");
            return;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run_poll_loop(
            Arc::clone(&self.inner),
            cancel_token.clone(),
        ));
        *task = Some(PollTask {
            cancel_token,
            handle,
        });

        info!(target: "pitch.transport.client", url = %self.inner.url, "Polling started");
    }

    fn disconnect(&self) {
        let Some(task) = self.lock_task().take() else {
            return;
        };
        task.cancel_token.cancel();
        task.handle.abort();
        self.inner.close_session();
        info!(target: "pitch.transport.client", url = %self.inner.url, "Polling stopped");
    }

    fn is_connected(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    async fn send(&self, message: &Message) {
        if let Err(e) = self.inner.push(message).await {
            warn!(
                target: "pitch.transport.client",
                kind = %message.kind(),
                error = %e,
                "Failed to send message"
            );
        }
    }
}

impl Drop for HttpPollingClient {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.cancel_token.cancel();
            task.handle.abort();
        }
    }
}

impl ClientInner {
    /// HTTP client for the current session, building a new one after a
    /// disconnect.
    fn session(&self) -> Result<reqwest::Client, TransportError> {
        let mut http = self.http.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = http.as_ref() {
            return Ok(client.clone());
        }
        let client = build_http(self.http_timeout)?;
        *http = Some(client.clone());
        Ok(client)
    }

    /// Release the session's connection pool once in-flight requests finish.
    fn close_session(&self) {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn push(&self, message: &Message) -> Result<(), TransportError> {
        let body = self
            .wire_format
            .encode(message)
            .map_err(TransportError::Encode)?;

        let response = self
            .session()?
            .post(self.url.clone())
            .bearer_auth(self.token.expose_secret())
            .header(CONTENT_TYPE, self.wire_format.content_type())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::UnexpectedStatus(status.as_u16()))
        }
    }

    async fn poll_once(&self) -> Result<bool, TransportError> {
        let response = self
            .session()?
            .get(self.url.clone())
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(false),
            StatusCode::OK => {
                let body = response.bytes().await?;
                let message = self
                    .wire_format
                    .decode(&body)
                    .map_err(TransportError::InvalidMessage)?;
                self.dispatch(&message).await;
                Ok(true)
            }
            other => Err(TransportError::UnexpectedStatus(other.as_u16())),
        }
    }

    async fn dispatch(&self, message: &Message) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handler in handlers {
            if let Err(e) = handler.handle(message).await {
                warn!(
                    target: "pitch.transport.client",
                    kind = %message.kind(),
                    error = %e,
                    "Message handler failed"
                );
            }
        }
    }
}

fn build_http(timeout: Duration) -> Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}

#[instrument(skip_all, name = "pitch.transport.client.poll_loop", fields(url = %inner.url))]
async fn run_poll_loop(inner: Arc<ClientInner>, cancel_token: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            () = tokio::time::sleep(inner.poll_interval) => {}
        }

        let result = tokio::select! {
            () = cancel_token.cancelled() => break,
            result = inner.poll_once() => result,
        };

        if let Err(e) = result {
            warn!(
                target: "pitch.transport.client",
                error = %e,
                backoff_ms = u64::try_from(inner.retry_backoff.as_millis()).unwrap_or(u64::MAX),
                "Poll failed, backing off"
            );
            tokio::select! {
                () = cancel_token.cancelled() => break,
                () = tokio::time::sleep(inner.retry_backoff) => {}
            }
        }
    }

    debug!(target: "pitch.transport.client", "Poll loop exited");
}
