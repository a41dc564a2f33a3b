//! Authority-side queue server.
//!
//! Serves the two-verb polling protocol on `/`:
//!
//! | Request | Outcome |
//! |---------|---------|
//! | `GET /`  | `200` + next queued message, or `204` if the queue is empty |
//! | `POST /` | `204` once the message is validated and dispatched, `400` if the body is not a valid message |
//! | either, no/malformed `Authorization` | `401` |
//! | either, unregistered token | `403` |
//!
//! Authentication runs as a route layer, before the body is read and before
//! any queue is consulted.

use crate::auth::authenticate;
use crate::errors::TransportError;
use crate::handler::InboundHandler;
use crate::metrics;
use crate::queue::{MessageQueues, DEFAULT_QUEUE_CAPACITY};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use common::types::ClientToken;
use pitch_protocol::{Message, WireFormat};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info, instrument, warn};

/// Default maximum size of a pushed message body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `stop` lets in-flight requests finish before aborting the server.
/// Handlers may block indefinitely, so this stays short.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Authority-side transport contract.
///
/// Queue operations are synchronous and never block on I/O; only binding
/// and releasing the listening endpoint are async.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Enqueue a message for one peer.
    ///
    /// # Errors
    ///
    /// Fails with an unknown-token error if `token` is not registered.
    fn send(&self, message: Message, token: &str) -> Result<(), TransportError>;

    /// Enqueue a message for every registered peer.
    fn broadcast(&self, message: &Message);

    /// Dequeue the oldest message for `token`; `Ok(None)` if none is pending.
    ///
    /// # Errors
    ///
    /// Fails with an unknown-token error if `token` is not registered.
    fn poll(&self, token: &str) -> Result<Option<Message>, TransportError>;

    /// Add a handler for inbound messages.
    fn register_handler(&self, handler: Arc<dyn InboundHandler>);

    /// Run every registered handler for a message pushed by `token`,
    /// enqueueing any replies for that token.
    async fn deliver(&self, token: &ClientToken, message: &Message);

    /// Bind the listening endpoint. Calling it while running is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound.
    async fn start(&self) -> Result<(), TransportError>;

    /// Release the listening endpoint. Idempotent.
    async fn stop(&self);

    /// Bound address while running.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Queue server configuration.
#[derive(Debug, Clone)]
pub struct QueueServerConfig {
    /// Address to listen on. Port 0 picks an ephemeral port.
    pub bind_address: SocketAddr,

    /// Per-token queue capacity (default: 10).
    pub queue_capacity: usize,

    /// Body encoding shared with every peer (default: BSON).
    pub wire_format: WireFormat,

    /// Maximum accepted POST body size (default: 4 MiB).
    pub max_body_bytes: usize,

    /// Per-request timeout (default: 30s).
    pub request_timeout: Duration,
}

impl QueueServerConfig {
    #[must_use]
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            wire_format: WireFormat::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// State shared by the request handlers.
struct ServerState {
    queues: MessageQueues,
    handlers: RwLock<Vec<Arc<dyn InboundHandler>>>,
    wire_format: WireFormat,
}

impl ServerState {
    fn handlers(&self) -> Vec<Arc<dyn InboundHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn dispatch(&self, token: &ClientToken, message: &Message) {
        for handler in self.handlers() {
            match handler.handle(token, message).await {
                Ok(Some(reply)) => {
                    if let Err(e) = self.queues.push(token.as_str(), reply) {
                        warn!(target: "pitch.transport.server", error = %e, "Dropped handler reply");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    metrics::record_handler_failure();
                    warn!(
                        target: "pitch.transport.server",
                        kind = %message.kind(),
                        error = %e,
                        "Message handler failed"
                    );
                }
            }
        }
    }
}

struct RunningServer {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// HTTP implementation of [`QueueTransport`] on axum.
pub struct HttpQueueServer {
    config: QueueServerConfig,
    state: Arc<ServerState>,
    running: tokio::sync::Mutex<Option<RunningServer>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpQueueServer {
    /// Create a server for a fixed set of tokens. Nothing is bound until
    /// [`QueueTransport::start`].
    pub fn new<I>(config: QueueServerConfig, tokens: I) -> Self
    where
        I: IntoIterator<Item = ClientToken>,
    {
        let state = Arc::new(ServerState {
            queues: MessageQueues::new(tokens, config.queue_capacity),
            handlers: RwLock::new(Vec::new()),
            wire_format: config.wire_format,
        });
        Self {
            config,
            state,
            running: tokio::sync::Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueServerConfig {
        &self.config
    }

    /// The underlying queues.
    #[must_use]
    pub fn queues(&self) -> &MessageQueues {
        &self.state.queues
    }

    /// Build the router without binding it.
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state), &self.config)
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addr;
    }
}

#[async_trait]
impl QueueTransport for HttpQueueServer {
    fn send(&self, message: Message, token: &str) -> Result<(), TransportError> {
        self.state.queues.push(token, message)?;
        Ok(())
    }

    fn broadcast(&self, message: &Message) {
        self.state.queues.broadcast(message);
    }

    fn poll(&self, token: &str) -> Result<Option<Message>, TransportError> {
        Ok(self.state.queues.pop(token)?)
    }

    fn register_handler(&self, handler: Arc<dyn InboundHandler>) {
        self.state
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    async fn deliver(&self, token: &ClientToken, message: &Message) {
        self.state.dispatch(token, message).await;
    }

    #[instrument(skip_all, name = "pitch.transport.server.start")]
    async fn start(&self) -> Result<(), TransportError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!(target: "pitch.transport.server", "Queue server already running");
            return Ok(());
        }

        let address = self.config.bind_address;
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|source| TransportError::Bind { address, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { address, source })?;

        let app = self.router();
        let cancel_token = CancellationToken::new();
        let shutdown = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!(target: "pitch.transport.server", error = %e, "Queue server failed");
            }
        });

        info!(
            target: "pitch.transport.server",
            %local_addr,
            wire_format = %self.config.wire_format,
            queue_capacity = self.state.queues.capacity(),
            "Queue server listening"
        );

        *running = Some(RunningServer {
            local_addr,
            cancel_token,
            handle,
        });
        self.set_local_addr(Some(local_addr));
        Ok(())
    }

    #[instrument(skip_all, name = "pitch.transport.server.stop")]
    async fn stop(&self) {
        let Some(mut server) = self.running.lock().await.take() else {
            return;
        };
        self.set_local_addr(None);

        server.cancel_token.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server.handle)
            .await
            .is_err()
        {
            warn!(
                target: "pitch.transport.server",
                local_addr = %server.local_addr,
                "Queue server did not drain in time, aborting"
            );
            server.handle.abort();
        }

        info!(target: "pitch.transport.server", local_addr = %server.local_addr, "Queue server stopped");
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the queue server routes.
///
/// Layer order (bottom-to-top execution):
/// 1. `require_client_token` - authenticate (route layer, innermost)
/// 2. `DefaultBodyLimit` - cap pushed bodies
/// 3. `TraceLayer` - log request details
/// 4. `TimeoutLayer` - bound each request (outermost)
fn build_router(state: Arc<ServerState>, config: &QueueServerConfig) -> Router {
    Router::new()
        .route("/", get(poll_message).post(push_message))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_client_token,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
}

/// Authenticate the caller and store its token in request extensions.
async fn require_client_token(
    State(state): State<Arc<ServerState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, TransportError> {
    let token = authenticate(req.headers(), &state.queues).map_err(|e| {
        metrics::record_auth_failure(e.reason());
        debug!(target: "pitch.transport.server", reason = e.reason(), "Rejected request");
        e
    })?;

    req.extensions_mut().insert(token);
    Ok(next.run(req).await)
}

/// `GET /`: hand the caller its oldest queued message.
async fn poll_message(
    State(state): State<Arc<ServerState>>,
    Extension(token): Extension<ClientToken>,
) -> Result<Response, TransportError> {
    let Some(message) = state.queues.pop(token.as_str())? else {
        metrics::record_poll("empty");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    metrics::record_poll("message");
    let body = state
        .wire_format
        .encode(&message)
        .map_err(TransportError::Encode)?;
    debug!(target: "pitch.transport.server", kind = %message.kind(), "Delivered message");

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, state.wire_format.content_type())],
        body,
    )
        .into_response())
}

/// `POST /`: validate the body and dispatch it to every handler.
async fn push_message(
    State(state): State<Arc<ServerState>>,
    Extension(token): Extension<ClientToken>,
    body: Bytes,
) -> Result<StatusCode, TransportError> {
    let message = state.wire_format.decode(&body).map_err(|e| {
        metrics::record_push("invalid");
        debug!(target: "pitch.transport.server", error = %e, "Rejected malformed message");
        TransportError::InvalidMessage(e)
    })?;

    metrics::record_push("accepted");
    debug!(target: "pitch.transport.server", kind = %message.kind(), "Received message");
    state.dispatch(&token, &message).await;

    Ok(StatusCode::NO_CONTENT)
}
