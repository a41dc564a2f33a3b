//! HTTP polling duplex transport.
//!
//! The underlying protocol is plain request/response HTTP, so a duplex
//! channel is emulated with two verbs on a single path:
//!
//! - `GET /` polls the authority for the next message queued for the caller.
//! - `POST /` pushes one message from the caller to the authority.
//!
//! Both verbs authenticate with `Authorization: Bearer <token>` against a
//! fixed registry of client tokens.
//!
//! # Components
//!
//! - [`HttpQueueServer`] - authority side. Holds one bounded drop-oldest FIFO
//!   per registered token and dispatches inbound messages to
//!   [`InboundHandler`]s.
//! - [`HttpPollingClient`] - peer side. Runs a background polling loop and
//!   dispatches every received message to [`MessageHandler`]s.
//!
//! Both sit behind the [`QueueTransport`] and [`PollingTransport`] traits so
//! domain code and tests can substitute their own implementations.

#![warn(clippy::pedantic)]

pub mod auth;
pub mod client;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod queue;
pub mod server;

pub use auth::AuthError;
pub use client::{HttpPollingClient, PollingClientConfig, PollingTransport};
pub use errors::TransportError;
pub use handler::{HandlerError, InboundHandler, MessageHandler};
pub use queue::MessageQueues;
pub use server::{HttpQueueServer, QueueServerConfig, QueueTransport};
