//! Pitchlink SDK
//!
//! Domain layer over the HTTP polling transport for a soccer-robot match.
//!
//! - [`Server`] - the match authority. Holds the authoritative game info and
//!   each robot's latest control command; pushes telemetry and camera frames
//!   to individual robots.
//! - [`Client`] - a robot controller. Caches what the authority pushes and
//!   sends control commands.
//!
//! Communication is split into a control channel (game state, telemetry,
//! commands) and a streaming channel (camera frames) so large frames never
//! delay control traffic.
//!
//! # Modules
//!
//! - `config` - process configuration from environment
//! - `errors` - domain error type
//! - `registry` - token to team mapping
//! - `observability` - tracing and Prometheus setup for the binaries
//! - `shutdown` - signal handling for the binaries

#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use errors::SdkError;
pub use registry::ClientRegistry;
pub use server::{RobotControlHandler, Server};
