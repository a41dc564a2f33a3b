//! Common utilities and types shared across Pitchlink components.

#![warn(clippy::pedantic)]

/// Module for client identity types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
