//! # Pitchlink Test Utilities
//!
//! Shared test utilities for the Pitchlink crates.
//!
//! This crate provides:
//! - Authority harness (`TestAuthority` for end-to-end tests)
//! - Fixtures (tokens, registry, game info, commands)
//! - Async wait helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pitch_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let authority = TestAuthority::spawn(default_registry()).await?;
//!     let client = authority.client(TEAM_A_TOKEN)?;
//!     client.connect();
//!
//!     wait_until(|| client.game_info().is_some()).await;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod wait;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use wait::*;
