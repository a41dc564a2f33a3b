//! Authority harness for end-to-end testing
//!
//! Provides `TestAuthority` for spawning a real `Server` in tests.

use common::secret::SecretString;
use pitch_sdk::{Client, ClientConfig, ClientRegistry, Server, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Polling interval used by harness clients.
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Heartbeat interval used by harness clients.
pub const TEST_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Test harness running a `Server` on ephemeral loopback ports.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_game_info_flow() -> Result<(), anyhow::Error> {
///     let authority = TestAuthority::spawn(default_registry()).await?;
///     authority.server().set_game_info(Some(ready_game_info()));
///
///     let client = authority.client(TEAM_A_TOKEN)?;
///     client.connect();
///     wait_until(|| client.game_info().is_some()).await;
///
///     authority.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct TestAuthority {
    server: Arc<Server>,
    control_addr: SocketAddr,
    streaming_addr: SocketAddr,
}

impl TestAuthority {
    /// Start a server for `registry` with both channels on 127.0.0.1 and
    /// OS-assigned ports.
    pub async fn spawn(registry: ClientRegistry) -> Result<Self, anyhow::Error> {
        let mut config = ServerConfig::new(registry);
        config.bind_host = "127.0.0.1".parse()?;
        config.control_port = 0;
        config.streaming_port = 0;

        let server = Arc::new(Server::new(&config));
        server
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start test authority: {}", e))?;

        let control_addr = server
            .control_addr()
            .ok_or_else(|| anyhow::anyhow!("Control channel not bound"))?;
        let streaming_addr = server
            .streaming_addr()
            .ok_or_else(|| anyhow::anyhow!("Streaming channel not bound"))?;

        Ok(Self {
            server,
            control_addr,
            streaming_addr,
        })
    }

    /// Get reference to the running server.
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Base URL of the control channel.
    pub fn control_url(&self) -> String {
        format!("http://{}/", self.control_addr)
    }

    /// Base URL of the streaming channel.
    pub fn streaming_url(&self) -> String {
        format!("http://{}/", self.streaming_addr)
    }

    /// Client configuration pointing at this authority, with short polling
    /// and heartbeat intervals.
    pub fn client_config(&self, token: &str) -> ClientConfig {
        let mut config = ClientConfig::new(SecretString::from(token.to_string()));
        config.server_host = self.control_addr.ip().to_string();
        config.control_port = self.control_addr.port();
        config.streaming_port = self.streaming_addr.port();
        config.control_poll_interval = TEST_POLL_INTERVAL;
        config.streaming_poll_interval = TEST_POLL_INTERVAL;
        config.heartbeat_interval = TEST_HEARTBEAT_INTERVAL;
        config
    }

    /// A disconnected client for `token`.
    pub fn client(&self, token: &str) -> Result<Client, anyhow::Error> {
        Client::new(&self.client_config(token))
            .map_err(|e| anyhow::anyhow!("Failed to create test client: {}", e))
    }

    /// Release both channels.
    pub async fn shutdown(&self) {
        self.server.stop().await;
    }
}
