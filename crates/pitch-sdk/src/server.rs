//! Match authority.
//!
//! A [`Server`] owns two queue transports keyed by the same tokens: the
//! control channel carries game state, robot telemetry and commands; the
//! streaming channel carries camera frames. It holds the authoritative
//! [`GameInfo`] and the latest [`RobotControl`] received from each peer.
//!
//! Inbound control messages are dispatched by type:
//!
//! | Type | Effect |
//! |------|--------|
//! | `get_game_info` | reply with the full game info, if set and the requester's team is scored |
//! | `get_team_info` | reply with the requester's team name |
//! | `push_robot_control` | overwrite the requester's cached command, notify callbacks |
//! | anything else | ignored |
//!
//! A request that cannot be served yields no reply; the peer retries on its
//! next heartbeat.

use crate::config::ServerConfig;
use crate::errors::SdkError;
use crate::registry::ClientRegistry;
use async_trait::async_trait;
use common::types::ClientToken;
use pitch_protocol::game::GameInfo;
use pitch_protocol::image::CapturedImage;
use pitch_protocol::robot::{RobotControl, RobotStatus};
use pitch_protocol::team::TeamInfo;
use pitch_protocol::{BoundTo, Message, MessageKind};
use pitch_transport::{
    HandlerError, HttpQueueServer, InboundHandler, QueueServerConfig, QueueTransport,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

/// Callback for robot control commands received from peers.
#[async_trait]
pub trait RobotControlHandler: Send + Sync {
    async fn on_robot_control(
        &self,
        token: &ClientToken,
        control: &RobotControl,
    ) -> Result<(), HandlerError>;
}

struct ServerState {
    registry: ClientRegistry,
    game_info: RwLock<Option<GameInfo>>,
    robot_controls: RwLock<HashMap<ClientToken, RobotControl>>,
    robot_control_handlers: RwLock<Vec<Arc<dyn RobotControlHandler>>>,
}

impl ServerState {
    fn new(registry: ClientRegistry) -> Self {
        let robot_controls = registry
            .tokens()
            .map(|token| (token.clone(), RobotControl::default()))
            .collect();
        Self {
            registry,
            game_info: RwLock::new(None),
            robot_controls: RwLock::new(robot_controls),
            robot_control_handlers: RwLock::new(Vec::new()),
        }
    }

    fn team_of(&self, token: &ClientToken) -> Result<&str, SdkError> {
        self.registry
            .team_of(token.as_str())
            .ok_or(SdkError::UnknownClient)
    }

    fn game_info_reply(&self, token: &ClientToken) -> Result<Message, SdkError> {
        let game_info = self
            .game_info
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let game_info = game_info.as_ref().ok_or(SdkError::GameInfoUnset)?;

        let team = self.team_of(token)?;
        if game_info.score_of(team).is_none() {
            return Err(SdkError::TeamNotInGame(team.to_string()));
        }

        Ok(game_info.to_message()?)
    }

    fn team_info_reply(&self, token: &ClientToken) -> Result<Message, SdkError> {
        let team = self.team_of(token)?;
        Ok(TeamInfo::new(team).to_message()?)
    }

    async fn apply_robot_control(
        &self,
        token: &ClientToken,
        message: &Message,
    ) -> Result<(), SdkError> {
        let team = self.team_of(token)?;
        let control = RobotControl::from_message(message)?;

        self.robot_controls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), control);
        debug!(
            target: "pitch.sdk.server",
            team,
            head = control.head.is_some(),
            movement = control.movement.is_some(),
            kick = control.kick.is_some(),
            "Robot control updated"
        );

        let handlers = self
            .robot_control_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            if let Err(e) = handler.on_robot_control(token, &control).await {
                warn!(target: "pitch.sdk.server", team, error = %e, "Robot control callback failed");
            }
        }

        Ok(())
    }
}

/// Routes inbound control messages to the server state.
struct Dispatcher {
    state: Arc<ServerState>,
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn handle(
        &self,
        token: &ClientToken,
        message: &Message,
    ) -> Result<Option<Message>, HandlerError> {
        if message.bound_to() != BoundTo::Server {
            debug!(target: "pitch.sdk.server", kind = %message.kind(), "Ignoring client-bound message");
            return Ok(None);
        }

        match message.kind() {
            MessageKind::GetGameInfo => Ok(Some(self.state.game_info_reply(token)?)),
            MessageKind::GetTeamInfo => Ok(Some(self.state.team_info_reply(token)?)),
            MessageKind::PushRobotControl => {
                self.state.apply_robot_control(token, message).await?;
                Ok(None)
            }
            MessageKind::PushRobotStatus
            | MessageKind::PushCapturedImage
            | MessageKind::Other(_) => {
                debug!(target: "pitch.sdk.server", kind = %message.kind(), "Ignoring message");
                Ok(None)
            }
        }
    }
}

/// Match authority serving a control and a streaming channel.
pub struct Server {
    control: Arc<dyn QueueTransport>,
    streaming: Arc<dyn QueueTransport>,
    state: Arc<ServerState>,
    dispatcher_registered: AtomicBool,
}

impl Server {
    /// Create a server with HTTP transports bound to the configured
    /// addresses. Nothing is bound until [`Server::start`].
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let transport = |address| -> Arc<dyn QueueTransport> {
            let transport_config = QueueServerConfig::new(address)
                .with_queue_capacity(config.queue_capacity)
                .with_wire_format(config.wire_format);
            Arc::new(HttpQueueServer::new(
                transport_config,
                config.registry.tokens().cloned(),
            ))
        };

        Self::with_transports(
            config.registry.clone(),
            transport(config.control_address()),
            transport(config.streaming_address()),
        )
    }

    /// Create a server over caller-supplied transports. Both transports must
    /// accept the registry's tokens.
    #[must_use]
    pub fn with_transports(
        registry: ClientRegistry,
        control: Arc<dyn QueueTransport>,
        streaming: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            control,
            streaming,
            state: Arc::new(ServerState::new(registry)),
            dispatcher_registered: AtomicBool::new(false),
        }
    }

    /// Bind both channels. Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`] if either channel fails to bind; the
    /// other channel is released.
    #[instrument(skip_all, name = "pitch.sdk.server.start")]
    pub async fn start(&self) -> Result<(), SdkError> {
        if !self.dispatcher_registered.swap(true, Ordering::SeqCst) {
            self.control.register_handler(Arc::new(Dispatcher {
                state: Arc::clone(&self.state),
            }));
        }

        self.control.start().await?;
        if let Err(e) = self.streaming.start().await {
            self.control.stop().await;
            return Err(e.into());
        }

        info!(
            target: "pitch.sdk.server",
            control = ?self.control.local_addr(),
            streaming = ?self.streaming.local_addr(),
            clients = self.state.registry.len(),
            "Server started"
        );
        Ok(())
    }

    /// Release both channels. Safe to call repeatedly.
    #[instrument(skip_all, name = "pitch.sdk.server.stop")]
    pub async fn stop(&self) {
        self.control.stop().await;
        self.streaming.stop().await;
        info!(target: "pitch.sdk.server", "Server stopped");
    }

    /// Current game information, if set.
    #[must_use]
    pub fn get_game_info(&self) -> Option<GameInfo> {
        self.state
            .game_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the game information. `None` returns the server to the unset
    /// state, where game info requests get no reply.
    pub fn set_game_info(&self, game_info: Option<GameInfo>) {
        *self
            .state
            .game_info
            .write()
            .unwrap_or_else(PoisonError::into_inner) = game_info;
    }

    /// Latest robot control received from `token`. Registered tokens start
    /// with an empty command; unregistered tokens yield `None`.
    #[must_use]
    pub fn robot_control(&self, token: &str) -> Option<RobotControl> {
        self.state
            .robot_controls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied()
    }

    /// Add a callback for robot control commands.
    pub fn register_robot_control_handler(&self, handler: Arc<dyn RobotControlHandler>) {
        self.state
            .robot_control_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Queue a status snapshot for one peer on the control channel.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Protocol`] if the status cannot be serialized and
    /// [`SdkError::Transport`] if `token` is not registered.
    pub fn push_robot_status(&self, token: &str, status: &RobotStatus) -> Result<(), SdkError> {
        self.control.send(status.to_message()?, token)?;
        Ok(())
    }

    /// Queue a camera frame for one peer on the streaming channel.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Protocol`] if the frame cannot be serialized and
    /// [`SdkError::Transport`] if `token` is not registered.
    pub fn push_captured_image(&self, token: &str, image: &CapturedImage) -> Result<(), SdkError> {
        self.streaming.send(image.to_message()?, token)?;
        Ok(())
    }

    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.state.registry
    }

    /// Bound control channel address while running.
    #[must_use]
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control.local_addr()
    }

    /// Bound streaming channel address while running.
    #[must_use]
    pub fn streaming_addr(&self) -> Option<SocketAddr> {
        self.streaming.local_addr()
    }
}
