//! Robot controller side.
//!
//! A [`Client`] owns two polling transports, one per channel, and keeps the
//! latest state the authority pushed on each:
//!
//! - control: [`GameInfo`], [`RobotStatus`] and the team name
//! - streaming: [`CapturedImage`]
//!
//! Every cached value is replaced wholesale by each update and is observable
//! through a `watch` receiver. While connected, a heartbeat task requests
//! game info on the control channel once per `heartbeat_interval`.

use crate::config::ClientConfig;
use crate::errors::SdkError;
use async_trait::async_trait;
use pitch_protocol::game::GameInfo;
use pitch_protocol::image::CapturedImage;
use pitch_protocol::robot::{RobotControl, RobotStatus};
use pitch_protocol::team::TeamInfo;
use pitch_protocol::{BoundTo, Message, MessageKind};
use pitch_transport::{
    HandlerError, HttpPollingClient, MessageHandler, PollingClientConfig, PollingTransport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

struct ClientState {
    game_info: watch::Sender<Option<GameInfo>>,
    robot_status: watch::Sender<Option<RobotStatus>>,
    captured_image: watch::Sender<Option<CapturedImage>>,
    team: watch::Sender<Option<String>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            game_info: watch::Sender::new(None),
            robot_status: watch::Sender::new(None),
            captured_image: watch::Sender::new(None),
            team: watch::Sender::new(None),
        }
    }
}

/// Applies control channel updates to the cache.
struct ControlHandler {
    state: Arc<ClientState>,
}

#[async_trait]
impl MessageHandler for ControlHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        if message.bound_to() != BoundTo::Client {
            debug!(target: "pitch.sdk.client", kind = %message.kind(), "Ignoring server-bound message");
            return Ok(());
        }

        match message.kind() {
            MessageKind::GetGameInfo => {
                let game_info = GameInfo::from_message(message).map_err(SdkError::from)?;
                debug!(target: "pitch.sdk.client", stage = %game_info.stage(), "Game info updated");
                self.state.game_info.send_replace(Some(game_info));
            }
            MessageKind::PushRobotStatus => {
                let status = RobotStatus::from_message(message).map_err(SdkError::from)?;
                self.state.robot_status.send_replace(Some(status));
            }
            MessageKind::GetTeamInfo => {
                let team_info = TeamInfo::from_message(message).map_err(SdkError::from)?;
                self.state.team.send_replace(Some(team_info.team));
            }
            other => {
                debug!(target: "pitch.sdk.client", kind = %other, "Ignoring control message");
            }
        }
        Ok(())
    }
}

/// Applies streaming channel updates to the cache.
struct StreamingHandler {
    state: Arc<ClientState>,
}

#[async_trait]
impl MessageHandler for StreamingHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        if message.bound_to() != BoundTo::Client {
            return Ok(());
        }

        if message.kind() == &MessageKind::PushCapturedImage {
            let image = CapturedImage::from_message(message).map_err(SdkError::from)?;
            self.state.captured_image.send_replace(Some(image));
        } else {
            debug!(target: "pitch.sdk.client", kind = %message.kind(), "Ignoring streaming message");
        }
        Ok(())
    }
}

struct HeartbeatTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Robot controller connected to a match authority.
pub struct Client {
    control: Arc<dyn PollingTransport>,
    streaming: Arc<dyn PollingTransport>,
    state: Arc<ClientState>,
    heartbeat_interval: Duration,
    request_team_info: bool,
    handlers_registered: AtomicBool,
    heartbeat: Mutex<Option<HeartbeatTask>>,
}

impl Client {
    /// Create a disconnected client with HTTP transports for both channels.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if `config` fails validation and
    /// [`SdkError::Transport`] if either endpoint URL is invalid.
    pub fn new(config: &ClientConfig) -> Result<Self, SdkError> {
        config.validate()?;
        let control = HttpPollingClient::new(
            PollingClientConfig::new(config.control_url(), config.token.clone())
                .with_poll_interval(config.control_poll_interval)
                .with_wire_format(config.wire_format),
        )?;
        let streaming = HttpPollingClient::new(
            PollingClientConfig::new(config.streaming_url(), config.token.clone())
                .with_poll_interval(config.streaming_poll_interval)
                .with_wire_format(config.wire_format),
        )?;

        Self::with_transports(config, Arc::new(control), Arc::new(streaming))
    }

    /// Create a disconnected client over caller-supplied transports. Only the
    /// heartbeat settings of `config` are used.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if `config` fails validation.
    pub fn with_transports(
        config: &ClientConfig,
        control: Arc<dyn PollingTransport>,
        streaming: Arc<dyn PollingTransport>,
    ) -> Result<Self, SdkError> {
        config.validate()?;
        Ok(Self {
            control,
            streaming,
            state: Arc::new(ClientState::new()),
            heartbeat_interval: config.heartbeat_interval,
            request_team_info: config.request_team_info,
            handlers_registered: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
        })
    }

    /// Start polling both channels and the heartbeat. Must be called within
    /// a tokio runtime; calling it again while connected is a no-op.
    #[instrument(skip_all, name = "pitch.sdk.client.connect")]
    pub fn connect(&self) {
        if !self.handlers_registered.swap(true, Ordering::SeqCst) {
            self.control.register_handler(Arc::new(ControlHandler {
                state: Arc::clone(&self.state),
            }));
            self.streaming.register_handler(Arc::new(StreamingHandler {
                state: Arc::clone(&self.state),
            }));
        }

        self.control.connect();
        self.streaming.connect();

        let mut heartbeat = self.lock_heartbeat();
        if heartbeat.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&self.control),
            self.heartbeat_interval,
            self.request_team_info,
            cancel_token.clone(),
        ));
        *heartbeat = Some(HeartbeatTask {
            cancel_token,
            handle,
        });

        info!(target: "pitch.sdk.client", "Client connected");
    }

    /// Stop the heartbeat and both polling loops.
    #[instrument(skip_all, name = "pitch.sdk.client.disconnect")]
    pub fn disconnect(&self) {
        if let Some(task) = self.lock_heartbeat().take() {
            task.cancel_token.cancel();
            task.handle.abort();
        }
        self.control.disconnect();
        self.streaming.disconnect();
        info!(target: "pitch.sdk.client", "Client disconnected");
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.control.is_connected() && self.streaming.is_connected()
    }

    /// Send a robot control command on the control channel. Only the
    /// sub-commands present in `control` go on the wire. Delivery is best
    /// effort.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Protocol`] if the command cannot be serialized.
    pub async fn push_robot_control(&self, control: &RobotControl) -> Result<(), SdkError> {
        let message = control.to_message()?;
        self.control.send(&message).await;
        Ok(())
    }

    /// Request game info and wait for the next update.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Timeout`] if no update arrives within `timeout`.
    pub async fn fetch_game_info(&self, timeout: Duration) -> Result<GameInfo, SdkError> {
        let mut updates = self.state.game_info.subscribe();
        self.control
            .send(&Message::to_server(MessageKind::GetGameInfo))
            .await;

        match tokio::time::timeout(timeout, updates.changed()).await {
            Ok(Ok(())) => updates
                .borrow_and_update()
                .clone()
                .ok_or(SdkError::GameInfoUnset),
            Ok(Err(_)) | Err(_) => Err(SdkError::Timeout),
        }
    }

    /// Latest game info received, if any.
    #[must_use]
    pub fn game_info(&self) -> Option<GameInfo> {
        self.state.game_info.borrow().clone()
    }

    /// Latest robot status received, if any.
    #[must_use]
    pub fn robot_status(&self) -> Option<RobotStatus> {
        self.state.robot_status.borrow().clone()
    }

    /// Latest camera frame received, if any.
    #[must_use]
    pub fn captured_image(&self) -> Option<CapturedImage> {
        self.state.captured_image.borrow().clone()
    }

    /// Team name reported by the authority, if requested and received.
    #[must_use]
    pub fn team(&self) -> Option<String> {
        self.state.team.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_game_info(&self) -> watch::Receiver<Option<GameInfo>> {
        self.state.game_info.subscribe()
    }

    #[must_use]
    pub fn subscribe_robot_status(&self) -> watch::Receiver<Option<RobotStatus>> {
        self.state.robot_status.subscribe()
    }

    #[must_use]
    pub fn subscribe_captured_image(&self) -> watch::Receiver<Option<CapturedImage>> {
        self.state.captured_image.subscribe()
    }

    fn lock_heartbeat(&self) -> std::sync::MutexGuard<'_, Option<HeartbeatTask>> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(task) = self.lock_heartbeat().take() {
            task.cancel_token.cancel();
            task.handle.abort();
        }
    }
}

/// Request game info (and optionally team info) once per `interval` until
/// cancelled. The first request goes out immediately.
async fn run_heartbeat(
    control: Arc<dyn PollingTransport>,
    interval: Duration,
    request_team_info: bool,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(target: "pitch.sdk.client", "Heartbeat cancelled");
                break;
            }
            _ = ticker.tick() => {
                control.send(&Message::to_server(MessageKind::GetGameInfo)).await;
                if request_team_info {
                    control.send(&Message::to_server(MessageKind::GetTeamInfo)).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::secret::SecretString;
    use pitch_protocol::game::GameStage;
    use pitch_protocol::image::ImageShape;
    use pitch_protocol::robot::KickCommand;
    use std::collections::HashMap;

    /// In-memory transport that records sends and can answer them.
    #[derive(Default)]
    struct FakeTransport {
        handlers: Mutex<Vec<Arc<dyn MessageHandler>>>,
        sent: Mutex<Vec<Message>>,
        connected: AtomicBool,
        connects: Mutex<usize>,
        reply: Mutex<Option<Message>>,
    }

    impl FakeTransport {
        async fn receive(&self, message: &Message) -> Vec<Result<(), HandlerError>> {
            let handlers = self.handlers.lock().unwrap().clone();
            let mut results = Vec::new();
            for handler in handlers {
                results.push(handler.handle(message).await);
            }
            results
        }

        fn sent_kinds(&self) -> Vec<MessageKind> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.kind().clone())
                .collect()
        }

        fn handler_count(&self) -> usize {
            self.handlers.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PollingTransport for FakeTransport {
        fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
            self.handlers.lock().unwrap().push(handler);
        }

        fn connect(&self) {
            self.connected.store(true, Ordering::SeqCst);
            *self.connects.lock().unwrap() += 1;
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send(&self, message: &Message) {
            self.sent.lock().unwrap().push(message.clone());
            let reply = self.reply.lock().unwrap().clone();
            if let Some(reply) = reply {
                self.receive(&reply).await;
            }
        }
    }

    fn config() -> ClientConfig {
        let mut config = ClientConfig::new(SecretString::from("red-1"));
        config.heartbeat_interval = Duration::from_millis(10);
        config
    }

    fn client_with(config: &ClientConfig) -> (Client, Arc<FakeTransport>, Arc<FakeTransport>) {
        let control = Arc::new(FakeTransport::default());
        let streaming = Arc::new(FakeTransport::default());
        let client = Client::with_transports(
            config,
            Arc::clone(&control) as Arc<dyn PollingTransport>,
            Arc::clone(&streaming) as Arc<dyn PollingTransport>,
        )
        .unwrap();
        (client, control, streaming)
    }

    fn game_info() -> GameInfo {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        GameInfo::new(
            GameStage::InProgress,
            start,
            start + chrono::Duration::minutes(10),
            HashMap::from([("red".to_string(), 2.0), ("blue".to_string(), 1.0)]),
            1.0,
        )
        .unwrap()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn test_connect_registers_handlers_once() {
        let (client, control, streaming) = client_with(&config());

        client.connect();
        client.connect();

        assert!(client.is_connected());
        assert_eq!(control.handler_count(), 1);
        assert_eq!(streaming.handler_count(), 1);
        assert_eq!(*control.connects.lock().unwrap(), 2);

        client.disconnect();
        client.connect();
        assert_eq!(control.handler_count(), 1);
        client.disconnect();
    }

    #[tokio::test]
    async fn test_control_updates_replace_cache() {
        let (client, control, _streaming) = client_with(&config());
        client.connect();
        client.disconnect();

        assert!(client.game_info().is_none());
        control.receive(&game_info().to_message().unwrap()).await;
        assert_eq!(client.game_info(), Some(game_info()));

        let status =
            RobotStatus::new(1.0, 2.0, &[0.0, 0.0, 9.8], &[0.1; 3], &[0.2; 3], "red").unwrap();
        control.receive(&status.to_message().unwrap()).await;
        assert_eq!(client.robot_status(), Some(status));

        control
            .receive(&TeamInfo::new("red").to_message().unwrap())
            .await;
        assert_eq!(client.team().as_deref(), Some("red"));
    }

    #[tokio::test]
    async fn test_ignores_server_bound_and_unknown_messages() {
        let (client, control, _streaming) = client_with(&config());
        client.connect();
        client.disconnect();

        let results = control
            .receive(&Message::to_server(MessageKind::GetGameInfo))
            .await;
        assert!(results.iter().all(Result::is_ok));

        let results = control
            .receive(&Message::to_client(MessageKind::from("fireworks")))
            .await;
        assert!(results.iter().all(Result::is_ok));
        assert!(client.game_info().is_none());
    }

    #[tokio::test]
    async fn test_malformed_update_keeps_previous_value() {
        let (client, control, _streaming) = client_with(&config());
        client.connect();
        client.disconnect();

        control.receive(&game_info().to_message().unwrap()).await;
        let broken = Message::to_client(MessageKind::GetGameInfo).with_field("stage", "halftime");
        let results = control.receive(&broken).await;

        assert!(matches!(results.first(), Some(Err(HandlerError::Failed(_)))));
        assert_eq!(client.game_info(), Some(game_info()));
    }

    #[tokio::test]
    async fn test_streaming_image_update() {
        let (client, _control, streaming) = client_with(&config());
        let mut images = client.subscribe_captured_image();
        client.connect();
        client.disconnect();

        let image = CapturedImage::filled(ImageShape::new(3, 4), 1).unwrap();
        streaming.receive(&image.to_message().unwrap()).await;

        assert!(images.has_changed().unwrap());
        let received = images.borrow_and_update().clone().unwrap();
        assert_eq!(received.shape().dims(), vec![3, 4]);
        assert_eq!(received.data().len(), 12);
        assert!(received.data().iter().all(|&b| b == 1));
    }

    #[tokio::test]
    async fn test_push_robot_control_omits_absent_subcommands() {
        let (client, control, _streaming) = client_with(&config());
        let control_cmd = RobotControl::default().with_kick(KickCommand {
            x: 0.5,
            y: 0.0,
            z: 0.0,
            speed: 3.0,
            delay: 0.0,
        });

        client.push_robot_control(&control_cmd).await.unwrap();

        let sent = control.sent.lock().unwrap();
        let message = sent.first().unwrap();
        assert_eq!(message.kind(), &MessageKind::PushRobotControl);
        assert_eq!(message.bound_to(), BoundTo::Server);
        assert!(message.get("kick").is_some());
        assert!(message.get("head").is_none());
        assert!(message.get("movement").is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_requests_game_info() {
        let (client, control, _streaming) = client_with(&config());
        client.connect();

        wait_for(|| {
            control
                .sent_kinds()
                .iter()
                .filter(|k| **k == MessageKind::GetGameInfo)
                .count()
                >= 2
        })
        .await;
        assert!(!control.sent_kinds().contains(&MessageKind::GetTeamInfo));

        client.disconnect();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_heartbeat_requests_team_info_when_enabled() {
        let mut config = config();
        config.request_team_info = true;
        let (client, control, _streaming) = client_with(&config);
        client.connect();

        wait_for(|| control.sent_kinds().contains(&MessageKind::GetTeamInfo)).await;

        client.disconnect();
    }

    #[tokio::test]
    async fn test_fetch_game_info_waits_for_reply() {
        let (client, control, _streaming) = client_with(&config());
        client.connect();
        client.disconnect();
        *control.reply.lock().unwrap() = Some(game_info().to_message().unwrap());

        let received = client.fetch_game_info(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received, game_info());
    }

    #[tokio::test]
    async fn test_fetch_game_info_times_out() {
        let (client, _control, _streaming) = client_with(&config());

        let result = client.fetch_game_info(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SdkError::Timeout)));
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_is_rejected() {
        let mut config = config();
        config.heartbeat_interval = Duration::ZERO;

        let result = Client::with_transports(
            &config,
            Arc::new(FakeTransport::default()),
            Arc::new(FakeTransport::default()),
        );
        assert!(matches!(result, Err(SdkError::Config(_))));
        assert!(matches!(Client::new(&config), Err(SdkError::Config(_))));
    }
}
