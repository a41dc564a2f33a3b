//! End-to-end tests: real `Server` and `Client` over loopback HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use common::types::ClientToken;
use pitch_protocol::image::{CapturedImage, ImageShape};
use pitch_protocol::robot::{RobotControl, RobotStatus};
use pitch_protocol::{encode, Message, MessageKind};
use pitch_sdk::RobotControlHandler;
use pitch_test_utils::*;
use pitch_transport::HandlerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_game_info_reaches_scored_team() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    authority.server().set_game_info(Some(ready_game_info()));

    let client = authority.client(TEAM_A_TOKEN)?;
    client.connect();

    wait_until(|| client.game_info().is_some()).await;
    let game_info = client.game_info().unwrap();
    assert_eq!(game_info.score_of("A"), Some(0.0));
    assert_eq!(game_info, ready_game_info());

    client.disconnect();
    authority.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_fetch_game_info_with_timeout() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    let client = authority.client(TEAM_B_TOKEN)?;
    client.connect();

    // Unset game info produces no reply.
    let result = client.fetch_game_info(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(pitch_sdk::SdkError::Timeout)));

    authority.server().set_game_info(Some(ready_game_info()));
    let game_info = client.fetch_game_info(Duration::from_secs(5)).await?;
    assert_eq!(game_info.score_of("B"), Some(0.0));

    client.disconnect();
    authority.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_no_game_info_for_unscored_team() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    authority.server().set_game_info(Some(ready_game_info()));

    let client = authority.client(TEAM_C_TOKEN)?;
    client.connect();

    assert_stays_false(Duration::from_millis(300), || client.game_info().is_some()).await;

    client.disconnect();
    authority.shutdown().await;
    Ok(())
}

struct Forward(mpsc::UnboundedSender<(ClientToken, RobotControl)>);

#[async_trait]
impl RobotControlHandler for Forward {
    async fn on_robot_control(
        &self,
        token: &ClientToken,
        control: &RobotControl,
    ) -> Result<(), HandlerError> {
        self.0
            .send((token.clone(), *control))
            .map_err(|e| HandlerError::Rejected(e.to_string()))
    }
}

#[tokio::test]
async fn test_kick_only_control_reaches_cache() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    authority
        .server()
        .register_robot_control_handler(Arc::new(Forward(tx)));

    let client = authority.client(TEAM_A_TOKEN)?;
    client
        .push_robot_control(&RobotControl::default().with_kick(sample_kick()))
        .await?;

    let (token, received) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("callback channel closed"))?;
    assert_eq!(token.as_str(), TEAM_A_TOKEN);
    assert_eq!(received.kick, Some(sample_kick()));

    let cached = authority.server().robot_control(TEAM_A_TOKEN).unwrap();
    assert!(cached.head.is_none());
    assert!(cached.movement.is_none());
    assert_eq!(cached.kick, Some(sample_kick()));

    // Other robots on the same team keep their own cache.
    assert_eq!(
        authority.server().robot_control(TEAM_A_TOKEN_2),
        Some(RobotControl::default())
    );

    authority.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_captured_image_over_streaming_channel() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    let client = authority.client(TEAM_B_TOKEN)?;
    client.connect();

    let image = CapturedImage::filled(ImageShape::new(3, 4), 1)?;
    authority.server().push_captured_image(TEAM_B_TOKEN, &image)?;

    wait_until(|| client.captured_image().is_some()).await;
    let received = client.captured_image().unwrap();
    assert_eq!(received.shape(), ImageShape::new(3, 4));
    assert_eq!(received.data().len(), 12);
    assert!(received.data().iter().all(|&b| b == 1));
    assert_eq!(received.pixel(2, 3, 0), Some(1));

    client.disconnect();
    authority.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_robot_status_reaches_named_peer_only() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    let team_a = authority.client(TEAM_A_TOKEN)?;
    let team_b = authority.client(TEAM_B_TOKEN)?;
    team_a.connect();
    team_b.connect();

    let status = RobotStatus::new(15.0, -3.0, &[0.0, 0.1, 9.8], &[0.0; 3], &[0.0, 0.0, 1.57], "A")?;
    authority.server().push_robot_status(TEAM_A_TOKEN, &status)?;

    wait_until(|| team_a.robot_status().is_some()).await;
    assert_eq!(team_a.robot_status(), Some(status));
    assert_stays_false(Duration::from_millis(200), || team_b.robot_status().is_some()).await;

    team_a.disconnect();
    team_b.disconnect();
    authority.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_team_info_heartbeat() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    let mut config = authority.client_config(TEAM_A_TOKEN_2);
    config.request_team_info = true;
    let client = pitch_sdk::Client::new(&config)?;
    client.connect();

    wait_until(|| client.team().is_some()).await;
    assert_eq!(client.team().as_deref(), Some("A"));

    client.disconnect();
    authority.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_channels_enforce_bearer_tokens() -> Result<(), anyhow::Error> {
    let authority = TestAuthority::spawn(default_registry()).await?;
    let http = reqwest::Client::new();

    for url in [authority.control_url(), authority.streaming_url()] {
        let response = http.get(&url).send().await?;
        assert_eq!(response.status(), 401);

        let response = http.get(&url).bearer_auth(UNKNOWN_TOKEN).send().await?;
        assert_eq!(response.status(), 403);

        let response = http
            .post(&url)
            .bearer_auth(UNKNOWN_TOKEN)
            .body(encode(&Message::to_server(MessageKind::GetGameInfo))?)
            .send()
            .await?;
        assert_eq!(response.status(), 403);

        let response = http.get(&url).bearer_auth(TEAM_A_TOKEN).send().await?;
        assert_eq!(response.status(), 204);
    }

    authority.shutdown().await;
    Ok(())
}
