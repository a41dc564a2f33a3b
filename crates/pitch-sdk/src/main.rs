//! Pitchlink Referee
//!
//! Match authority process. Serves the control and streaming channels for
//! every registered robot, seeds a ready-stage match and logs the control
//! commands robots send.

use async_trait::async_trait;
use chrono::Utc;
use common::types::ClientToken;
use pitch_protocol::game::{GameInfo, GameStage};
use pitch_protocol::robot::RobotControl;
use pitch_sdk::observability::{
    init_metrics_recorder, init_tracing, metrics_router, DEFAULT_LOG_FILTER,
};
use pitch_sdk::shutdown::shutdown_signal;
use pitch_sdk::{ClientRegistry, RobotControlHandler, Server, ServerConfig};
use pitch_transport::HandlerError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Logs every robot control command by team.
struct ControlLogger {
    registry: ClientRegistry,
}

#[async_trait]
impl RobotControlHandler for ControlLogger {
    async fn on_robot_control(
        &self,
        token: &ClientToken,
        control: &RobotControl,
    ) -> Result<(), HandlerError> {
        info!(
            team = self.registry.team_of(token.as_str()).unwrap_or("unknown"),
            head = ?control.head,
            movement = ?control.movement,
            kick = ?control.kick,
            "Robot control received"
        );
        Ok(())
    }
}

/// Ready-stage match starting now, every registered team at zero.
fn initial_game_info(config: &ServerConfig) -> Result<GameInfo, Box<dyn std::error::Error>> {
    let start_time = Utc::now();
    let end_time = start_time + chrono::Duration::from_std(config.match_duration)?;
    let score: HashMap<String, f64> = config
        .registry
        .teams()
        .into_iter()
        .map(|team| (team.to_string(), 0.0))
        .collect();

    Ok(GameInfo::new(
        GameStage::Ready,
        start_time,
        end_time,
        score,
        1.0,
    )?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(DEFAULT_LOG_FILTER);

    info!("Starting Pitchlink Referee");

    let config = ServerConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        control_address = %config.control_address(),
        streaming_address = %config.streaming_address(),
        registry = ?config.registry,
        queue_capacity = config.queue_capacity,
        wire_format = %config.wire_format,
        "Configuration loaded successfully"
    );

    let metrics_cancel = CancellationToken::new();
    if let Some(metrics_address) = config.metrics_bind_address {
        let handle = init_metrics_recorder()?;
        let listener = tokio::net::TcpListener::bind(metrics_address).await?;
        let shutdown = metrics_cancel.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, metrics_router(handle))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Metrics server failed: {}", e);
            }
        });
        info!("Metrics exporter listening on {}", metrics_address);
    }

    let server = Server::new(&config);
    server.set_game_info(Some(initial_game_info(&config)?));
    server.register_robot_control_handler(Arc::new(ControlLogger {
        registry: config.registry.clone(),
    }));

    server.start().await.map_err(|e| {
        error!("Failed to start server: {}", e);
        e
    })?;

    shutdown_signal().await;

    server.stop().await;
    metrics_cancel.cancel();

    info!("Pitchlink Referee shutdown complete");

    Ok(())
}
