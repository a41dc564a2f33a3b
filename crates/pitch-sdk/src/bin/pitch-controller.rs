//! Pitchlink Controller
//!
//! Minimal robot controller. Connects to the referee, periodically logs the
//! state it has cached and keeps the head centred.

use pitch_protocol::robot::{HeadCommand, RobotControl};
use pitch_sdk::observability::{init_tracing, DEFAULT_LOG_FILTER};
use pitch_sdk::shutdown::shutdown_signal;
use pitch_sdk::{Client, ClientConfig};
use std::time::Duration;
use tracing::{error, info, warn};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(DEFAULT_LOG_FILTER);

    info!("Starting Pitchlink Controller");

    let config = ClientConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        control_url = %config.control_url(),
        streaming_url = %config.streaming_url(),
        wire_format = %config.wire_format,
        "Configuration loaded successfully"
    );

    let client = Client::new(&config)?;
    client.connect();

    match client.fetch_game_info(config.heartbeat_interval * 3).await {
        Ok(game_info) => info!(stage = %game_info.stage(), "Joined match"),
        Err(e) => warn!("No game info yet: {}", e),
    }

    let centre_head = RobotControl::default().with_head(HeadCommand {
        head_angle: Some(0.0),
        neck_angle: Some(0.0),
    });

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = report.tick() => {
                match client.game_info() {
                    Some(game_info) => info!(
                        stage = %game_info.stage(),
                        score = ?game_info.score(),
                        "Game info"
                    ),
                    None => info!("Waiting for game info"),
                }
                if let Some(status) = client.robot_status() {
                    info!(
                        team = status.team(),
                        head_angle = status.head_angle(),
                        neck_angle = status.neck_angle(),
                        "Robot status"
                    );
                }
                if let Some(image) = client.captured_image() {
                    info!(shape = %image.shape(), "Latest frame");
                }
                client.push_robot_control(&centre_head).await?;
            }
        }
    }

    client.disconnect();
    info!("Pitchlink Controller shutdown complete");

    Ok(())
}
