//! Common fixtures.

use chrono::{TimeZone, Utc};
use pitch_protocol::game::{GameInfo, GameStage};
use pitch_protocol::robot::KickCommand;
use pitch_sdk::ClientRegistry;
use std::collections::HashMap;

/// Token registered to team "A".
pub const TEAM_A_TOKEN: &str = "team-a-robot-1";

/// Second token registered to team "A".
pub const TEAM_A_TOKEN_2: &str = "team-a-robot-2";

/// Token registered to team "B".
pub const TEAM_B_TOKEN: &str = "team-b-robot-1";

/// Token registered to team "C", which has no score entry in
/// [`ready_game_info`].
pub const TEAM_C_TOKEN: &str = "team-c-robot-1";

/// A token nobody registered.
pub const UNKNOWN_TOKEN: &str = "intruder";

/// Registry with two robots on team "A" and one each on "B" and "C".
pub fn default_registry() -> ClientRegistry {
    ClientRegistry::new([
        (TEAM_A_TOKEN, "A"),
        (TEAM_A_TOKEN_2, "A"),
        (TEAM_B_TOKEN, "B"),
        (TEAM_C_TOKEN, "C"),
    ])
}

/// Ready-stage match, teams "A" and "B" at zero, simulation rate 1.0.
pub fn ready_game_info() -> GameInfo {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    GameInfo::new(
        GameStage::Ready,
        start,
        start + chrono::Duration::minutes(10),
        HashMap::from([("A".to_string(), 0.0), ("B".to_string(), 0.0)]),
        1.0,
    )
    .expect("fixture game info is valid")
}

/// A fully specified kick.
pub fn sample_kick() -> KickCommand {
    KickCommand {
        x: 1.0,
        y: 0.5,
        z: 0.0,
        speed: 4.0,
        delay: 0.25,
    }
}
