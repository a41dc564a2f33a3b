//! Match state owned by the authority.

use crate::error::ProtocolError;
use crate::message::{Message, MessageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Stage of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStage {
    /// Ready to kick off.
    Ready,
    /// Being played.
    InProgress,
    /// Temporarily halted.
    Paused,
    /// Ended normally.
    Finished,
    /// Ended abnormally.
    Aborted,
}

impl GameStage {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            GameStage::Ready => "ready",
            GameStage::InProgress => "in_progress",
            GameStage::Paused => "paused",
            GameStage::Finished => "finished",
            GameStage::Aborted => "aborted",
        }
    }
}

impl FromStr for GameStage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(GameStage::Ready),
            "in_progress" => Ok(GameStage::InProgress),
            "paused" => Ok(GameStage::Paused),
            "finished" => Ok(GameStage::Finished),
            "aborted" => Ok(GameStage::Aborted),
            other => Err(ProtocolError::InvalidGameInfo(format!(
                "unknown game stage '{other}'"
            ))),
        }
    }
}

impl fmt::Display for GameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative match information.
///
/// Scores are plain numbers keyed by team name. Timestamps are kept with
/// millisecond precision, which is what the wire carries.
#[derive(Debug, Clone, PartialEq)]
pub struct GameInfo {
    stage: GameStage,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    score: HashMap<String, f64>,
    simulation_rate: f64,
}

/// Wire layout of a `get_game_info` reply.
#[derive(Serialize, Deserialize)]
struct GameInfoWire {
    stage: GameStage,
    start_time: f64,
    end_time: f64,
    score: HashMap<String, f64>,
    simulation_rate: f64,
}

impl GameInfo {
    /// Create game information.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidGameInfo`] if `simulation_rate` is not
    /// a positive finite number.
    pub fn new(
        stage: GameStage,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        score: HashMap<String, f64>,
        simulation_rate: f64,
    ) -> Result<Self, ProtocolError> {
        validate_simulation_rate(simulation_rate)?;
        Ok(Self {
            stage,
            start_time,
            end_time,
            score,
            simulation_rate,
        })
    }

    #[must_use]
    pub fn stage(&self) -> GameStage {
        self.stage
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Scores of every team in the match.
    #[must_use]
    pub fn score(&self) -> &HashMap<String, f64> {
        &self.score
    }

    /// Score of one team, `None` if the team is not in the match.
    #[must_use]
    pub fn score_of(&self, team: &str) -> Option<f64> {
        self.score.get(team).copied()
    }

    #[must_use]
    pub fn simulation_rate(&self) -> f64 {
        self.simulation_rate
    }

    pub fn set_stage(&mut self, stage: GameStage) {
        self.stage = stage;
    }

    pub fn set_score(&mut self, team: impl Into<String>, score: f64) {
        self.score.insert(team.into(), score);
    }

    /// Serialize as a `get_game_info` reply bound to a client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BsonEncode`] if the fields cannot be encoded.
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let wire = GameInfoWire {
            stage: self.stage,
            start_time: to_epoch_seconds(self.start_time),
            end_time: to_epoch_seconds(self.end_time),
            score: self.score.clone(),
            simulation_rate: self.simulation_rate,
        };
        let fields = bson::to_document(&wire)?;
        Ok(Message::to_client(MessageKind::GetGameInfo).with_fields(fields))
    }

    /// Read game information out of a `get_game_info` reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedKind`] for other message types and
    /// [`ProtocolError::InvalidPayload`] / [`ProtocolError::InvalidGameInfo`]
    /// for missing or out-of-range fields.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        message.expect_kind(&MessageKind::GetGameInfo)?;

        let wire: GameInfoWire = bson::from_document(message.document().clone())
            .map_err(|e| ProtocolError::payload(MessageKind::GetGameInfo.as_str(), e))?;

        Self::new(
            wire.stage,
            from_epoch_seconds("start_time", wire.start_time)?,
            from_epoch_seconds("end_time", wire.end_time)?,
            wire.score,
            wire.simulation_rate,
        )
    }
}

fn validate_simulation_rate(rate: f64) -> Result<(), ProtocolError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(ProtocolError::InvalidGameInfo(format!(
            "simulation_rate must be positive, got {rate}"
        )))
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_seconds(field: &str, seconds: f64) -> Result<DateTime<Utc>, ProtocolError> {
    if !seconds.is_finite() {
        return Err(ProtocolError::InvalidGameInfo(format!(
            "{field} must be a finite timestamp"
        )));
    }
    let millis = (seconds * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        ProtocolError::InvalidGameInfo(format!("{field} is out of range: {seconds}"))
    })
}
