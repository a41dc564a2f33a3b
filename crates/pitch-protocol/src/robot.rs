//! Robot telemetry and actuator commands.
//!
//! [`RobotStatus`] flows from the authority to a peer; [`RobotControl`]
//! flows from a peer to the authority. Angles are in degrees.

use crate::error::ProtocolError;
use crate::message::{Message, MessageKind};
use serde::{Deserialize, Serialize};

/// Sensor snapshot of one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotStatus {
    head_angle: f64,
    neck_angle: f64,
    acceleration: [f64; 3],
    angular_velocity: [f64; 3],
    attitude_angle: [f64; 3],
    team: String,
}

#[derive(Serialize, Deserialize)]
struct HeadWire {
    head_angle: f64,
    neck_angle: f64,
}

#[derive(Serialize, Deserialize)]
struct AccelerationWire {
    x: f64,
    y: f64,
    z: f64,
}

/// Rotation triple, ordered pitch / yaw / roll.
#[derive(Serialize, Deserialize)]
struct RotationWire {
    pitch: f64,
    yaw: f64,
    roll: f64,
}

#[derive(Serialize, Deserialize)]
struct ImuWire {
    acceleration: AccelerationWire,
    angular_velocity: RotationWire,
    attitude_angle: RotationWire,
}

#[derive(Serialize, Deserialize)]
struct RobotStatusWire {
    head: HeadWire,
    imu: ImuWire,
    team: String,
}

impl RotationWire {
    fn from_array([pitch, yaw, roll]: [f64; 3]) -> Self {
        Self { pitch, yaw, roll }
    }

    fn to_array(&self) -> [f64; 3] {
        [self.pitch, self.yaw, self.roll]
    }
}

impl RobotStatus {
    /// Create a status snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ShapeMismatch`] unless `acceleration`,
    /// `angular_velocity` and `attitude_angle` each have exactly 3 components.
    pub fn new(
        head_angle: f64,
        neck_angle: f64,
        acceleration: &[f64],
        angular_velocity: &[f64],
        attitude_angle: &[f64],
        team: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            head_angle,
            neck_angle,
            acceleration: three_components("acceleration", acceleration)?,
            angular_velocity: three_components("angular_velocity", angular_velocity)?,
            attitude_angle: three_components("attitude_angle", attitude_angle)?,
            team: team.into(),
        })
    }

    #[must_use]
    pub fn head_angle(&self) -> f64 {
        self.head_angle
    }

    #[must_use]
    pub fn neck_angle(&self) -> f64 {
        self.neck_angle
    }

    /// Linear acceleration as `[x, y, z]`.
    #[must_use]
    pub fn acceleration(&self) -> [f64; 3] {
        self.acceleration
    }

    /// Angular velocity as `[pitch, yaw, roll]`.
    #[must_use]
    pub fn angular_velocity(&self) -> [f64; 3] {
        self.angular_velocity
    }

    /// Attitude as `[pitch, yaw, roll]`.
    #[must_use]
    pub fn attitude_angle(&self) -> [f64; 3] {
        self.attitude_angle
    }

    #[must_use]
    pub fn team(&self) -> &str {
        &self.team
    }

    /// Serialize as a `push_robot_status` message bound to a client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BsonEncode`] if the fields cannot be encoded.
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let [x, y, z] = self.acceleration;
        let wire = RobotStatusWire {
            head: HeadWire {
                head_angle: self.head_angle,
                neck_angle: self.neck_angle,
            },
            imu: ImuWire {
                acceleration: AccelerationWire { x, y, z },
                angular_velocity: RotationWire::from_array(self.angular_velocity),
                attitude_angle: RotationWire::from_array(self.attitude_angle),
            },
            team: self.team.clone(),
        };
        let fields = bson::to_document(&wire)?;
        Ok(Message::to_client(MessageKind::PushRobotStatus).with_fields(fields))
    }

    /// Read a status snapshot out of a `push_robot_status` message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedKind`] for other message types and
    /// [`ProtocolError::InvalidPayload`] for missing or mistyped fields.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        message.expect_kind(&MessageKind::PushRobotStatus)?;

        let wire: RobotStatusWire = bson::from_document(message.document().clone())
            .map_err(|e| ProtocolError::payload(MessageKind::PushRobotStatus.as_str(), e))?;

        let acceleration = &wire.imu.acceleration;
        Ok(Self {
            head_angle: wire.head.head_angle,
            neck_angle: wire.head.neck_angle,
            acceleration: [acceleration.x, acceleration.y, acceleration.z],
            angular_velocity: wire.imu.angular_velocity.to_array(),
            attitude_angle: wire.imu.attitude_angle.to_array(),
            team: wire.team,
        })
    }
}

fn three_components(field: &'static str, values: &[f64]) -> Result<[f64; 3], ProtocolError> {
    <[f64; 3]>::try_from(values).map_err(|_| ProtocolError::ShapeMismatch {
        field,
        expected: 3,
        actual: values.len(),
    })
}

/// Head actuator command. Absent angles leave the joint where it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neck_angle: Option<f64>,
}

/// Walking command. Absent components are not commanded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega_z: Option<f64>,
}

/// Kick command. Every field is required.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KickCommand {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub speed: f64,
    pub delay: f64,
}

/// Actuator command from a peer.
///
/// Each sub-command is independently optional. Absent sub-commands are
/// omitted from the wire message entirely. The default value carries no
/// sub-command at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<HeadCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<MovementCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick: Option<KickCommand>,
}

impl RobotControl {
    /// Whether no sub-command is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.movement.is_none() && self.kick.is_none()
    }

    #[must_use]
    pub fn with_head(mut self, head: HeadCommand) -> Self {
        self.head = Some(head);
        self
    }

    #[must_use]
    pub fn with_movement(mut self, movement: MovementCommand) -> Self {
        self.movement = Some(movement);
        self
    }

    #[must_use]
    pub fn with_kick(mut self, kick: KickCommand) -> Self {
        self.kick = Some(kick);
        self
    }

    /// Serialize as a `push_robot_control` message bound to the authority.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BsonEncode`] if the fields cannot be encoded.
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        let fields = bson::to_document(self)?;
        Ok(Message::to_server(MessageKind::PushRobotControl).with_fields(fields))
    }

    /// Read a command out of a `push_robot_control` message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedKind`] for other message types and
    /// [`ProtocolError::InvalidPayload`] if a present sub-command is malformed,
    /// e.g. a kick missing one of its fields.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        message.expect_kind(&MessageKind::PushRobotControl)?;
        bson::from_document(message.document().clone())
            .map_err(|e| ProtocolError::payload(MessageKind::PushRobotControl.as_str(), e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::message::BoundTo;
    use bson::{doc, Bson};

    fn sample_status() -> RobotStatus {
        RobotStatus::new(
            12.5,
            -3.0,
            &[0.1, 0.2, 9.81],
            &[1.0, 2.0, 3.0],
            &[4.0, 5.0, 6.0],
            "red",
        )
        .unwrap()
    }

    fn sample_kick() -> KickCommand {
        KickCommand {
            x: 1.0,
            y: 0.5,
            z: 0.0,
            speed: 3.5,
            delay: 0.25,
        }
    }

    #[test]
    fn test_status_rejects_wrong_component_count() {
        let result = RobotStatus::new(0.0, 0.0, &[1.0, 2.0], &[0.0; 3], &[0.0; 3], "red");
        assert!(matches!(
            result,
            Err(ProtocolError::ShapeMismatch {
                field: "acceleration",
                expected: 3,
                actual: 2
            })
        ));

        let result = RobotStatus::new(0.0, 0.0, &[0.0; 3], &[0.0; 3], &[0.0; 4], "red");
        assert!(matches!(
            result,
            Err(ProtocolError::ShapeMismatch {
                field: "attitude_angle",
                actual: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_status_wire_layout() {
        let message = sample_status().to_message().unwrap();

        assert_eq!(message.kind(), &MessageKind::PushRobotStatus);
        assert_eq!(message.bound_to(), BoundTo::Client);
        assert_eq!(
            message.get("head"),
            Some(&Bson::Document(doc! { "head_angle": 12.5, "neck_angle": -3.0 }))
        );
        assert_eq!(
            message.document().get_document("imu").unwrap(),
            &doc! {
                "acceleration": { "x": 0.1, "y": 0.2, "z": 9.81 },
                "angular_velocity": { "pitch": 1.0, "yaw": 2.0, "roll": 3.0 },
                "attitude_angle": { "pitch": 4.0, "yaw": 5.0, "roll": 6.0 },
            }
        );
        assert_eq!(message.get("team"), Some(&Bson::String("red".to_string())));
    }

    #[test]
    fn test_status_round_trip() {
        let status = sample_status();
        let decoded = decode(&encode(&status.to_message().unwrap()).unwrap()).unwrap();
        assert_eq!(RobotStatus::from_message(&decoded).unwrap(), status);
    }

    #[test]
    fn test_status_from_message_rejects_missing_imu() {
        let message = Message::to_client(MessageKind::PushRobotStatus)
            .with_field("head", doc! { "head_angle": 0.0, "neck_angle": 0.0 })
            .with_field("team", "red");

        let result = RobotStatus::from_message(&message);
        assert!(matches!(result, Err(ProtocolError::InvalidPayload { .. })));
    }

    #[test]
    fn test_control_omits_absent_sub_commands() {
        let control = RobotControl::default().with_kick(sample_kick());

        let message = control.to_message().unwrap();

        assert_eq!(message.bound_to(), BoundTo::Server);
        assert!(message.get("head").is_none());
        assert!(message.get("movement").is_none());
        assert_eq!(
            message.get("kick"),
            Some(&Bson::Document(doc! {
                "x": 1.0, "y": 0.5, "z": 0.0, "speed": 3.5, "delay": 0.25,
            }))
        );
    }

    #[test]
    fn test_control_omits_absent_fields_inside_sub_command() {
        let control = RobotControl::default().with_movement(MovementCommand {
            x: Some(0.3),
            y: None,
            omega_z: Some(-0.1),
        });

        let message = control.to_message().unwrap();

        assert_eq!(
            message.get("movement"),
            Some(&Bson::Document(doc! { "x": 0.3, "omega_z": -0.1 }))
        );
    }

    #[test]
    fn test_control_round_trip_kick_only() {
        let control = RobotControl::default().with_kick(sample_kick());

        let decoded = decode(&encode(&control.to_message().unwrap()).unwrap()).unwrap();
        let parsed = RobotControl::from_message(&decoded).unwrap();

        assert_eq!(parsed.head, None);
        assert_eq!(parsed.movement, None);
        assert_eq!(parsed.kick, Some(sample_kick()));
    }

    #[test]
    fn test_control_rejects_incomplete_kick() {
        let message = Message::to_server(MessageKind::PushRobotControl)
            .with_field("kick", doc! { "x": 1.0, "y": 0.0, "z": 0.0, "speed": 2.0 });

        let result = RobotControl::from_message(&message);
        assert!(matches!(result, Err(ProtocolError::InvalidPayload { .. })));
    }

    #[test]
    fn test_empty_control_message() {
        let message = Message::to_server(MessageKind::PushRobotControl);
        let control = RobotControl::from_message(&message).unwrap();
        assert!(control.is_empty());
    }

    #[test]
    fn test_control_with_head_and_movement() {
        let control = RobotControl::default()
            .with_head(HeadCommand {
                head_angle: Some(10.0),
                neck_angle: None,
            })
            .with_movement(MovementCommand::default());

        let parsed = RobotControl::from_message(&control.to_message().unwrap()).unwrap();

        assert_eq!(parsed, control);
        assert!(!parsed.is_empty());
        assert_eq!(parsed.kick, None);
    }
}
