use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurtleCommand {
    Stop,
    Forward,
    Reverse,
    Left,
    Right,
}

impl TurtleCommand {
    pub const ALL: [TurtleCommand; 5] = [
        TurtleCommand::Stop,
        TurtleCommand::Forward,
        TurtleCommand::Reverse,
        TurtleCommand::Left,
        TurtleCommand::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TurtleCommand::Stop => "stop",
            TurtleCommand::Forward => "forward",
            TurtleCommand::Reverse => "reverse",
            TurtleCommand::Left => "left",
            TurtleCommand::Right => "right",
        }
    }
}

impl fmt::Display for TurtleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurtleCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownTurtleCommand(s.to_string()))
    }
}

/// Input mode that may drive the command channel. At most one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    Turtle,
    Tank,
    Joystick,
}

impl DriveMode {
    pub const ALL: [DriveMode; 3] = [DriveMode::Turtle, DriveMode::Tank, DriveMode::Joystick];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriveMode::Turtle => "turtle",
            DriveMode::Tank => "tank",
            DriveMode::Joystick => "joystick",
        }
    }

    pub fn activated_topic(&self) -> String {
        format!("MODE_ACTIVATED({})", self.as_str())
    }

    pub fn deactivated_topic(&self) -> String {
        format!("MODE_DEACTIVATED({})", self.as_str())
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriveMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownDriveMode(s.to_string()))
    }
}

/// A connected input device as reported by the platform's gamepad API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamepadInfo {
    pub index: usize,
    pub id: String,
    pub axis_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turtle_commands_parse_from_wire_names() {
        assert_eq!("left".parse::<TurtleCommand>().unwrap(), TurtleCommand::Left);
        assert_eq!(
            "stop".parse::<TurtleCommand>().unwrap().to_string(),
            "stop"
        );
        assert!(matches!(
            "spin".parse::<TurtleCommand>(),
            Err(ProtocolError::UnknownTurtleCommand(name)) if name == "spin"
        ));
    }

    #[test]
    fn mode_topics_name_the_mode() {
        assert_eq!(DriveMode::Tank.activated_topic(), "MODE_ACTIVATED(tank)");
        assert_eq!(
            DriveMode::Joystick.deactivated_topic(),
            "MODE_DEACTIVATED(joystick)"
        );
        assert_eq!("turtle".parse::<DriveMode>().unwrap(), DriveMode::Turtle);
    }

    #[test]
    fn gamepad_info_round_trips_through_json() {
        let info = GamepadInfo {
            index: 1,
            id: "pad".into(),
            axis_count: 4,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["axis_count"], 4);
    }
}
