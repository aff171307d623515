//! Text frames exchanged with the rover over the command socket.
//!
//! Client to device: `cmd(<sequence>, tank(<left>, <left_forward>, <right>, <right_forward>))`.
//! Device to client: an exact echo of the `cmd(...)` frame as acknowledgement,
//! or `log(<message>)` for diagnostics.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// WebSocket subprotocol the rover firmware accepts on both sockets.
pub const DEVICE_SUBPROTOCOL: &str = "arduino";
pub const COMMAND_PREFIX: &str = "cmd(";
pub const LOG_PREFIX: &str = "log(";
pub const TANK_PREFIX: &str = "tank(";

/// Per-wheel drive magnitudes and directions as understood by the motor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TankCommand {
    pub left_magnitude: u8,
    pub left_forward: bool,
    pub right_magnitude: u8,
    pub right_forward: bool,
}

impl TankCommand {
    pub const STOP: TankCommand = TankCommand {
        left_magnitude: 0,
        left_forward: true,
        right_magnitude: 0,
        right_forward: true,
    };
}

impl fmt::Display for TankCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tank({}, {}, {}, {})",
            self.left_magnitude, self.left_forward, self.right_magnitude, self.right_forward
        )
    }
}

impl FromStr for TankCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedCommand(s.to_string());
        let body = s
            .strip_prefix(TANK_PREFIX)
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(malformed)?;
        let fields: Vec<&str> = body.split(',').map(str::trim).collect();
        let [left, left_forward, right, right_forward] = fields.as_slice() else {
            return Err(malformed());
        };
        Ok(Self {
            left_magnitude: left.parse().map_err(|_| malformed())?,
            left_forward: left_forward.parse().map_err(|_| malformed())?,
            right_magnitude: right.parse().map_err(|_| malformed())?,
            right_forward: right_forward.parse().map_err(|_| malformed())?,
        })
    }
}

/// A sequenced command frame. Its `Display` form is the exact text the device echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub sequence: u64,
    pub payload: TankCommand,
}

impl CommandEnvelope {
    pub fn new(sequence: u64, payload: TankCommand) -> Self {
        Self { sequence, payload }
    }
}

impl fmt::Display for CommandEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd({}, {})", self.sequence, self.payload)
    }
}

impl FromStr for CommandEnvelope {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedCommand(s.to_string());
        let body = s
            .strip_prefix(COMMAND_PREFIX)
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(malformed)?;
        let (sequence, payload) = body.split_once(',').ok_or_else(malformed)?;
        Ok(Self {
            sequence: sequence.trim().parse().map_err(|_| malformed())?,
            payload: payload.trim().parse()?,
        })
    }
}

/// Shape of a text frame received on the command socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFrame<'a> {
    Log(&'a str),
    Command(&'a str),
    Other(&'a str),
}

impl<'a> DeviceFrame<'a> {
    pub fn classify(text: &'a str) -> Self {
        if text.starts_with(LOG_PREFIX) {
            DeviceFrame::Log(text)
        } else if text.starts_with(COMMAND_PREFIX) {
            DeviceFrame::Command(text)
        } else {
            DeviceFrame::Other(text)
        }
    }
}

pub fn log_frame(message: &str) -> String {
    format!("{LOG_PREFIX}{message})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tank_command_renders_wire_format() {
        let command = TankCommand {
            left_magnitude: 255,
            left_forward: true,
            right_magnitude: 12,
            right_forward: false,
        };
        assert_eq!(command.to_string(), "tank(255, true, 12, false)");
        assert_eq!(
            CommandEnvelope::new(7, command).to_string(),
            "cmd(7, tank(255, true, 12, false))"
        );
    }

    #[test]
    fn envelope_parses_what_it_renders() {
        let text = "cmd(42, tank(0, true, 128, false))";
        let envelope: CommandEnvelope = text.parse().expect("parse");
        assert_eq!(envelope.sequence, 42);
        assert_eq!(envelope.payload.right_magnitude, 128);
        assert!(!envelope.payload.right_forward);
        assert_eq!(envelope.to_string(), text);
    }

    #[test]
    fn rejects_out_of_range_and_truncated_frames() {
        assert!("tank(256, true, 0, true)".parse::<TankCommand>().is_err());
        assert!("tank(1, true, 0)".parse::<TankCommand>().is_err());
        assert!("cmd(x, tank(1, true, 0, true))"
            .parse::<CommandEnvelope>()
            .is_err());
        assert!("cmd(1 tank(1, true, 0, true)".parse::<CommandEnvelope>().is_err());
    }

    #[test]
    fn classifies_device_frames_by_prefix() {
        assert_eq!(DeviceFrame::classify("log(boot)"), DeviceFrame::Log("log(boot)"));
        assert!(matches!(DeviceFrame::classify("cmd(1, x)"), DeviceFrame::Command(_)));
        assert!(matches!(DeviceFrame::classify("hello"), DeviceFrame::Other(_)));
        assert_eq!(log_frame("ready"), "log(ready)");
    }

    #[test]
    fn device_subprotocol_is_arduino() {
        assert_eq!(DEVICE_SUBPROTOCOL, "arduino");
    }
}
