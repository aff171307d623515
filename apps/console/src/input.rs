use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use client_core::ArrowKey;
use shared::domain::{DriveMode, TurtleCommand};

pub const HELP: &str = "\
commands:
  mode <turtle|tank|joystick>     switch the driving mode
  forward|reverse|left|right|stop toggle a turtle button
  press <up|down|left|right>      arrow key down
  release <up|down|left|right>    arrow key up
  axes <one> <two>                move the virtual gamepad, values in [-1, 1]
  axis <one|two> <index>          pick the gamepad axis for a control
  flip <one|two> <on|off>         invert an axis
  zero <one|two> <value>          dead zone for an axis
  speed <0..1>                    turtle speed
  stall <one> <two>               motor stall fractions
  camera <var> <value>            change a camera setting
  status                          show the command socket and camera state
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    One,
    Two,
}

impl FromStr for Axis {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one" | "1" => Ok(Axis::One),
            "two" | "2" => Ok(Axis::Two),
            other => bail!("unknown axis '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Mode(DriveMode),
    Turtle(TurtleCommand),
    Press(ArrowKey),
    Release(ArrowKey),
    Axes(f64, f64),
    SelectAxis(Axis, usize),
    Flip(Axis, bool),
    Zero(Axis, f64),
    Speed(f64),
    Stall(f64, f64),
    Camera(String, String),
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let mut arg = |name: &str| {
            words
                .next()
                .ok_or_else(|| anyhow!("'{verb}' needs <{name}>"))
        };

        let command = match verb {
            "mode" => ConsoleCommand::Mode(arg("mode")?.parse()?),
            "press" => ConsoleCommand::Press(arrow(arg("key")?)?),
            "release" => ConsoleCommand::Release(arrow(arg("key")?)?),
            "axes" => ConsoleCommand::Axes(number(arg("one")?)?, number(arg("two")?)?),
            "axis" => {
                let axis = arg("axis")?.parse()?;
                let index = arg("index")?;
                ConsoleCommand::SelectAxis(
                    axis,
                    index
                        .parse()
                        .with_context(|| format!("invalid axis index '{index}'"))?,
                )
            }
            "flip" => {
                let axis = arg("axis")?.parse()?;
                let flip = match arg("on|off")? {
                    "on" | "true" => true,
                    "off" | "false" => false,
                    other => bail!("expected on or off, got '{other}'"),
                };
                ConsoleCommand::Flip(axis, flip)
            }
            "zero" => ConsoleCommand::Zero(arg("axis")?.parse()?, number(arg("value")?)?),
            "speed" => ConsoleCommand::Speed(number(arg("speed")?)?),
            "stall" => ConsoleCommand::Stall(number(arg("one")?)?, number(arg("two")?)?),
            "camera" => ConsoleCommand::Camera(arg("var")?.to_string(), arg("value")?.to_string()),
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Turtle(
                other
                    .parse()
                    .with_context(|| format!("unknown command '{other}', try 'help'"))?,
            ),
        };
        Ok(command)
    }
}

fn number(raw: &str) -> Result<f64> {
    raw.parse()
        .with_context(|| format!("invalid number '{raw}'"))
}

fn arrow(raw: &str) -> Result<ArrowKey> {
    match raw {
        "up" => Ok(ArrowKey::Up),
        "down" => Ok(ArrowKey::Down),
        "left" => Ok(ArrowKey::Left),
        "right" => Ok(ArrowKey::Right),
        other => bail!("unknown arrow key '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_turtle_buttons_and_modes() {
        assert_eq!(
            "forward".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Turtle(TurtleCommand::Forward)
        );
        assert_eq!(
            "mode  joystick".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Mode(DriveMode::Joystick)
        );
        assert_eq!(
            "press up".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Press(ArrowKey::Up)
        );
    }

    #[test]
    fn parses_gamepad_tuning() {
        assert_eq!(
            "axes -0.5 1".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Axes(-0.5, 1.0)
        );
        assert_eq!(
            "flip two on".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Flip(Axis::Two, true)
        );
        assert_eq!(
            "axis 1 3".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::SelectAxis(Axis::One, 3)
        );
    }

    #[test]
    fn reports_bad_input() {
        assert!("".parse::<ConsoleCommand>().is_err());
        assert!("spin".parse::<ConsoleCommand>().is_err());
        assert!("mode hover".parse::<ConsoleCommand>().is_err());
        let err = "stall 0.1".parse::<ConsoleCommand>().unwrap_err();
        assert_eq!(err.to_string(), "'stall' needs <two>");
    }
}
