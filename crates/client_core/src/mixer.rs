//! Mapping from high level drive intents to per-wheel power and the wire
//! tank command.

use shared::{domain::TurtleCommand, protocol::TankCommand};
use tracing::warn;

pub const MAX_MOTOR_VALUE: f64 = 255.0;

/// Normalized wheel power, each side in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelPower {
    pub left: f64,
    pub right: f64,
}

impl WheelPower {
    pub const STOP: WheelPower = WheelPower {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

/// Per-axis input shaping: `flip` inverts the axis, values whose magnitude
/// is at or below `zero` are treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisTuning {
    pub flip: bool,
    pub zero: f64,
}

impl AxisTuning {
    pub fn new(flip: bool, zero: f64) -> Self {
        Self { flip, zero }
    }
}

/// Fraction of full power below which each motor stalls.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorStall {
    pub left: f64,
    pub right: f64,
}

impl MotorStall {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

fn map_range(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> f64 {
    (value - from_min) * (to_max - to_min) / (from_max - from_min) + to_min
}

pub fn turtle_to_tank(command: TurtleCommand, speed: f64) -> WheelPower {
    let speed = speed.clamp(0.0, 1.0);
    match command {
        TurtleCommand::Stop => WheelPower::STOP,
        TurtleCommand::Forward => WheelPower::new(speed, speed),
        TurtleCommand::Reverse => WheelPower::new(-speed, -speed),
        TurtleCommand::Left => WheelPower::new(-speed, speed),
        TurtleCommand::Right => WheelPower::new(speed, -speed),
    }
}

/// Like [`turtle_to_tank`] for a command name coming from an input event.
/// Unrecognized names are logged and produce nothing.
pub fn turtle_name_to_tank(command: &str, speed: f64) -> Option<WheelPower> {
    match command.parse::<TurtleCommand>() {
        Ok(command) => Some(turtle_to_tank(command, speed)),
        Err(err) => {
            warn!(command, "ignoring turtle input: {err}");
            None
        }
    }
}

/// Throttle/steering to tank power. The zero zone is applied before flip;
/// steering slows the inner wheel.
pub fn joystick_to_tank(
    throttle: f64,
    steering: f64,
    throttle_tuning: AxisTuning,
    steering_tuning: AxisTuning,
) -> WheelPower {
    let mut throttle = throttle.clamp(-1.0, 1.0);
    let mut steering = steering.clamp(-1.0, 1.0);

    if throttle.abs() <= throttle_tuning.zero {
        throttle = 0.0;
    }
    if steering.abs() <= steering_tuning.zero {
        steering = 0.0;
    }

    if throttle_tuning.flip {
        throttle = -throttle;
    }
    if steering_tuning.flip {
        steering = -steering;
    }

    let mut power = WheelPower::new(throttle, throttle);
    if steering >= 0.0 {
        power.right *= 1.0 - steering;
    } else {
        power.left *= 1.0 + steering;
    }
    power
}

fn motor_value(value: f64, zero: f64, stall: f64) -> u8 {
    let zero = zero.clamp(0.0, 1.0);
    let magnitude = value.abs();
    if magnitude <= zero {
        return 0;
    }
    let floor = (stall.clamp(0.0, 1.0) * MAX_MOTOR_VALUE).round();
    // `as` truncates toward zero and saturates into 0..=255.
    map_range(magnitude, zero, 1.0, floor, MAX_MOTOR_VALUE) as u8
}

/// Build the tank command for `power`. Flip is applied first, then each side
/// outside its zero zone is scaled from its stall value up to full power, so
/// the motor never receives a nonzero value below its stall threshold.
pub fn format_tank_command(
    power: WheelPower,
    left_tuning: AxisTuning,
    right_tuning: AxisTuning,
    stall: MotorStall,
) -> TankCommand {
    let mut left = power.left.clamp(-1.0, 1.0);
    let mut right = power.right.clamp(-1.0, 1.0);

    if left_tuning.flip {
        left = -left;
    }
    if right_tuning.flip {
        right = -right;
    }

    TankCommand {
        left_magnitude: motor_value(left, left_tuning.zero, stall.left),
        left_forward: left >= 0.0,
        right_magnitude: motor_value(right, right_tuning.zero, stall.right),
        right_forward: right >= 0.0,
    }
}
