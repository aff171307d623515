//! Motor stall settings.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tracing::{error, info};

use crate::{
    error::StateError,
    mixer::MotorStall,
    rover::StallSource,
    view::{self, RenderSink, ViewState},
};

pub const MOTOR_ONE_STALL: &str = "motorOneStall";
pub const MOTOR_TWO_STALL: &str = "motorTwoStall";

/// Fraction of full throttle below which each motor stalls, in [0, 1].
pub struct MotorSettings {
    sink: Arc<dyn RenderSink>,
    state: Mutex<ViewState>,
}

impl MotorSettings {
    pub fn new(sink: Arc<dyn RenderSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(ViewState::new([
                (MOTOR_ONE_STALL, json!(0.0)),
                (MOTOR_TWO_STALL, json!(0.0)),
            ])),
        }
    }

    pub fn motor_one_stall(&self) -> f64 {
        self.read(MOTOR_ONE_STALL)
    }

    pub fn motor_two_stall(&self) -> f64 {
        self.read(MOTOR_TWO_STALL)
    }

    pub fn set_motor_one_stall(&self, stall: f64) -> Result<(), StateError> {
        self.write(MOTOR_ONE_STALL, stall)
    }

    pub fn set_motor_two_stall(&self, stall: f64) -> Result<(), StateError> {
        self.write(MOTOR_TWO_STALL, stall)
    }

    pub fn update_view(&self, force: bool) -> Result<(), StateError> {
        let mut state = self.lock();
        view::enforce(&mut state, self.sink.as_ref(), MOTOR_ONE_STALL, force)?;
        view::enforce(&mut state, self.sink.as_ref(), MOTOR_TWO_STALL, force)?;
        Ok(())
    }

    fn write(&self, key: &str, stall: f64) -> Result<(), StateError> {
        let stall = stall.clamp(0.0, 1.0);
        info!(motor = key, stall, "motor stall changed");
        self.lock().set_value(key, json!(stall))
    }

    fn read(&self, key: &str) -> f64 {
        view::number(&self.lock(), key).unwrap_or_else(|err| {
            error!(key, "motor stall unavailable: {err}");
            0.0
        })
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StallSource for MotorSettings {
    fn stall(&self) -> MotorStall {
        MotorStall::new(self.motor_one_stall(), self.motor_two_stall())
    }
}

#[cfg(test)]
mod tests {
    use crate::view::NullSink;

    use super::*;

    #[test]
    fn stall_values_are_clamped_and_exposed_as_a_source() {
        let motors = MotorSettings::new(Arc::new(NullSink));
        assert_eq!(motors.stall(), MotorStall::default());

        motors.set_motor_one_stall(0.25).unwrap();
        motors.set_motor_two_stall(4.0).unwrap();
        assert_eq!(motors.stall(), MotorStall::new(0.25, 1.0));

        motors.update_view(false).unwrap();
        assert!(!motors.lock().is_staged(MOTOR_ONE_STALL).unwrap());
    }
}
