//! Gamepad axis selection and polling for the tank and joystick modes.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use serde_json::{json, Value};
use shared::domain::GamepadInfo;
use tracing::{debug, info, warn};

use crate::{
    bus::{MessageBus, Subscriber, SubscriberHandle},
    error::{BusError, StateError},
    mixer::AxisTuning,
    scheduler::{FrameLoop, FrameTask, ListenerCount},
    view::{self, Listener, RenderSink, ViewState},
};

pub const GAMEPAD_CONNECTED: &str = "gamepadconnected";
pub const GAMEPAD_DISCONNECTED: &str = "gamepaddisconnected";

pub const GAMEPAD_NAMES: &str = "gamePadNames";
pub const GAMEPAD_INDICES: &str = "gamePadIndices";
pub const GAMEPAD_AXES: &str = "gamePadAxes";
pub const SELECTED: &str = "selected";
pub const AXIS_COUNT: &str = "axisCount";
pub const AXIS_ONE: &str = "axisOne";
pub const AXIS_ONE_VALUE: &str = "axisOneValue";
pub const AXIS_ONE_FLIP: &str = "axisOneFlip";
pub const AXIS_ONE_ZERO: &str = "axisOneZero";
pub const AXIS_TWO: &str = "axisTwo";
pub const AXIS_TWO_VALUE: &str = "axisTwoValue";
pub const AXIS_TWO_FLIP: &str = "axisTwoFlip";
pub const AXIS_TWO_ZERO: &str = "axisTwoZero";

/// Source of connected devices and their raw axis values.
pub trait GamepadProvider: Send + Sync {
    fn connected_devices(&self) -> Vec<GamepadInfo>;
    /// Current value of `axis` on `device`, in [-1, 1]. Unknown devices or
    /// axes read as 0.
    fn axis_value(&self, device: usize, axis: usize) -> f64;
}

/// Latest sampled axis pair with the tuning chosen for each axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisReading {
    pub axis_one: f64,
    pub axis_two: f64,
    pub axis_one_tuning: AxisTuning,
    pub axis_two_tuning: AxisTuning,
}

pub trait AxisSource: Send + Sync {
    fn read_axes(&self) -> AxisReading;
}

fn default_state() -> ViewState {
    ViewState::new([
        (GAMEPAD_NAMES, json!([])),
        (GAMEPAD_INDICES, json!([])),
        (GAMEPAD_AXES, json!([])),
        (SELECTED, json!(-1)),
        (AXIS_COUNT, json!(0)),
        (AXIS_ONE, json!(0)),
        (AXIS_ONE_VALUE, json!(0.0)),
        (AXIS_ONE_FLIP, json!(false)),
        (AXIS_ONE_ZERO, json!(0.0)),
        (AXIS_TWO, json!(0)),
        (AXIS_TWO_VALUE, json!(0.0)),
        (AXIS_TWO_FLIP, json!(false)),
        (AXIS_TWO_ZERO, json!(0.0)),
    ])
}

struct GamepadView {
    state: ViewState,
    listening: ListenerCount,
    frame_loop: FrameLoop,
}

/// Polls the selected gamepad while listening and renders the axis
/// configuration. `selected` holds the device index reported by the
/// provider, or -1 when no device is selected.
pub struct GamepadController {
    name: &'static str,
    provider: Arc<dyn GamepadProvider>,
    bus: Arc<MessageBus>,
    sink: Arc<dyn RenderSink>,
    view: Mutex<GamepadView>,
    this: Weak<GamepadController>,
}

impl GamepadController {
    pub fn new(
        name: &'static str,
        provider: Arc<dyn GamepadProvider>,
        bus: Arc<MessageBus>,
        sink: Arc<dyn RenderSink>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name,
            provider,
            bus,
            sink,
            view: Mutex::new(GamepadView {
                state: default_state(),
                listening: ListenerCount::default(),
                frame_loop: FrameLoop::new(name, poll_interval),
            }),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Sample the devices, then render whatever changed (everything when
    /// `force` is set).
    pub fn update_view(&self, force: bool) -> Result<(), StateError> {
        let devices = self.provider.connected_devices();
        let mut guard = self.lock();
        update_connected(&mut guard.state, &devices)?;
        self.update_axis_values(&mut guard.state)?;
        self.enforce_view(&mut guard.state, force)
    }

    /// Index of the selected device, if any.
    pub fn selected_device(&self) -> Option<usize> {
        selected_device(&self.lock().state).ok().flatten()
    }

    pub fn select_gamepad(&self, device: i64) -> Result<(), StateError> {
        let devices = self.provider.connected_devices();
        let mut guard = self.lock();
        guard.state.set_value(SELECTED, json!(device))?;
        update_connected(&mut guard.state, &devices)
    }

    pub fn select_axis_one(&self, axis: usize) -> Result<(), StateError> {
        self.set(AXIS_ONE, json!(axis))
    }

    pub fn select_axis_two(&self, axis: usize) -> Result<(), StateError> {
        self.set(AXIS_TWO, json!(axis))
    }

    pub fn set_axis_one_flip(&self, flip: bool) -> Result<(), StateError> {
        self.set(AXIS_ONE_FLIP, json!(flip))
    }

    pub fn set_axis_two_flip(&self, flip: bool) -> Result<(), StateError> {
        self.set(AXIS_TWO_FLIP, json!(flip))
    }

    pub fn set_axis_one_zero(&self, zero: f64) -> Result<(), StateError> {
        self.set(AXIS_ONE_ZERO, json!(zero.clamp(0.0, 1.0)))
    }

    pub fn set_axis_two_zero(&self, zero: f64) -> Result<(), StateError> {
        self.set(AXIS_TWO_ZERO, json!(zero.clamp(0.0, 1.0)))
    }

    fn on_connected(&self, device: &GamepadInfo) -> Result<(), StateError> {
        let devices = self.provider.connected_devices();
        let mut guard = self.lock();
        update_connected(&mut guard.state, &devices)?;
        guard.state.set_value(SELECTED, json!(device.index))?;
        guard.state.set_value(AXIS_COUNT, json!(device.axis_count))
    }

    fn on_disconnected(&self) -> Result<(), StateError> {
        let devices = self.provider.connected_devices();
        let mut guard = self.lock();
        guard.state.set_value(SELECTED, json!(-1))?;
        guard.state.set_value(AXIS_COUNT, json!(0))?;
        update_connected(&mut guard.state, &devices)
    }

    fn update_axis_values(&self, state: &mut ViewState) -> Result<(), StateError> {
        let (one, two) = match selected_device(state)? {
            Some(device) => (
                self.provider.axis_value(device, axis_index(state, AXIS_ONE)?),
                self.provider.axis_value(device, axis_index(state, AXIS_TWO)?),
            ),
            None => (0.0, 0.0),
        };
        state.set_value(AXIS_ONE_VALUE, json!(one))?;
        state.set_value(AXIS_TWO_VALUE, json!(two))
    }

    fn enforce_view(&self, state: &mut ViewState, force: bool) -> Result<(), StateError> {
        let sink = self.sink.as_ref();
        view::enforce(state, sink, GAMEPAD_NAMES, force)?;
        view::enforce(state, sink, GAMEPAD_INDICES, force)?;
        view::enforce(state, sink, GAMEPAD_AXES, force)?;
        if view::enforce(state, sink, SELECTED, force)? {
            let axis_count = match view::integer(state, SELECTED)? {
                Some(device) if device >= 0 => axis_count_of(state, device)?,
                _ => 0,
            };
            state.set_value(AXIS_COUNT, json!(axis_count))?;
        }

        // New axis options invalidate both axis selections.
        let options = view::enforce(state, sink, AXIS_COUNT, force)?;
        for (axis, value, zero, flip) in [
            (AXIS_ONE, AXIS_ONE_VALUE, AXIS_ONE_ZERO, AXIS_ONE_FLIP),
            (AXIS_TWO, AXIS_TWO_VALUE, AXIS_TWO_ZERO, AXIS_TWO_FLIP),
        ] {
            view::enforce(state, sink, axis, force || options)?;
            view::enforce(state, sink, value, force)?;
            view::enforce(state, sink, zero, force)?;
            view::enforce(state, sink, flip, force)?;
        }
        Ok(())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.lock().state.set_value(key, value)
    }

    fn refresh(&self, force: bool) {
        if let Err(err) = self.update_view(force) {
            warn!(view = self.name, "gamepad view update failed: {err}");
        }
    }

    fn handle(&self) -> SubscriberHandle {
        self.this.clone()
    }

    fn lock(&self) -> MutexGuard<'_, GamepadView> {
        self.view
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn update_connected(state: &mut ViewState, devices: &[GamepadInfo]) -> Result<(), StateError> {
    state.set_value(
        GAMEPAD_NAMES,
        devices.iter().map(|device| json!(device.id)).collect(),
    )?;
    state.set_value(
        GAMEPAD_INDICES,
        devices.iter().map(|device| json!(device.index)).collect(),
    )?;
    state.set_value(
        GAMEPAD_AXES,
        devices.iter().map(|device| json!(device.axis_count)).collect(),
    )?;

    let Some(first) = devices.first() else {
        return select(state, -1, 0);
    };
    let selected = view::integer(state, SELECTED)?;
    let has_selected = selected.is_some_and(|selected| {
        devices
            .iter()
            .any(|device| i64::try_from(device.index).is_ok_and(|index| index == selected))
    });
    if !has_selected {
        select(state, first.index as i64, first.axis_count)?;
    }
    Ok(())
}

fn select(state: &mut ViewState, device: i64, axis_count: usize) -> Result<(), StateError> {
    state.set_value(SELECTED, json!(device))?;
    state.set_value(AXIS_COUNT, json!(axis_count))?;
    state.set_value(AXIS_ONE, json!(0))?;
    state.set_value(AXIS_ONE_VALUE, json!(0.0))?;
    state.set_value(AXIS_TWO, json!(0))?;
    state.set_value(AXIS_TWO_VALUE, json!(0.0))
}

fn selected_device(state: &ViewState) -> Result<Option<usize>, StateError> {
    Ok(view::integer(state, SELECTED)?.and_then(|selected| usize::try_from(selected).ok()))
}

fn axis_index(state: &ViewState, key: &str) -> Result<usize, StateError> {
    Ok(view::integer(state, key)?
        .and_then(|axis| usize::try_from(axis).ok())
        .unwrap_or(0))
}

fn axis_count_of(state: &ViewState, device: i64) -> Result<usize, StateError> {
    let indices = state.get_value(GAMEPAD_INDICES)?.and_then(Value::as_array);
    let axes = state.get_value(GAMEPAD_AXES)?.and_then(Value::as_array);
    let (Some(indices), Some(axes)) = (indices, axes) else {
        return Ok(0);
    };
    Ok(indices
        .iter()
        .position(|index| index.as_i64() == Some(device))
        .and_then(|position| axes.get(position))
        .and_then(Value::as_u64)
        .map_or(0, |count| count as usize))
}

impl AxisSource for GamepadController {
    fn read_axes(&self) -> AxisReading {
        let guard = self.lock();
        let state = &guard.state;
        let read = || -> Result<AxisReading, StateError> {
            Ok(AxisReading {
                axis_one: view::number(state, AXIS_ONE_VALUE)?,
                axis_two: view::number(state, AXIS_TWO_VALUE)?,
                axis_one_tuning: AxisTuning::new(
                    view::flag(state, AXIS_ONE_FLIP)?,
                    view::number(state, AXIS_ONE_ZERO)?,
                ),
                axis_two_tuning: AxisTuning::new(
                    view::flag(state, AXIS_TWO_FLIP)?,
                    view::number(state, AXIS_TWO_ZERO)?,
                ),
            })
        };
        read().unwrap_or_default()
    }
}

impl Subscriber for GamepadController {
    fn on_message(&self, topic: &str, data: Option<&Value>) {
        let result = match topic {
            GAMEPAD_CONNECTED => {
                match data.map(|data| serde_json::from_value::<GamepadInfo>(data.clone())) {
                    Some(Ok(device)) => self.on_connected(&device),
                    _ => {
                        warn!(view = self.name, "gamepad connected without device details");
                        return;
                    }
                }
            }
            GAMEPAD_DISCONNECTED => self.on_disconnected(),
            _ => {
                debug!(view = self.name, topic, "unhandled message");
                return;
            }
        };
        if let Err(err) = result {
            warn!(view = self.name, topic, "gamepad update failed: {err}");
        }
    }
}

impl FrameTask for GamepadController {
    fn on_frame(&self) {
        self.refresh(false);
    }
}

impl Listener for GamepadController {
    fn start_listening(&self) {
        if !self.lock().listening.acquire() {
            return;
        }
        for topic in [GAMEPAD_CONNECTED, GAMEPAD_DISCONNECTED] {
            if let Err(err) = self.bus.subscribe(topic, self.handle()) {
                warn!(view = self.name, topic, "failed to subscribe: {err}");
            }
        }
        self.refresh(true);
        let task: Weak<dyn FrameTask> = self.this.clone();
        self.lock().frame_loop.start(task);
        debug!(view = self.name, "gamepad listening");
    }

    fn stop_listening(&self) {
        if !self.lock().listening.release() {
            return;
        }
        self.bus.unsubscribe_all(&self.handle());
        self.lock().frame_loop.stop();
        debug!(view = self.name, "gamepad stopped listening");
    }

    fn is_listening(&self) -> bool {
        self.lock().listening.is_listening()
    }
}

/// Republishes device hotplug on the bus and keeps a count of connected
/// devices.
pub struct GamepadListener {
    bus: Arc<MessageBus>,
    connected: AtomicUsize,
}

impl GamepadListener {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            connected: AtomicUsize::new(0),
        }
    }

    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::Acquire)
    }

    pub fn on_connected(&self, device: &GamepadInfo) -> Result<(), BusError> {
        info!(id = %device.id, index = device.index, "gamepad connected");
        self.connected.fetch_add(1, Ordering::AcqRel);
        self.bus.publish(GAMEPAD_CONNECTED, Some(&json!(device)), None)
    }

    pub fn on_disconnected(&self, device: &GamepadInfo) -> Result<(), BusError> {
        info!(id = %device.id, index = device.index, "gamepad disconnected");
        let mut count = self.connected.load(Ordering::Acquire);
        while count > 0 {
            match self.connected.compare_exchange_weak(
                count,
                count - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => count = actual,
            }
        }
        self.bus.publish(GAMEPAD_DISCONNECTED, Some(&json!(device)), None)
    }
}

#[cfg(test)]
#[path = "tests/gamepad_tests.rs"]
mod tests;
