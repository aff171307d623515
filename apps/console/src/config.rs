use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use client_core::{ArbiterConfig, PanelConfig};
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "rover.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rover_host: String,
    pub http_port: u16,
    pub stream_port: u16,
    pub command_port: u16,
    pub frame_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub suppress_repeats: bool,
    pub turtle_speed: f64,
    pub frame_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let panel = PanelConfig::default();
        Self {
            rover_host: panel.host,
            http_port: panel.http_port,
            stream_port: panel.stream_port,
            command_port: panel.command_port,
            frame_delay_ms: panel.arbiter.frame_delay.as_millis() as u64,
            poll_interval_ms: panel.arbiter.poll_interval.as_millis() as u64,
            suppress_repeats: panel.suppress_repeats,
            turtle_speed: panel.turtle_speed,
            frame_path: None,
        }
    }
}

impl Settings {
    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            host: self.rover_host.clone(),
            http_port: self.http_port,
            stream_port: self.stream_port,
            command_port: self.command_port,
            arbiter: ArbiterConfig {
                frame_delay: Duration::from_millis(self.frame_delay_ms),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
            suppress_repeats: self.suppress_repeats,
            turtle_speed: self.turtle_speed.clamp(0.0, 1.0),
        }
    }
}

/// Defaults, then the TOML file, then `ROVER_*` environment variables.
/// Command line overrides are applied by the caller.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut settings = read_file(path, config_path.is_some()).unwrap_or_default();
    apply_env(&mut settings, |name| std::env::var(name).ok());
    settings
}

fn read_file(path: &Path, explicit: bool) -> Option<Settings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if explicit {
                warn!(path = %path.display(), "failed to read config file: {err}");
            } else {
                debug!(path = %path.display(), "no config file");
            }
            return None;
        }
    };
    match toml::from_str::<Settings>(&raw) {
        Ok(settings) => Some(settings),
        Err(err) => {
            warn!(path = %path.display(), "ignoring invalid config file: {err}");
            None
        }
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("ROVER_HOST") {
        settings.rover_host = v;
    }
    if let Some(v) = parsed(&var, "ROVER_HTTP_PORT") {
        settings.http_port = v;
    }
    if let Some(v) = parsed(&var, "ROVER_STREAM_PORT") {
        settings.stream_port = v;
    }
    if let Some(v) = parsed(&var, "ROVER_COMMAND_PORT") {
        settings.command_port = v;
    }
    if let Some(v) = parsed(&var, "ROVER_FRAME_DELAY_MS") {
        settings.frame_delay_ms = v;
    }
    if let Some(v) = var("ROVER_FRAME_PATH") {
        settings.frame_path = Some(PathBuf::from(v));
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(name, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}
