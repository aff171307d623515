use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    view::TraceSink, FrameSink, GamepadProvider, LatestFrame, RenderSink, RoverPanel,
};
use shared::domain::GamepadInfo;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod input;

use config::load_settings;
use input::{Axis, ConsoleCommand, HELP};

#[derive(Parser, Debug)]
#[command(about = "Drive a camera rover from the terminal")]
struct Args {
    /// TOML settings file, `rover.toml` when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    http_port: Option<u16>,
    #[arg(long)]
    stream_port: Option<u16>,
    #[arg(long)]
    command_port: Option<u16>,
    /// Where to write the most recent camera frame.
    #[arg(long)]
    frame_path: Option<PathBuf>,
}

/// A single gamepad whose first two axes are set from the console.
struct ConsolePad {
    axes: Mutex<[f64; 2]>,
}

impl ConsolePad {
    const AXIS_COUNT: usize = 4;

    fn info() -> GamepadInfo {
        GamepadInfo {
            index: 0,
            id: "console".to_string(),
            axis_count: Self::AXIS_COUNT,
        }
    }

    fn set(&self, one: f64, two: f64) {
        *self.axes.lock().unwrap_or_else(|p| p.into_inner()) =
            [one.clamp(-1.0, 1.0), two.clamp(-1.0, 1.0)];
    }
}

impl GamepadProvider for ConsolePad {
    fn connected_devices(&self) -> Vec<GamepadInfo> {
        vec![Self::info()]
    }

    fn axis_value(&self, device: usize, axis: usize) -> f64 {
        if device != 0 {
            return 0.0;
        }
        let axes = self.axes.lock().unwrap_or_else(|p| p.into_inner());
        axes.get(axis).copied().unwrap_or(0.0)
    }
}

/// Overwrites one file with each received frame.
struct FrameFile {
    path: PathBuf,
}

impl FrameSink for FrameFile {
    fn show_frame(&self, frame: Vec<u8>) {
        if let Err(err) = fs::write(&self.path, &frame) {
            warn!(path = %self.path.display(), "failed to write frame: {err}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(host) = args.host {
        settings.rover_host = host;
    }
    if let Some(port) = args.http_port {
        settings.http_port = port;
    }
    if let Some(port) = args.stream_port {
        settings.stream_port = port;
    }
    if let Some(port) = args.command_port {
        settings.command_port = port;
    }
    if let Some(path) = args.frame_path {
        settings.frame_path = Some(path);
    }
    info!(?settings, "starting rover console");

    let pad = Arc::new(ConsolePad {
        axes: Mutex::new([0.0, 0.0]),
    });
    let frames: Arc<dyn FrameSink> = match &settings.frame_path {
        Some(path) => Arc::new(FrameFile { path: path.clone() }),
        None => Arc::new(LatestFrame::default()),
    };
    let panel = RoverPanel::new(
        &settings.panel_config(),
        pad.clone(),
        &|view| Arc::new(TraceSink { view }) as Arc<dyn RenderSink>,
        frames,
    )
    .context("failed to build rover panel")?;

    panel.start().context("failed to open the camera stream")?;
    panel
        .gamepads
        .on_connected(&ConsolePad::info())
        .context("failed to announce the console gamepad")?;
    panel.activate_mode(shared::domain::DriveMode::Turtle)?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => {
                if let Err(err) = run(&panel, &pad, command).await {
                    println!("error: {err:#}");
                }
            }
            Err(err) => println!("{err:#}"),
        }
    }

    panel.stop();
    Ok(())
}

async fn run(panel: &RoverPanel, pad: &ConsolePad, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Mode(mode) => panel.activate_mode(mode)?,
        ConsoleCommand::Turtle(command) => panel.turtle.click(command)?,
        ConsoleCommand::Press(key) => {
            if !panel.keyboard.key_down(key)? {
                println!("arrow keys only work in turtle mode");
            }
        }
        ConsoleCommand::Release(key) => {
            panel.keyboard.key_up(key)?;
        }
        ConsoleCommand::Axes(one, two) => pad.set(one, two),
        ConsoleCommand::SelectAxis(axis, index) => {
            for gamepad in [&panel.tank, &panel.joystick] {
                match axis {
                    Axis::One => gamepad.select_axis_one(index)?,
                    Axis::Two => gamepad.select_axis_two(index)?,
                }
            }
        }
        ConsoleCommand::Flip(axis, flip) => {
            for gamepad in [&panel.tank, &panel.joystick] {
                match axis {
                    Axis::One => gamepad.set_axis_one_flip(flip)?,
                    Axis::Two => gamepad.set_axis_two_flip(flip)?,
                }
            }
        }
        ConsoleCommand::Zero(axis, zero) => {
            for gamepad in [&panel.tank, &panel.joystick] {
                match axis {
                    Axis::One => gamepad.set_axis_one_zero(zero)?,
                    Axis::Two => gamepad.set_axis_two_zero(zero)?,
                }
            }
        }
        ConsoleCommand::Speed(speed) => panel.turtle.set_speed(speed)?,
        ConsoleCommand::Stall(one, two) => {
            panel.motors.set_motor_one_stall(one)?;
            panel.motors.set_motor_two_stall(two)?;
            panel.motors.update_view(false)?;
        }
        ConsoleCommand::Camera(var, value) => panel.camera.update_config(&var, &value).await?,
        ConsoleCommand::Status => {
            println!(
                "mode: {}",
                panel
                    .arbiter
                    .active_mode()
                    .map_or("none", |mode| mode.as_str())
            );
            println!("command socket: {:?}", panel.rover.status());
            println!("commands sent: {}", panel.rover.sequence());
            println!("stream open: {}", panel.stream.is_ready());
            match panel.camera.fetch_status().await {
                Ok(status) => println!("camera: {}", serde_json::to_string(&status)?),
                Err(err) => println!("camera unavailable: {err}"),
            }
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}
