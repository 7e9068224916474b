//! Replay of recorded driver notifications
//!
//! Each input line is one JSON object describing a raw callback:
//!
//! ```text
//! {"kind": "key", "identity": 2, "state": 2}
//! {"kind": "gesture", "mask": 2, "parameters": 1, "x": 120, "y": 40, "z": 0}
//! {"kind": "app_event", "type": 1, "mode": 4, "process_id": 4242}
//! {"kind": "keyboard", "message": 256, "data": 65}
//! ```
//!
//! Lines are fed into a [`SimulatedDriver`] as if the hardware had fired
//! them, through a session configured from the config file.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bladekit::{
    listener, DeviceSession, FileMarker, Listener, ResultCode, SessionOptions, SimulatedDriver,
};
use bladekit_config::Config;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// One raw driver callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Key {
        identity: u32,
        state: u32,
    },
    Gesture {
        mask: u32,
        #[serde(default)]
        parameters: u32,
        #[serde(default)]
        x: i16,
        #[serde(default)]
        y: i16,
        #[serde(default)]
        z: i16,
    },
    AppEvent {
        #[serde(rename = "type")]
        kind: u32,
        mode: u32,
        #[serde(default)]
        process_id: u32,
    },
    Keyboard {
        message: u32,
        data: usize,
        #[serde(default)]
        modifiers: isize,
    },
}

impl Notification {
    /// Fire this notification on the simulated driver.
    ///
    /// `None` when the driver has no callback for the channel.
    pub fn fire(&self, driver: &SimulatedDriver) -> Option<ResultCode> {
        match *self {
            Notification::Key { identity, state } => driver.fire_key(identity, state),
            Notification::Gesture {
                mask,
                parameters,
                x,
                y,
                z,
            } => driver.fire_gesture(mask, parameters, x, y, z),
            Notification::AppEvent {
                kind,
                mode,
                process_id,
            } => driver.fire_app_event(kind, mode, process_id),
            Notification::Keyboard {
                message,
                data,
                modifiers,
            } => driver.fire_keyboard(message, data, modifiers),
        }
    }
}

pub fn session_options(config: &Config) -> SessionOptions {
    SessionOptions {
        marker: config
            .global
            .control_marker
            .as_ref()
            .map(|path| Arc::new(FileMarker::new(path)) as Arc<dyn bladekit::ControlMarker>),
        disable_os_gestures: config.global.disable_os_gestures,
    }
}

/// Enable the keys, gestures and touchpad image the config asks for.
pub fn apply_config(session: &DeviceSession, config: &Config) -> Result<()> {
    for key in &config.keys {
        let down = key.down.as_deref().unwrap_or(Path::new(""));
        session
            .enable_key(key.key, &key.up, down, None, true)
            .with_context(|| format!("Failed to enable dynamic key {}", key.key))?;
    }

    let gestures = config.touchpad.gesture_set();
    if !gestures.is_empty() {
        session
            .set_gestures(&gestures, true)
            .context("Failed to enable gestures")?;
    }

    let os_gestures = config.touchpad.os_gesture_set();
    if !os_gestures.is_empty() {
        session
            .set_os_gestures(&os_gestures, true)
            .context("Failed to enable OS gestures")?;
    }

    if let Some(image) = &config.touchpad.image {
        session
            .set_touchpad_image(image)
            .context("Failed to set touchpad image")?;
    }

    Ok(())
}

#[derive(Serialize)]
struct Printed<'a, E> {
    category: &'static str,
    event: &'a E,
}

fn printer<E>(category: &'static str, json: bool) -> Listener<E>
where
    E: Serialize + Debug + 'static,
{
    listener(move |event: &E| {
        if json {
            println!("{}", serde_json::to_string(&Printed { category, event })?);
        } else {
            println!("{:<22} {:?}", category, event);
        }
        Ok(())
    })
}

/// Print every event category the session dispatches.
pub fn attach_printers(session: &DeviceSession, json: bool) {
    let bus = session.bus();
    bus.gesture.add(printer(bus.gesture.category(), json));
    bus.flick.add(printer(bus.flick.category(), json));
    bus.hold.add(printer(bus.hold.category(), json));
    bus.move_gesture.add(printer(bus.move_gesture.category(), json));
    bus.press.add(printer(bus.press.category(), json));
    bus.release.add(printer(bus.release.category(), json));
    bus.rotate.add(printer(bus.rotate.category(), json));
    bus.scroll.add(printer(bus.scroll.category(), json));
    bus.tap.add(printer(bus.tap.category(), json));
    bus.zoom.add(printer(bus.zoom.category(), json));
    bus.key_state_changed.add(printer(bus.key_state_changed.category(), json));
    bus.key_pressed.add(printer(bus.key_pressed.category(), json));
    bus.key_released.add(printer(bus.key_released.category(), json));
    bus.app_event.add(printer(bus.app_event.category(), json));
    bus.keyboard_raw.add(printer(bus.keyboard_raw.category(), json));
    bus.keyboard_char.add(printer(bus.keyboard_char.category(), json));
    bus.keyboard_key_pressed.add(printer(bus.keyboard_key_pressed.category(), json));
    bus.keyboard_key_released.add(printer(bus.keyboard_key_released.category(), json));
}

/// Counts reported when the replay ends
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub delivered: usize,
    pub rejected: usize,
    pub malformed: usize,
}

/// Feed one input line to the driver.
pub fn feed_line(driver: &SimulatedDriver, line_no: usize, line: &str, stats: &mut ReplayStats) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    let notification: Notification = match serde_json::from_str(line) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("Line {}: skipping malformed notification: {}", line_no, e);
            stats.malformed += 1;
            return;
        }
    };

    match notification.fire(driver) {
        Some(code) if code.is_ok() => stats.delivered += 1,
        Some(code) => {
            tracing::warn!("Line {}: {:?} returned {}", line_no, notification, code);
            stats.rejected += 1;
        }
        None => {
            tracing::warn!("Line {}: no callback registered for {:?}", line_no, notification);
            stats.rejected += 1;
        }
    }
}

async fn open_input(file: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

pub async fn run(config: Config, file: Option<PathBuf>, json: bool) -> Result<()> {
    let driver = Arc::new(SimulatedDriver::new());
    let session = DeviceSession::new(driver.clone(), session_options(&config));

    session.start().context("Failed to start session")?;
    attach_printers(&session, json);

    if let Err(e) = apply_config(&session, &config) {
        session.stop().ok();
        return Err(e);
    }

    tracing::info!(
        "Replaying notifications from {}",
        file.as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    );

    let mut lines = open_input(file.as_deref()).await?.lines();
    let mut stats = ReplayStats::default();
    let mut line_no = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read input")? {
                    Some(line) => {
                        line_no += 1;
                        feed_line(&driver, line_no, &line, &mut stats);
                    }
                    None => break,
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, shutting down...");
                break;
            }
        }
    }

    session.stop().context("Failed to stop session")?;

    tracing::info!(
        "Replay finished: {} delivered, {} rejected, {} malformed",
        stats.delivered,
        stats.rejected,
        stats.malformed
    );

    Ok(())
}
