//! Configuration data model

use std::path::PathBuf;

use bladekit::{Gesture, GestureSet, KeyIdentity};

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub touchpad: TouchpadConfig,
    pub keys: Vec<KeyConfig>,
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    /// Marker file for unclean-shutdown detection; none disables the check
    pub control_marker: Option<PathBuf>,
    pub disable_os_gestures: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            control_marker: None,
            disable_os_gestures: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Touchpad settings
#[derive(Debug, Clone, Default)]
pub struct TouchpadConfig {
    /// Image shown on the touchpad screen
    pub image: Option<PathBuf>,
    /// Gestures delivered to the application
    pub gestures: Vec<Gesture>,
    /// Gestures the driver keeps forwarding to the OS
    pub os_gestures: Vec<Gesture>,
}

impl TouchpadConfig {
    pub fn gesture_set(&self) -> GestureSet {
        self.gestures.iter().copied().collect()
    }

    pub fn os_gesture_set(&self) -> GestureSet {
        self.os_gestures.iter().copied().collect()
    }
}

/// A dynamic key binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    pub key: KeyIdentity,
    /// Image while the key is up
    pub up: PathBuf,
    /// Image while the key is pressed; falls back to `up`
    pub down: Option<PathBuf>,
}
