//! KDL configuration parser

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bladekit::{Gesture, KeyIdentity};

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl carries its own miette version, so rebuild the span by hand
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();
    let mut seen_keys = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "touchpad" => {
                config.touchpad = parse_touchpad(node)?;
            }
            "key" => {
                let key = parse_key(node)?;
                if !seen_keys.insert(key.key) {
                    return Err(ConfigError::DuplicateKey { key: key.key });
                }
                config.keys.push(key);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

/// First string argument of a node
fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn expand_path(value: &str) -> PathBuf {
    shellexpand::tilde(value).into_owned().into()
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(val) = first_string(child) {
                        global.log_level = val
                            .parse()
                            .map_err(|e| ConfigError::Invalid { message: e })?;
                    }
                }
                "control-marker" => {
                    global.control_marker = first_string(child).map(expand_path);
                }
                "disable-os-gestures" => {
                    let value = child.entries().first().and_then(|e| e.value().as_bool());
                    global.disable_os_gestures = value.ok_or_else(|| ConfigError::Invalid {
                        message: "disable-os-gestures expects true or false".to_string(),
                    })?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_touchpad(node: &kdl::KdlNode) -> Result<TouchpadConfig, ConfigError> {
    let mut touchpad = TouchpadConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => {
                    touchpad.image = first_string(child).map(expand_path);
                }
                "gestures" => {
                    touchpad.gestures = parse_gesture_list(child)?;
                }
                "os-gestures" => {
                    touchpad.os_gestures = parse_gesture_list(child)?;
                }
                name => {
                    tracing::warn!("Unknown touchpad option: {}", name);
                }
            }
        }
    }

    Ok(touchpad)
}

fn parse_gesture_list(node: &kdl::KdlNode) -> Result<Vec<Gesture>, ConfigError> {
    node.entries()
        .iter()
        .map(|entry| {
            let name = entry.value().as_string().ok_or_else(|| ConfigError::Invalid {
                message: format!("{} expects gesture names as strings", node.name().value()),
            })?;
            name.parse::<Gesture>()
                .map_err(|_| ConfigError::UnknownGesture {
                    setting: node.name().value().to_string(),
                    name: name.to_string(),
                })
        })
        .collect()
}

fn parse_key(node: &kdl::KdlNode) -> Result<KeyConfig, ConfigError> {
    let name = first_string(node).ok_or_else(|| ConfigError::MissingField {
        field: "key name (e.g., `key \"dk1\" { ... }`)".to_string(),
    })?;
    let key: KeyIdentity = name.parse().map_err(|_| ConfigError::UnknownKey {
        key: name.to_string(),
    })?;

    let mut up = None;
    let mut down = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "up" => up = first_string(child).map(expand_path),
                "down" => down = first_string(child).map(expand_path),
                other => {
                    tracing::warn!("Unknown option {} for key {}", other, name);
                }
            }
        }
    }

    let up = up.ok_or_else(|| ConfigError::MissingField {
        field: format!("up image for key {}", name),
    })?;

    Ok(KeyConfig { key, up, down })
}
