//! Configuration parsing for bladekit
//!
//! This crate parses the KDL file that describes which dynamic keys to
//! enable, which touchpad gestures to subscribe to and how the session
//! should start.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
