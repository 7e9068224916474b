//! Errors reported while loading a bladekit configuration file

use std::path::PathBuf;

use bladekit::KeyIdentity;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read configuration file {}", path.display())]
    #[diagnostic(code(bladekit::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid KDL
    #[error("Configuration is not valid KDL")]
    #[diagnostic(code(bladekit::config::syntax))]
    ParseError {
        #[source_code]
        src: String,
        #[label("syntax error")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    /// A `key` node names something other than dk1..dk10
    #[error("Unknown dynamic key: {key}")]
    #[diagnostic(
        code(bladekit::config::unknown_key),
        help("the SwitchBlade has ten dynamic keys, named dk1 through dk10")
    )]
    UnknownKey { key: String },

    /// Two `key` nodes resolve to the same dynamic key
    #[error("Dynamic key {key} is bound more than once")]
    #[diagnostic(code(bladekit::config::duplicate_key))]
    DuplicateKey { key: KeyIdentity },

    /// `gestures` or `os-gestures` lists a name the touchpad does not know
    #[error("Unknown gesture `{name}` in {setting}")]
    #[diagnostic(
        code(bladekit::config::unknown_gesture),
        help("known gestures: press, tap, flick, zoom, rotate, move, hold, release, scroll, all")
    )]
    UnknownGesture { setting: String, name: String },

    /// A key binding lacks its name or its `up` image
    #[error("Key binding is missing {field}")]
    #[diagnostic(code(bladekit::config::missing_field))]
    MissingField { field: String },

    /// A setting has a value of the wrong shape, like a non-bool
    /// `disable-os-gestures` or an unrecognised log level
    #[error("Invalid setting: {message}")]
    #[diagnostic(code(bladekit::config::invalid))]
    Invalid { message: String },
}
