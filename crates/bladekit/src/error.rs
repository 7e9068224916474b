//! Error types for bladekit operations

use std::path::PathBuf;

use thiserror::Error;

use crate::key::KeyIdentity;
use crate::native::ResultCode;
use crate::session::SessionState;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A native primitive returned a failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("native call {operation} failed with {code}")]
pub struct NativeCallError {
    /// Name of the driver primitive (e.g. `RzSBStart`)
    pub operation: &'static str,
    /// The code the driver returned
    pub code: ResultCode,
}

/// Errors that can occur while talking to the device or dispatching its events
#[derive(Debug, Error)]
pub enum BladeError {
    /// A native primitive failed
    #[error(transparent)]
    Native(#[from] NativeCallError),

    /// The caller supplied an out-of-domain value
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The control marker from a previous session is still present
    #[error("control marker {} exists, the previous session did not shut down cleanly", path.display())]
    UnstableShutdown { path: PathBuf },

    /// Activating a dynamic key failed at the native boundary
    #[error("failed to enable dynamic key {key}")]
    KeyEnable {
        key: KeyIdentity,
        #[source]
        source: NativeCallError,
    },

    /// The session is not in a state that allows the operation
    #[error("session is {actual}, operation requires {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Creating or deleting the control marker failed
    #[error("control marker I/O failed at {}: {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A listener returned an error during dispatch
    #[error("{category} listener failed: {source}")]
    Listener {
        category: &'static str,
        #[source]
        source: ListenerError,
    },
}

impl BladeError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BladeError::InvalidArgument {
            message: message.into(),
        }
    }

    /// The result code reported back to the driver when a callback fails.
    pub fn callback_code(&self) -> ResultCode {
        match self {
            BladeError::InvalidArgument { .. } => ResultCode::InvalidParameter,
            _ => ResultCode::Unsuccessful,
        }
    }
}

pub type Result<T, E = BladeError> = std::result::Result<T, E>;
