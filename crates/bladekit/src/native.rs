//! Native driver boundary
//!
//! The device driver is an external collaborator. Everything the core needs
//! from it is expressed by the [`Driver`] trait: lifecycle, callback
//! registration, gesture enablement and image upload. Every primitive
//! reports a [`ResultCode`] from the driver's HRESULT-style taxonomy, which
//! [`ResultCode::check`] collapses into a [`NativeCallError`].
//!
//! Callbacks are invoked on threads owned by the driver. Each one returns a
//! result code that the driver receives as the callback's return value.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::NativeCallError;
use crate::key::{KeyIdentity, KeyState};
use crate::keyboard::ModifierKeys;

/// App event callback: `(raw_type, raw_mode, process_id)`
pub type AppEventCallback = Arc<dyn Fn(u32, u32, u32) -> ResultCode + Send + Sync>;

/// Dynamic key callback: `(raw_identity, raw_state)`
pub type KeyCallback = Arc<dyn Fn(u32, u32) -> ResultCode + Send + Sync>;

/// Keyboard capture callback: `(message, w_param, l_param)`
pub type KeyboardCallback = Arc<dyn Fn(u32, usize, isize) -> ResultCode + Send + Sync>;

/// Touchpad gesture callback: `(raw_mask, parameters, x, y, z)`
pub type GestureCallback = Arc<dyn Fn(u32, u32, i16, i16, i16) -> ResultCode + Send + Sync>;

/// The native device driver.
///
/// Implementations must be callable from any thread. The core never holds a
/// lock of its own across a call into [`Driver::start`] or [`Driver::stop`],
/// but gesture enablement is issued while the subscription state is locked.
pub trait Driver: Send + Sync {
    /// Start the driver and connect to the device
    fn start(&self) -> ResultCode;

    /// Stop the driver
    fn stop(&self);

    fn set_app_event_callback(&self, callback: AppEventCallback) -> ResultCode;

    fn set_key_callback(&self, callback: KeyCallback) -> ResultCode;

    fn set_keyboard_callback(&self, callback: KeyboardCallback) -> ResultCode;

    fn set_gesture_callback(&self, callback: GestureCallback) -> ResultCode;

    /// Enable or disable delivery of the gestures in `mask` to the application
    fn enable_gesture(&self, mask: u32, enable: bool) -> ResultCode;

    /// Enable or disable forwarding of the gestures in `mask` to the OS
    fn enable_os_gesture(&self, mask: u32, enable: bool) -> ResultCode;

    /// Upload the image shown on `key` while it is in `state`
    fn set_key_image(&self, key: KeyIdentity, state: KeyState, path: &Path) -> ResultCode;

    fn set_touchpad_image(&self, path: &Path) -> ResultCode;

    /// Route keyboard input to the keyboard callback instead of the OS
    fn capture_keyboard(&self, enable: bool) -> ResultCode;

    /// Current state of the modifier keys, sampled when a key message arrives
    fn modifier_keys(&self) -> ModifierKeys;
}

// ============================================================================
// Result codes
// ============================================================================

macro_rules! result_codes {
    ($($variant:ident = $value:literal => $name:literal,)+) => {
        /// Result code returned by driver primitives.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum ResultCode {
            $($variant,)+
            /// Any raw value not in the driver's taxonomy
            Unknown,
        }

        impl ResultCode {
            /// Look up a raw driver value. Unmapped values become [`ResultCode::Unknown`].
            pub fn from_raw(raw: u32) -> Self {
                match raw {
                    $($value => ResultCode::$variant,)+
                    _ => ResultCode::Unknown,
                }
            }

            /// The raw value the driver uses for this code.
            pub fn raw(self) -> u32 {
                match self {
                    $(ResultCode::$variant => $value,)+
                    ResultCode::Unknown => u32::MAX,
                }
            }

            /// Symbolic name as used in the driver headers.
            pub fn name(self) -> &'static str {
                match self {
                    $(ResultCode::$variant => $name,)+
                    ResultCode::Unknown => "UNKNOWN",
                }
            }
        }
    };
}

result_codes! {
    Ok = 0x0000_0000 => "RZSB_OK",
    Unsuccessful = 0x8000_4005 => "RZSB_UNSUCCESSFUL",
    InvalidParameter = 0x8007_0057 => "RZSB_INVALID_PARAMETER",
    InvalidPointer = 0x8000_4003 => "RZSB_INVALID_POINTER",
    Aborted = 0x8000_4004 => "RZSB_ABORTED",
    NoInterface = 0x8000_4002 => "RZSB_NO_INTERFACE",
    NotImplemented = 0x8000_4001 => "RZSB_NOT_IMPLEMENTED",
    FileNotFound = 0x0000_0002 => "RZSB_FILE_NOT_FOUND",
    GenericBase = 0x2000_0000 => "RZSB_GENERIC_BASE",
    FileZeroSize = 0x2000_0001 => "RZSB_FILE_ZERO_SIZE",
    FileInvalidName = 0x2000_0002 => "RZSB_FILE_INVALID_NAME",
    FileInvalidType = 0x2000_0003 => "RZSB_FILE_INVALID_TYPE",
    FileReadError = 0x2000_0004 => "RZSB_FILE_READ_ERROR",
    FileInvalidFormat = 0x2000_0005 => "RZSB_FILE_INVALID_FORMAT",
    FileInvalidLength = 0x2000_0006 => "RZSB_FILE_INVALID_LENGTH",
    FileNamepathTooLong = 0x2000_0007 => "RZSB_FILE_NAMEPATH_TOO_LONG",
    ImageInvalidSize = 0x2000_0008 => "RZSB_IMAGE_INVALID_SIZE",
    ImageInvalidData = 0x2000_0009 => "RZSB_IMAGE_INVALID_DATA",
    WinVersionInvalid = 0x2000_000A => "RZSB_WIN_VERSION_INVALID",
    CallbackBase = 0x2001_0000 => "RZSB_CALLBACK_BASE",
    CallbackNotSet = 0x2001_0001 => "RZSB_CALLBACK_NOT_SET",
    CallbackAlreadySet = 0x2001_0002 => "RZSB_CALLBACK_ALREADY_SET",
    CallbackRemoteFail = 0x2001_0003 => "RZSB_CALLBACK_REMOTE_FAIL",
    ControlBaseError = 0x2002_0000 => "RZSB_CONTROL_BASE_ERROR",
    ControlNotLocked = 0x2002_0001 => "RZSB_CONTROL_NOT_LOCKED",
    ControlLocked = 0x2002_0002 => "RZSB_CONTROL_LOCKED",
    ControlAlreadyLocked = 0x2002_0003 => "RZSB_CONTROL_ALREADY_LOCKED",
    ControlPreempted = 0x2002_0004 => "RZSB_CONTROL_PREEMPTED",
    DkBaseError = 0x2004_0000 => "RZSB_DK_BASE_ERROR",
    DkInvalidKey = 0x2004_0001 => "RZSB_DK_INVALID_KEY",
    DkInvalidKeyState = 0x2004_0002 => "RZSB_DK_INVALID_KEY_STATE",
    TouchpadBaseError = 0x2008_0000 => "RZSB_TOUCHPAD_BASE_ERROR",
    TouchpadInvalidGesture = 0x2008_0001 => "RZSB_TOUCHPAD_INVALID_GESTURE",
    InternalBaseError = 0x2010_0000 => "RZSB_INTERNAL_BASE_ERROR",
    AlreadyStarted = 0x2010_0001 => "RZSB_ALREADY_STARTED",
    NotStarted = 0x2010_0002 => "RZSB_NOT_STARTED",
    ConnectionError = 0x2010_0003 => "RZSB_CONNECTION_ERROR",
    InternalError = 0x2010_0004 => "RZSB_INTERNAL_ERROR",
}

impl ResultCode {
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }

    pub fn is_error(self) -> bool {
        !self.is_ok()
    }

    /// Collapse the code to success/failure, naming the failed primitive.
    pub fn check(self, operation: &'static str) -> Result<(), NativeCallError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(NativeCallError {
                operation,
                code: self,
            })
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_from_raw_known() {
        assert_eq!(ResultCode::from_raw(0), ResultCode::Ok);
        assert_eq!(ResultCode::from_raw(0x8007_0057), ResultCode::InvalidParameter);
        assert_eq!(ResultCode::from_raw(0x2010_0001), ResultCode::AlreadyStarted);
        assert_eq!(ResultCode::from_raw(2), ResultCode::FileNotFound);
    }

    #[test]
    fn test_result_code_from_raw_unknown() {
        assert_eq!(ResultCode::from_raw(0x1234_5678), ResultCode::Unknown);
        assert!(ResultCode::Unknown.is_error());
    }

    #[test]
    fn test_result_code_raw_matches_from_raw() {
        for code in [
            ResultCode::Unsuccessful,
            ResultCode::CallbackAlreadySet,
            ResultCode::DkInvalidKeyState,
            ResultCode::TouchpadInvalidGesture,
        ] {
            assert_eq!(ResultCode::from_raw(code.raw()), code);
        }
    }

    #[test]
    fn test_check_collapses_to_result() {
        assert!(ResultCode::Ok.check("RzSBStart").is_ok());

        let err = ResultCode::ConnectionError
            .check("RzSBStart")
            .expect_err("non-OK codes are failures");
        assert_eq!(err.operation, "RzSBStart");
        assert_eq!(err.code, ResultCode::ConnectionError);
    }

    #[test]
    fn test_display_includes_hex_value() {
        assert_eq!(
            ResultCode::InvalidParameter.to_string(),
            "RZSB_INVALID_PARAMETER (0x80070057)"
        );
    }
}
