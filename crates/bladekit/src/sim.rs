//! In-process stand-in for the native driver
//!
//! [`SimulatedDriver`] records every primitive it receives, can be told to
//! fail specific primitives, and lets the caller fire the raw callbacks the
//! hardware would. It backs the test suites and `bladekit replay`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::key::{KeyIdentity, KeyState};
use crate::keyboard::ModifierKeys;
use crate::native::{
    AppEventCallback, Driver, GestureCallback, KeyCallback, KeyboardCallback, ResultCode,
};

/// A primitive received by the simulated driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Start,
    Stop,
    SetAppEventCallback,
    SetKeyCallback,
    SetKeyboardCallback,
    SetGestureCallback,
    EnableGesture(u32, bool),
    EnableOsGesture(u32, bool),
    SetKeyImage(KeyIdentity, KeyState, PathBuf),
    SetTouchpadImage(PathBuf),
    CaptureKeyboard(bool),
}

impl DriverCall {
    /// Name of the native primitive this call stands for.
    pub fn operation(&self) -> &'static str {
        match self {
            DriverCall::Start => "RzSBStart",
            DriverCall::Stop => "RzSBStop",
            DriverCall::SetAppEventCallback => "RzSBAppEventSetCallback",
            DriverCall::SetKeyCallback => "RzSBDynamicKeySetCallback",
            DriverCall::SetKeyboardCallback => "RzSBKeyboardCaptureSetCallback",
            DriverCall::SetGestureCallback => "RzSBGestureSetCallback",
            DriverCall::EnableGesture(..) => "RzSBEnableGesture",
            DriverCall::EnableOsGesture(..) => "RzSBEnableOSGesture",
            DriverCall::SetKeyImage(..) => "RzSBSetImageDynamicKey",
            DriverCall::SetTouchpadImage(_) => "RzSBSetImageTouchpad",
            DriverCall::CaptureKeyboard(_) => "RzSBCaptureKeyboard",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Once(ResultCode),
    Always(ResultCode),
}

#[derive(Default)]
struct Callbacks {
    app_event: Option<AppEventCallback>,
    key: Option<KeyCallback>,
    keyboard: Option<KeyboardCallback>,
    gesture: Option<GestureCallback>,
}

#[derive(Default)]
struct SimState {
    calls: Vec<DriverCall>,
    failures: HashMap<&'static str, Failure>,
    callbacks: Callbacks,
    modifiers: ModifierKeys,
    started: bool,
}

/// Driver that runs entirely in memory
#[derive(Default)]
pub struct SimulatedDriver {
    state: Mutex<SimState>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make the next call to `operation` return `code`.
    pub fn fail_once(&self, operation: &'static str, code: ResultCode) {
        self.state.lock().failures.insert(operation, Failure::Once(code));
    }

    /// Make every call to `operation` return `code` until cleared.
    pub fn fail_always(&self, operation: &'static str, code: ResultCode) {
        self.state.lock().failures.insert(operation, Failure::Always(code));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn set_modifiers(&self, modifiers: ModifierKeys) {
        self.state.lock().modifiers = modifiers;
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Record `call` and work out what it returns.
    fn record(&self, call: DriverCall) -> ResultCode {
        let mut state = self.state.lock();
        let operation = call.operation();
        state.calls.push(call);

        match state.failures.get(operation).copied() {
            Some(Failure::Once(code)) => {
                state.failures.remove(operation);
                code
            }
            Some(Failure::Always(code)) => code,
            None => ResultCode::Ok,
        }
    }

    // ===== Firing callbacks =====
    //
    // Each returns `None` when no callback is registered. The callback runs
    // without the driver lock held.

    pub fn fire_key(&self, identity: u32, state: u32) -> Option<ResultCode> {
        let callback = self.state.lock().callbacks.key.clone()?;
        Some(callback(identity, state))
    }

    pub fn fire_gesture(&self, mask: u32, parameters: u32, x: i16, y: i16, z: i16) -> Option<ResultCode> {
        let callback = self.state.lock().callbacks.gesture.clone()?;
        Some(callback(mask, parameters, x, y, z))
    }

    pub fn fire_app_event(&self, kind: u32, mode: u32, process_id: u32) -> Option<ResultCode> {
        let callback = self.state.lock().callbacks.app_event.clone()?;
        Some(callback(kind, mode, process_id))
    }

    pub fn fire_keyboard(&self, message: u32, data: usize, modifiers: isize) -> Option<ResultCode> {
        let callback = self.state.lock().callbacks.keyboard.clone()?;
        Some(callback(message, data, modifiers))
    }
}

impl Driver for SimulatedDriver {
    fn start(&self) -> ResultCode {
        let code = self.record(DriverCall::Start);
        if code.is_ok() {
            self.state.lock().started = true;
        }
        code
    }

    fn stop(&self) {
        self.record(DriverCall::Stop);
        let mut state = self.state.lock();
        state.started = false;
        state.callbacks = Callbacks::default();
    }

    fn set_app_event_callback(&self, callback: AppEventCallback) -> ResultCode {
        let code = self.record(DriverCall::SetAppEventCallback);
        if code.is_ok() {
            self.state.lock().callbacks.app_event = Some(callback);
        }
        code
    }

    fn set_key_callback(&self, callback: KeyCallback) -> ResultCode {
        let code = self.record(DriverCall::SetKeyCallback);
        if code.is_ok() {
            self.state.lock().callbacks.key = Some(callback);
        }
        code
    }

    fn set_keyboard_callback(&self, callback: KeyboardCallback) -> ResultCode {
        let code = self.record(DriverCall::SetKeyboardCallback);
        if code.is_ok() {
            self.state.lock().callbacks.keyboard = Some(callback);
        }
        code
    }

    fn set_gesture_callback(&self, callback: GestureCallback) -> ResultCode {
        let code = self.record(DriverCall::SetGestureCallback);
        if code.is_ok() {
            self.state.lock().callbacks.gesture = Some(callback);
        }
        code
    }

    fn enable_gesture(&self, mask: u32, enable: bool) -> ResultCode {
        self.record(DriverCall::EnableGesture(mask, enable))
    }

    fn enable_os_gesture(&self, mask: u32, enable: bool) -> ResultCode {
        self.record(DriverCall::EnableOsGesture(mask, enable))
    }

    fn set_key_image(&self, key: KeyIdentity, state: KeyState, path: &Path) -> ResultCode {
        self.record(DriverCall::SetKeyImage(key, state, path.to_path_buf()))
    }

    fn set_touchpad_image(&self, path: &Path) -> ResultCode {
        self.record(DriverCall::SetTouchpadImage(path.to_path_buf()))
    }

    fn capture_keyboard(&self, enable: bool) -> ResultCode {
        self.record(DriverCall::CaptureKeyboard(enable))
    }

    fn modifier_keys(&self) -> ModifierKeys {
        self.state.lock().modifiers
    }
}

impl std::fmt::Debug for SimulatedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedDriver")
            .field("started", &state.started)
            .field("calls", &state.calls.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fail_once_then_recovers() {
        let driver = SimulatedDriver::new();
        driver.fail_once("RzSBStart", ResultCode::ConnectionError);

        assert_eq!(driver.start(), ResultCode::ConnectionError);
        assert!(!driver.is_started());
        assert_eq!(driver.start(), ResultCode::Ok);
        assert!(driver.is_started());
        assert_eq!(driver.calls(), vec![DriverCall::Start, DriverCall::Start]);
    }

    #[test]
    fn test_fail_always_persists() {
        let driver = SimulatedDriver::new();
        driver.fail_always("RzSBCaptureKeyboard", ResultCode::NotImplemented);

        assert_eq!(driver.capture_keyboard(true), ResultCode::NotImplemented);
        assert_eq!(driver.capture_keyboard(true), ResultCode::NotImplemented);

        driver.clear_failures();
        assert!(driver.capture_keyboard(true).is_ok());
    }

    #[test]
    fn test_fire_without_callback() {
        let driver = SimulatedDriver::new();
        assert_eq!(driver.fire_key(1, 2), None);
    }

    #[test]
    fn test_fire_reaches_registered_callback() {
        let driver = SimulatedDriver::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        driver.set_key_callback(Arc::new(move |identity: u32, state: u32| {
            s.lock().push((identity, state));
            ResultCode::Ok
        }));

        assert_eq!(driver.fire_key(4, 2), Some(ResultCode::Ok));
        assert_eq!(*seen.lock(), vec![(4, 2)]);

        // Stopping drops the callbacks
        driver.stop();
        assert_eq!(driver.fire_key(4, 1), None);
    }
}
