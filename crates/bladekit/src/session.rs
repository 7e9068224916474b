//! Device session lifecycle and callback handling
//!
//! A [`DeviceSession`] owns everything attached to one driver connection:
//! the key registry, the gesture subscriptions and the event bus. It is a
//! cheap cloneable handle; all clones refer to the same session.
//!
//! # Lifecycle
//!
//! ```text
//! Unstarted --start--> Starting --ok--> Running --stop--> Stopped
//!                         |                                  ^
//!                         +-------------- failure -----------+
//! ```
//!
//! Startup runs these steps in order, and any failure aborts it:
//!
//! 1. Check the control marker (if configured) and create it
//! 2. Start the driver, retrying once
//! 3. Register the app event, key and keyboard callbacks
//! 4. Register the gesture callback and, by default, stop the driver from
//!    forwarding gestures to the OS
//!
//! A failed startup stops the driver if it had started, removes the marker
//! and leaves the session `Stopped`. A stopped session cannot be restarted.
//!
//! Device operations hold the state lock while they talk to the driver, so
//! `stop` waits for them and nothing reaches the driver after it stopped.
//!
//! # Callbacks
//!
//! Driver callbacks hold a weak reference to the session, so they become
//! no-ops once every handle is dropped. Errors raised while handling a
//! callback (bad raw values, failing listeners) are logged and reported to
//! the driver as a failure code.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::bus::{EventBus, Listener};
use crate::control::ControlMarker;
use crate::error::{BladeError, Result};
use crate::events::{
    decode_gesture_event, AppEvent, AppEventKind, AppEventMode, KeyEvent, KeyboardRawEvent,
};
use crate::gesture::{Gesture, GestureSet};
use crate::key::{DynamicKey, KeyIdentity, KeyState};
use crate::keyboard::{decode_keyboard, KeyboardInput};
use crate::native::{
    AppEventCallback, Driver, GestureCallback, KeyCallback, KeyboardCallback, ResultCode,
};
use crate::registry::KeyRegistry;
use crate::subscription::{GestureSubscription, SubscriptionState};

/// Lifecycle state of a [`DeviceSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unstarted,
    Starting,
    Running,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unstarted => "unstarted",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Startup options for a [`DeviceSession`]
#[derive(Clone)]
pub struct SessionOptions {
    /// Marker used to detect an unclean previous shutdown
    pub marker: Option<Arc<dyn ControlMarker>>,
    /// Stop the driver from forwarding any gesture to the OS on startup
    pub disable_os_gestures: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            marker: None,
            disable_os_gestures: true,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("marker", &self.marker.as_ref().map(|m| m.location()))
            .field("disable_os_gestures", &self.disable_os_gestures)
            .finish()
    }
}

// ============================================================================
// Shared session state
// ============================================================================

struct SessionShared {
    driver: Arc<dyn Driver>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    keys: KeyRegistry,
    gestures: GestureSubscription,
    bus: EventBus,
    keyboard_capture: Mutex<bool>,
    touchpad_image: Mutex<Option<PathBuf>>,
    /// A marker delete failed and `stop` should try again
    marker_pending: Mutex<bool>,
}

/// Map a callback outcome to the code returned to the driver.
fn callback_code(channel: &'static str, result: Result<()>) -> ResultCode {
    match result {
        Ok(()) => ResultCode::Ok,
        Err(err) => {
            tracing::warn!(channel, "Callback failed: {}", err);
            err.callback_code()
        }
    }
}

impl SessionShared {
    fn initialize(self: &Arc<Self>) -> Result<()> {
        tracing::info!("Session is initializing");

        if let Some(marker) = &self.options.marker {
            if marker.exists() {
                let path = marker.location();
                tracing::error!("Control marker {} exists, refusing to start", path.display());
                return Err(BladeError::UnstableShutdown { path });
            }
            marker.create()?;
        }

        let mut started = false;
        let result = self.initialize_driver(&mut started);

        if let Err(err) = &result {
            tracing::error!("Session startup failed: {}", err);
            if started {
                tracing::debug!("Stopping driver after failed startup");
                self.driver.stop();
            }
            if let Err(e) = self.delete_marker() {
                tracing::warn!("Failed to remove control marker: {}", e);
            }
        }

        result
    }

    fn initialize_driver(self: &Arc<Self>, started: &mut bool) -> Result<()> {
        tracing::debug!("Calling RzSBStart()");
        let mut code = self.driver.start();
        if code.is_error() {
            tracing::warn!("RzSBStart failed with {}, trying once more", code);
            code = self.driver.start();
        }
        code.check("RzSBStart")?;
        *started = true;

        tracing::debug!("Registering app event callback");
        self.driver
            .set_app_event_callback(self.app_event_callback())
            .check("RzSBAppEventSetCallback")?;

        tracing::debug!("Registering dynamic key callback");
        self.driver
            .set_key_callback(self.key_callback())
            .check("RzSBDynamicKeySetCallback")?;

        tracing::debug!("Registering keyboard callback");
        self.driver
            .set_keyboard_callback(self.keyboard_callback())
            .check("RzSBKeyboardCaptureSetCallback")?;

        tracing::info!("Setting up touchpad");
        self.driver
            .set_gesture_callback(self.gesture_callback())
            .check("RzSBGestureSetCallback")?;

        if self.options.disable_os_gestures {
            tracing::debug!("Disabling all OS gestures");
            self.gestures.set_os_gestures(&Gesture::All.into(), false)?;
        }

        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        tracing::info!("Session is shutting down");
        self.keys.disable_all();
        self.driver.stop();
        self.delete_marker()
    }

    /// Remove the control marker, remembering a failure for the next `stop`.
    fn delete_marker(&self) -> Result<()> {
        let Some(marker) = &self.options.marker else {
            return Ok(());
        };

        let mut pending = self.marker_pending.lock();
        let result = marker.delete();
        *pending = result.is_err();
        result
    }

    // ===== Callback construction =====

    fn app_event_callback(self: &Arc<Self>) -> AppEventCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |kind: u32, mode: u32, process_id: u32| {
            with_session(&weak, "app event", |s| s.handle_app_event(kind, mode, process_id))
        })
    }

    fn key_callback(self: &Arc<Self>) -> KeyCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |identity: u32, state: u32| {
            with_session(&weak, "dynamic key", |s| s.handle_key(identity, state))
        })
    }

    fn keyboard_callback(self: &Arc<Self>) -> KeyboardCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |message: u32, data: usize, modifiers: isize| {
            with_session(&weak, "keyboard", |s| s.handle_keyboard(message, data, modifiers))
        })
    }

    fn gesture_callback(self: &Arc<Self>) -> GestureCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |mask: u32, parameters: u32, x: i16, y: i16, z: i16| {
            with_session(&weak, "gesture", |s| s.handle_gesture(mask, parameters, x, y, z))
        })
    }

    // ===== Callback handling =====

    fn handle_app_event(&self, raw_kind: u32, raw_mode: u32, process_id: u32) -> Result<()> {
        let kind = AppEventKind::from_raw(raw_kind)?;
        if matches!(kind, AppEventKind::None | AppEventKind::Invalid) {
            tracing::debug!("Ignoring app event of type {:?}", kind);
            return Ok(());
        }

        let event = AppEvent {
            kind,
            mode: AppEventMode::from_raw(raw_mode)?,
            process_id,
        };
        tracing::debug!("App event {:?} ({:?}) for process {}", event.kind, event.mode, process_id);
        self.bus.app_event.dispatch(&event)
    }

    fn handle_key(&self, raw_identity: u32, raw_state: u32) -> Result<()> {
        let identity = KeyIdentity::from_raw(raw_identity)?;
        let state = KeyState::from_raw(raw_state)?;

        let Some(key) = self.keys.get(identity)? else {
            tracing::debug!("Key {} has not been registered by app", identity);
            return Ok(());
        };

        tracing::debug!(key = %identity, ?state, "Updating key state");
        let transition = key.update_state(state)?;
        self.bus.dispatch_key(&transition)
    }

    fn handle_keyboard(&self, message: u32, data: usize, modifiers: isize) -> Result<()> {
        self.bus.keyboard_raw.dispatch(&KeyboardRawEvent {
            message,
            data,
            modifiers,
        })?;

        match decode_keyboard(message, data, || self.driver.modifier_keys()) {
            KeyboardInput::Char(event) => self.bus.keyboard_char.dispatch(&event),
            KeyboardInput::KeyDown(event) => self.bus.keyboard_key_pressed.dispatch(&event),
            KeyboardInput::KeyUp(event) => self.bus.keyboard_key_released.dispatch(&event),
            KeyboardInput::Ignored => Ok(()),
        }
    }

    fn handle_gesture(&self, mask: u32, parameters: u32, x: i16, y: i16, z: i16) -> Result<()> {
        let event = decode_gesture_event(mask, parameters, x, y, z)?;
        tracing::debug!(mask = %format!("{:#06x}", mask), "Gesture {}", event.gesture);
        self.bus.dispatch_gesture(&event)
    }
}

fn with_session(
    weak: &Weak<SessionShared>,
    channel: &'static str,
    handle: impl FnOnce(&SessionShared) -> Result<()>,
) -> ResultCode {
    match weak.upgrade() {
        Some(session) => callback_code(channel, handle(&session)),
        None => {
            tracing::debug!(channel, "Callback after session was dropped");
            ResultCode::Ok
        }
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        if *self.state.get_mut() == SessionState::Running {
            if let Err(e) = self.shutdown() {
                tracing::warn!("Session shutdown on drop failed: {}", e);
            }
        }
    }
}

// ============================================================================
// DeviceSession
// ============================================================================

/// Handle to one driver connection.
#[derive(Clone)]
pub struct DeviceSession {
    shared: Arc<SessionShared>,
}

impl DeviceSession {
    /// Create an unstarted session on top of `driver`.
    ///
    /// Nothing is sent to the driver until [`start`](Self::start).
    pub fn new(driver: Arc<dyn Driver>, options: SessionOptions) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                keys: KeyRegistry::new(driver.clone()),
                gestures: GestureSubscription::new(driver.clone()),
                driver,
                options,
                state: Mutex::new(SessionState::Unstarted),
                bus: EventBus::new(),
                keyboard_capture: Mutex::new(false),
                touchpad_image: Mutex::new(None),
                marker_pending: Mutex::new(false),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    /// Listener registries for every event category.
    ///
    /// Listeners can be added and removed in any session state.
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Connect to the driver and register the callbacks.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The session is running (or already was)
    /// * `Err(UnstableShutdown)` - The control marker was found; nothing was
    ///   sent to the driver
    /// * `Err(InvalidState)` - The session was stopped or is starting
    /// * `Err(_)` - A startup step failed; the session is now stopped
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                SessionState::Running => {
                    tracing::debug!("Session already running");
                    return Ok(());
                }
                SessionState::Unstarted => *state = SessionState::Starting,
                actual => {
                    return Err(BladeError::InvalidState {
                        expected: SessionState::Unstarted,
                        actual,
                    })
                }
            }
        }

        let result = self.shared.initialize();

        let next = if result.is_ok() {
            tracing::info!("Session is running");
            SessionState::Running
        } else {
            SessionState::Stopped
        };
        *self.shared.state.lock() = next;

        result
    }

    /// Disable every key, stop the driver and remove the control marker.
    ///
    /// Stopping twice is fine. A session that never started just becomes
    /// `Stopped`. If removing the marker failed, the next `stop` tries again.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            SessionState::Starting => Err(BladeError::InvalidState {
                expected: SessionState::Running,
                actual: SessionState::Starting,
            }),
            SessionState::Running => {
                *state = SessionState::Stopped;
                self.shared.shutdown()
            }
            SessionState::Unstarted => {
                *state = SessionState::Stopped;
                tracing::debug!("Session stopped before it was started");
                Ok(())
            }
            SessionState::Stopped => {
                let pending = *self.shared.marker_pending.lock();
                if pending {
                    tracing::debug!("Retrying control marker removal");
                    self.shared.delete_marker()
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Run `op` while the session is known to be running.
    ///
    /// The state lock is held for the whole operation, so `stop` cannot
    /// interleave with it.
    fn while_running<T>(&self, op: impl FnOnce(&SessionShared) -> Result<T>) -> Result<T> {
        let state = self.shared.state.lock();
        match *state {
            SessionState::Running => op(&self.shared),
            actual => Err(BladeError::InvalidState {
                expected: SessionState::Running,
                actual,
            }),
        }
    }

    // ===== Dynamic keys =====

    /// Enable a dynamic key with its up and down images.
    ///
    /// # Arguments
    ///
    /// * `identity` - Which key to enable (DK1..DK10)
    /// * `up_image` - Image shown while the key is up; must not be empty
    /// * `down_image` - Image shown while pressed; empty reuses `up_image`
    /// * `listener` - Optional listener attached to the key itself
    /// * `replace` - Replace a key already enabled in this slot
    ///
    /// With `replace` false, an already enabled key is returned unchanged.
    pub fn enable_key(
        &self,
        identity: KeyIdentity,
        up_image: &Path,
        down_image: &Path,
        listener: Option<Listener<KeyEvent>>,
        replace: bool,
    ) -> Result<Arc<DynamicKey>> {
        self.while_running(|shared| {
            shared
                .keys
                .enable(identity, up_image, down_image, listener, replace)
        })
    }

    pub fn disable_key(&self, identity: KeyIdentity) -> Result<()> {
        self.while_running(|shared| shared.keys.disable(identity))
    }

    /// The key currently enabled for `identity`, if any.
    pub fn key(&self, identity: KeyIdentity) -> Result<Option<Arc<DynamicKey>>> {
        self.shared.keys.get(identity)
    }

    pub fn enabled_keys(&self) -> Vec<KeyIdentity> {
        self.shared.keys.enabled_keys()
    }

    // ===== Gestures =====

    /// Enable or disable delivery of `gestures`. Returns whether the driver
    /// was called.
    pub fn set_gestures(&self, gestures: &GestureSet, enabled: bool) -> Result<bool> {
        self.while_running(|shared| shared.gestures.set_gestures(gestures, enabled))
    }

    pub fn enable_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_gestures(&gesture.into(), true)
    }

    pub fn disable_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_gestures(&gesture.into(), false)
    }

    /// Enable or disable forwarding of `gestures` to the OS.
    pub fn set_os_gestures(&self, gestures: &GestureSet, enabled: bool) -> Result<bool> {
        self.while_running(|shared| shared.gestures.set_os_gestures(gestures, enabled))
    }

    pub fn enable_os_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_os_gestures(&gesture.into(), true)
    }

    pub fn disable_os_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_os_gestures(&gesture.into(), false)
    }

    pub fn gesture_state(&self) -> SubscriptionState {
        self.shared.gestures.state()
    }

    pub fn os_gesture_state(&self) -> SubscriptionState {
        self.shared.gestures.os_state()
    }

    // ===== Touchpad =====

    pub fn set_touchpad_image(&self, path: &Path) -> Result<()> {
        self.while_running(|shared| {
            let mut image = shared.touchpad_image.lock();
            shared
                .driver
                .set_touchpad_image(path)
                .check("RzSBSetImageTouchpad")?;
            tracing::debug!("Touchpad image set to {}", path.display());
            *image = Some(path.to_path_buf());
            Ok(())
        })
    }

    /// The last touchpad image set successfully.
    pub fn touchpad_image(&self) -> Option<PathBuf> {
        self.shared.touchpad_image.lock().clone()
    }

    // ===== Keyboard capture =====

    /// Route keyboard input to this session. No-op if already in that mode.
    pub fn set_keyboard_capture(&self, enabled: bool) -> Result<()> {
        self.while_running(|shared| {
            let mut capture = shared.keyboard_capture.lock();
            if *capture == enabled {
                return Ok(());
            }

            shared
                .driver
                .capture_keyboard(enabled)
                .check("RzSBCaptureKeyboard")?;
            tracing::info!("Keyboard capture {}", if enabled { "enabled" } else { "disabled" });
            *capture = enabled;
            Ok(())
        })
    }

    pub fn keyboard_capture_enabled(&self) -> bool {
        *self.shared.keyboard_capture.lock()
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.state())
            .field("keys", &self.shared.keys)
            .field("gestures", &self.shared.gestures)
            .finish()
    }
}
