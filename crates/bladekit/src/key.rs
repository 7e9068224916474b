//! Dynamic keys and their press/release state machine
//!
//! # Key State Transitions
//!
//! The driver reports the raw state of a key on every change. The raw stream
//! is noisy (a key can report `Hold`, or repeat a state), so pressed and
//! released notifications are inferred from the previous state:
//!
//! ```text
//!  previous      new     notifications
//!  --------      ----    -------------------------
//!  None | Up  -> Down    state changed + pressed
//!  None | Down -> Up     state changed + released
//!  anything   -> other   state changed
//! ```
//!
//! `Hold -> Up` is deliberately *not* a release: only `Down` and `None`
//! predecessors count.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::bus::{Listener, ListenerRegistry};
use crate::error::{BladeError, Result};
use crate::events::{KeyEvent, KeyEventKind};
use crate::native::Driver;

/// Number of dynamic keys on the device
pub const KEY_COUNT: usize = 10;

// ============================================================================
// Identity
// ============================================================================

/// Identity of a dynamic key.
///
/// `None` and `Invalid` are the driver's sentinels at raw ordinals 0 and 11.
/// They never address a key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum KeyIdentity {
    None,
    Dk1,
    Dk2,
    Dk3,
    Dk4,
    Dk5,
    Dk6,
    Dk7,
    Dk8,
    Dk9,
    Dk10,
    Invalid,
}

impl KeyIdentity {
    /// The real keys, in slot order.
    pub const KEYS: [KeyIdentity; KEY_COUNT] = [
        KeyIdentity::Dk1,
        KeyIdentity::Dk2,
        KeyIdentity::Dk3,
        KeyIdentity::Dk4,
        KeyIdentity::Dk5,
        KeyIdentity::Dk6,
        KeyIdentity::Dk7,
        KeyIdentity::Dk8,
        KeyIdentity::Dk9,
        KeyIdentity::Dk10,
    ];

    /// Decode a raw identity from the key callback.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(KeyIdentity::None),
            11 => Ok(KeyIdentity::Invalid),
            n => usize::try_from(n)
                .ok()
                .and_then(|n| Self::KEYS.get(n.wrapping_sub(1)).copied())
                .ok_or_else(|| BladeError::invalid(format!("key identity {} out of range", raw))),
        }
    }

    /// Zero-based storage slot for this key.
    ///
    /// Fails for the `None` and `Invalid` sentinels.
    pub fn slot(self) -> Result<usize> {
        self.index()
            .ok_or_else(|| BladeError::invalid(format!("{:?} does not identify a physical key", self)))
    }

    fn index(self) -> Option<usize> {
        Self::KEYS.iter().position(|k| *k == self)
    }

    /// Display target the key's screen is addressed by.
    pub fn target_display(self) -> Option<TargetDisplay> {
        self.index().map(|slot| TargetDisplay(TargetDisplay::WIDGET.0 + 1 + slot as u32))
    }
}

impl fmt::Display for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.index()) {
            (_, Some(slot)) => write!(f, "DK{}", slot + 1),
            (KeyIdentity::None, None) => write!(f, "NONE"),
            _ => write!(f, "INVALID"),
        }
    }
}

impl FromStr for KeyIdentity {
    type Err = String;

    /// Parse `dk1`..`dk10` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_lowercase()
            .strip_prefix("dk")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .and_then(|slot| Self::KEYS.get(slot).copied())
            .ok_or_else(|| format!("Unknown dynamic key: {}", s))
    }
}

/// Logical display target on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TargetDisplay(pub u32);

impl TargetDisplay {
    /// The touchpad screen
    pub const WIDGET: TargetDisplay = TargetDisplay(0x10000);
}

// ============================================================================
// State
// ============================================================================

/// Raw state of a dynamic key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyState {
    None,
    Up,
    Down,
    Hold,
    Invalid,
}

impl KeyState {
    const TABLE: [KeyState; 5] = [
        KeyState::None,
        KeyState::Up,
        KeyState::Down,
        KeyState::Hold,
        KeyState::Invalid,
    ];

    pub fn from_raw(raw: u32) -> Result<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::TABLE.get(i).copied())
            .ok_or_else(|| BladeError::invalid(format!("key state {} out of range", raw)))
    }
}

/// Outcome of one state update.
///
/// This is the single place pressed/released are derived; both the key's own
/// listeners and the session bus consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTransition {
    pub key: KeyIdentity,
    pub previous: KeyState,
    pub state: KeyState,
}

impl KeyTransition {
    pub fn new(key: KeyIdentity, previous: KeyState, state: KeyState) -> Self {
        Self {
            key,
            previous,
            state,
        }
    }

    pub fn is_press(&self) -> bool {
        self.state == KeyState::Down && matches!(self.previous, KeyState::Up | KeyState::None)
    }

    pub fn is_release(&self) -> bool {
        self.state == KeyState::Up && matches!(self.previous, KeyState::Down | KeyState::None)
    }

    fn event(&self, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            kind,
            key: self.key,
            state: self.state,
        }
    }

    pub fn state_changed(&self) -> KeyEvent {
        self.event(KeyEventKind::StateChanged)
    }

    pub fn pressed(&self) -> Option<KeyEvent> {
        self.is_press().then(|| self.event(KeyEventKind::Pressed))
    }

    pub fn released(&self) -> Option<KeyEvent> {
        self.is_release().then(|| self.event(KeyEventKind::Released))
    }

    /// All notifications this transition produces, in dispatch order.
    pub fn events(&self) -> impl Iterator<Item = KeyEvent> {
        std::iter::once(self.state_changed())
            .chain(self.pressed())
            .chain(self.released())
    }
}

// ============================================================================
// DynamicKey
// ============================================================================

#[derive(Debug)]
struct KeyData {
    state: KeyState,
    previous_state: KeyState,
    up_image: PathBuf,
    down_image: PathBuf,
}

/// An enabled dynamic key.
///
/// Handles are shared with the [`KeyRegistry`](crate::registry::KeyRegistry)
/// slot that owns the key. After the key is disabled the handle still works
/// for inspection but no longer receives notifications.
pub struct DynamicKey {
    identity: KeyIdentity,
    driver: Arc<dyn Driver>,
    data: Mutex<KeyData>,
    listeners: ListenerRegistry<KeyEvent>,
}

impl DynamicKey {
    /// Create a key and upload both of its images.
    ///
    /// `up_image` must not be empty. An empty `down_image` falls back to
    /// `up_image`.
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        identity: KeyIdentity,
        up_image: &Path,
        down_image: &Path,
    ) -> Result<Arc<Self>> {
        identity.slot()?;

        if up_image.as_os_str().is_empty() {
            return Err(BladeError::invalid("key image can't be empty"));
        }

        let down_image = if down_image.as_os_str().is_empty() {
            tracing::debug!("No pressed image for {}, using the up image", identity);
            up_image
        } else {
            down_image
        };

        let key = Arc::new(Self {
            identity,
            driver,
            data: Mutex::new(KeyData {
                state: KeyState::None,
                previous_state: KeyState::None,
                up_image: up_image.to_path_buf(),
                down_image: down_image.to_path_buf(),
            }),
            listeners: ListenerRegistry::new("dynamic key"),
        });

        key.set_images(up_image, down_image)?;

        Ok(key)
    }

    pub fn identity(&self) -> KeyIdentity {
        self.identity
    }

    pub fn state(&self) -> KeyState {
        self.data.lock().state
    }

    pub fn previous_state(&self) -> KeyState {
        self.data.lock().previous_state
    }

    pub fn up_image(&self) -> PathBuf {
        self.data.lock().up_image.clone()
    }

    pub fn down_image(&self) -> PathBuf {
        self.data.lock().down_image.clone()
    }

    /// The image currently on screen while the key is not pressed.
    pub fn current_image(&self) -> PathBuf {
        self.up_image()
    }

    pub fn has_single_image(&self) -> bool {
        let data = self.data.lock();
        data.up_image == data.down_image
    }

    /// Upload the image for one state. Only `Up` and `Down` have images.
    pub fn set_image(&self, path: &Path, state: KeyState) -> Result<()> {
        if !matches!(state, KeyState::Up | KeyState::Down) {
            return Err(BladeError::invalid(format!(
                "key images exist for Up and Down only, got {:?}",
                state
            )));
        }

        tracing::debug!(key = %self.identity, ?state, "Setting image to {}", path.display());

        self.driver
            .set_key_image(self.identity, state, path)
            .check("RzSBSetImageDynamicKey")?;

        let mut data = self.data.lock();
        if state == KeyState::Up {
            data.up_image = path.to_path_buf();
        } else {
            data.down_image = path.to_path_buf();
        }
        Ok(())
    }

    pub fn set_up_image(&self, path: &Path) -> Result<()> {
        self.set_image(path, KeyState::Up)
    }

    pub fn set_down_image(&self, path: &Path) -> Result<()> {
        self.set_image(path, KeyState::Down)
    }

    pub fn set_images(&self, up: &Path, down: &Path) -> Result<()> {
        self.set_up_image(up)?;
        self.set_down_image(down)
    }

    /// Use the same image for both states.
    pub fn set_single_image(&self, path: &Path) -> Result<()> {
        self.set_images(path, path)
    }

    /// Push the stored images to the device again.
    pub fn refresh(&self) -> Result<()> {
        let (up, down) = {
            let data = self.data.lock();
            (data.up_image.clone(), data.down_image.clone())
        };
        self.set_images(&up, &down)
    }

    pub fn add_listener(&self, listener: Listener<KeyEvent>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Listener<KeyEvent>) -> bool {
        self.listeners.remove(listener)
    }

    /// Record a new raw state and notify this key's listeners.
    ///
    /// The returned transition is what the session forwards to the bus.
    pub(crate) fn update_state(&self, state: KeyState) -> Result<KeyTransition> {
        let transition = {
            let mut data = self.data.lock();
            data.previous_state = data.state;
            data.state = state;
            KeyTransition::new(self.identity, data.previous_state, state)
        };

        for event in transition.events() {
            self.listeners.dispatch(&event)?;
        }

        Ok(transition)
    }

    /// Detach the key from its slot. The last image stays on screen.
    pub(crate) fn disable(&self) {
        self.listeners.clear();
        tracing::debug!("Disabled dynamic key {}", self.identity);
    }
}

impl fmt::Debug for DynamicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.lock();
        f.debug_struct("DynamicKey")
            .field("identity", &self.identity)
            .field("state", &data.state)
            .field("previous_state", &data.previous_state)
            .field("up_image", &data.up_image)
            .field("down_image", &data.down_image)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::listener;
    use crate::sim::{DriverCall, SimulatedDriver};

    fn transition(previous: KeyState, state: KeyState) -> KeyTransition {
        KeyTransition::new(KeyIdentity::Dk1, previous, state)
    }

    #[test]
    fn test_transition_table() {
        use KeyState::*;

        let cases = [
            (None, Down, true, false),
            (Up, Down, true, false),
            (None, Up, false, true),
            (Down, Up, false, true),
            // Hold -> Up is not classified as a release
            (Hold, Up, false, false),
            (Down, Down, false, false),
            (Up, Up, false, false),
            (Down, Hold, false, false),
            (Hold, Down, false, false),
            (Down, Invalid, false, false),
        ];

        for (previous, state, pressed, released) in cases {
            let t = transition(previous, state);
            assert_eq!(t.is_press(), pressed, "{:?} -> {:?}", previous, state);
            assert_eq!(t.is_release(), released, "{:?} -> {:?}", previous, state);
        }
    }

    #[test]
    fn test_transition_events_order() {
        let kinds: Vec<_> = transition(KeyState::Up, KeyState::Down)
            .events()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![KeyEventKind::StateChanged, KeyEventKind::Pressed]);

        let kinds: Vec<_> = transition(KeyState::Hold, KeyState::Up)
            .events()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![KeyEventKind::StateChanged]);
    }

    #[test]
    fn test_identity_from_raw() {
        assert_eq!(KeyIdentity::from_raw(0).unwrap(), KeyIdentity::None);
        assert_eq!(KeyIdentity::from_raw(1).unwrap(), KeyIdentity::Dk1);
        assert_eq!(KeyIdentity::from_raw(10).unwrap(), KeyIdentity::Dk10);
        assert_eq!(KeyIdentity::from_raw(11).unwrap(), KeyIdentity::Invalid);
        assert!(KeyIdentity::from_raw(12).is_err());
    }

    #[test]
    fn test_identity_slot_rejects_sentinels() {
        assert_eq!(KeyIdentity::Dk1.slot().unwrap(), 0);
        assert_eq!(KeyIdentity::Dk10.slot().unwrap(), 9);
        assert!(matches!(
            KeyIdentity::None.slot(),
            Err(BladeError::InvalidArgument { .. })
        ));
        assert!(KeyIdentity::Invalid.slot().is_err());
    }

    #[test]
    fn test_identity_target_display() {
        assert_eq!(KeyIdentity::Dk1.target_display(), Some(TargetDisplay(0x10001)));
        assert_eq!(KeyIdentity::Dk10.target_display(), Some(TargetDisplay(0x1000A)));
        assert_eq!(KeyIdentity::None.target_display(), None);
    }

    #[test]
    fn test_identity_parse_and_display() {
        assert_eq!("dk3".parse::<KeyIdentity>(), Ok(KeyIdentity::Dk3));
        assert_eq!("DK10".parse::<KeyIdentity>(), Ok(KeyIdentity::Dk10));
        assert!("dk0".parse::<KeyIdentity>().is_err());
        assert!("dk11".parse::<KeyIdentity>().is_err());
        assert!("key1".parse::<KeyIdentity>().is_err());
        assert_eq!(KeyIdentity::Dk7.to_string(), "DK7");
    }

    #[test]
    fn test_key_state_from_raw() {
        assert_eq!(KeyState::from_raw(2).unwrap(), KeyState::Down);
        assert_eq!(KeyState::from_raw(4).unwrap(), KeyState::Invalid);
        assert!(KeyState::from_raw(5).is_err());
    }

    #[test]
    fn test_new_key_single_image_fallback() {
        let driver = Arc::new(SimulatedDriver::new());
        let key = DynamicKey::new(driver.clone(), KeyIdentity::Dk2, Path::new("a.png"), Path::new(""))
            .expect("key should be created");

        assert!(key.has_single_image());
        assert_eq!(key.down_image(), PathBuf::from("a.png"));
        assert_eq!(key.state(), KeyState::None);
        assert_eq!(key.previous_state(), KeyState::None);
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::SetKeyImage(KeyIdentity::Dk2, KeyState::Up, PathBuf::from("a.png")),
                DriverCall::SetKeyImage(KeyIdentity::Dk2, KeyState::Down, PathBuf::from("a.png")),
            ]
        );
    }

    #[test]
    fn test_new_key_requires_up_image() {
        let driver = Arc::new(SimulatedDriver::new());
        let err = DynamicKey::new(driver.clone(), KeyIdentity::Dk1, Path::new(""), Path::new("b.png"))
            .expect_err("empty up image is rejected");
        assert!(matches!(err, BladeError::InvalidArgument { .. }));
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_set_image_rejects_non_image_states() {
        let driver = Arc::new(SimulatedDriver::new());
        let key = DynamicKey::new(driver, KeyIdentity::Dk1, Path::new("a.png"), Path::new("b.png")).unwrap();

        assert!(matches!(
            key.set_image(Path::new("c.png"), KeyState::Hold),
            Err(BladeError::InvalidArgument { .. })
        ));
        assert_eq!(key.up_image(), PathBuf::from("a.png"));
    }

    #[test]
    fn test_set_image_failure_keeps_previous_image() {
        let driver = Arc::new(SimulatedDriver::new());
        let key = DynamicKey::new(driver.clone(), KeyIdentity::Dk1, Path::new("a.png"), Path::new("b.png")).unwrap();

        driver.fail_once("RzSBSetImageDynamicKey", crate::native::ResultCode::FileNotFound);
        let err = key.set_down_image(Path::new("missing.png")).unwrap_err();
        assert!(matches!(err, BladeError::Native(_)));
        assert_eq!(key.down_image(), PathBuf::from("b.png"));
    }

    #[test]
    fn test_update_state_notifies_own_listeners() {
        let driver = Arc::new(SimulatedDriver::new());
        let key = DynamicKey::new(driver, KeyIdentity::Dk5, Path::new("a.png"), Path::new("b.png")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        key.add_listener(listener(move |e: &KeyEvent| {
            s.lock().push(e.kind);
            Ok(())
        }));

        let t = key.update_state(KeyState::Down).unwrap();
        assert!(t.is_press());
        key.update_state(KeyState::Hold).unwrap();
        let t = key.update_state(KeyState::Up).unwrap();
        assert!(!t.is_release());

        assert_eq!(
            *seen.lock(),
            vec![
                KeyEventKind::StateChanged,
                KeyEventKind::Pressed,
                KeyEventKind::StateChanged,
                KeyEventKind::StateChanged,
            ]
        );
        assert_eq!(key.state(), KeyState::Up);
        assert_eq!(key.previous_state(), KeyState::Hold);
    }
}
