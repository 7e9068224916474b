//! Typed listener registries and event fan-out
//!
//! Every event category has its own [`ListenerRegistry`]. Listeners are
//! shared closures; registering the same handle twice delivers the event
//! twice, and removal matches by handle identity.
//!
//! # Dispatch policy
//!
//! Dispatch iterates a snapshot of the registry taken under the lock, then
//! releases the lock before invoking anything. A listener may therefore add
//! or remove listeners (itself included) while it runs; the change takes
//! effect from the next dispatch.
//!
//! Listeners are fallible. The first listener error stops the pass and is
//! returned to whoever triggered the dispatch; the bus does not isolate
//! listeners from each other.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BladeError, ListenerError, Result};
use crate::events::{
    AppEvent, FlickGesture, GestureDetail, GestureEvent, KeyEvent, KeyboardCharEvent,
    KeyboardKeyEvent, KeyboardRawEvent, MoveGesture, PressGesture, ReleaseGesture,
    RotateGesture, TapGesture, ZoomGesture,
};
use crate::key::KeyTransition;

/// A registered observer for events of type `E`
pub type Listener<E> = Arc<dyn Fn(&E) -> Result<(), ListenerError> + Send + Sync>;

/// Wrap a closure as a [`Listener`] handle.
///
/// Keep a clone of the returned handle to remove the listener later.
pub fn listener<E, F>(f: F) -> Listener<E>
where
    F: Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered, thread-safe list of listeners for one event category
pub struct ListenerRegistry<E> {
    category: &'static str,
    listeners: Mutex<Vec<Listener<E>>>,
}

impl<E> ListenerRegistry<E> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Name of the event category, used in logs and listener errors.
    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Append a listener. Duplicates are kept.
    pub fn add(&self, listener: Listener<E>) {
        self.listeners.lock().push(listener);
    }

    /// Remove the first registration of `listener`.
    ///
    /// Returns `false` if the handle was not registered.
    pub fn remove(&self, listener: &Listener<E>) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners
            .iter()
            .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
        {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Invoke every listener registered at the time of the call, in order.
    pub fn dispatch(&self, event: &E) -> Result<()> {
        let snapshot: Vec<Listener<E>> = self.listeners.lock().clone();

        for listener in snapshot {
            listener(event).map_err(|source| BladeError::Listener {
                category: self.category,
                source,
            })?;
        }

        Ok(())
    }
}

impl<E> std::fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("category", &self.category)
            .field("listeners", &self.len())
            .finish()
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// One listener registry per event category.
///
/// The registries are internally synchronized; listeners can be added and
/// removed through a shared reference at any time.
#[derive(Debug)]
pub struct EventBus {
    /// Every gesture, before its kind-specific category
    pub gesture: ListenerRegistry<GestureEvent>,
    pub flick: ListenerRegistry<FlickGesture>,
    pub hold: ListenerRegistry<GestureEvent>,
    pub move_gesture: ListenerRegistry<MoveGesture>,
    pub press: ListenerRegistry<PressGesture>,
    pub release: ListenerRegistry<ReleaseGesture>,
    pub rotate: ListenerRegistry<RotateGesture>,
    pub scroll: ListenerRegistry<GestureEvent>,
    pub tap: ListenerRegistry<TapGesture>,
    pub zoom: ListenerRegistry<ZoomGesture>,

    pub key_state_changed: ListenerRegistry<KeyEvent>,
    pub key_pressed: ListenerRegistry<KeyEvent>,
    pub key_released: ListenerRegistry<KeyEvent>,

    pub app_event: ListenerRegistry<AppEvent>,

    pub keyboard_raw: ListenerRegistry<KeyboardRawEvent>,
    pub keyboard_char: ListenerRegistry<KeyboardCharEvent>,
    pub keyboard_key_pressed: ListenerRegistry<KeyboardKeyEvent>,
    pub keyboard_key_released: ListenerRegistry<KeyboardKeyEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            gesture: ListenerRegistry::new("gesture"),
            flick: ListenerRegistry::new("flick gesture"),
            hold: ListenerRegistry::new("hold gesture"),
            move_gesture: ListenerRegistry::new("move gesture"),
            press: ListenerRegistry::new("press gesture"),
            release: ListenerRegistry::new("release gesture"),
            rotate: ListenerRegistry::new("rotate gesture"),
            scroll: ListenerRegistry::new("scroll gesture"),
            tap: ListenerRegistry::new("tap gesture"),
            zoom: ListenerRegistry::new("zoom gesture"),
            key_state_changed: ListenerRegistry::new("key state changed"),
            key_pressed: ListenerRegistry::new("key pressed"),
            key_released: ListenerRegistry::new("key released"),
            app_event: ListenerRegistry::new("app event"),
            keyboard_raw: ListenerRegistry::new("keyboard raw"),
            keyboard_char: ListenerRegistry::new("keyboard char"),
            keyboard_key_pressed: ListenerRegistry::new("keyboard key pressed"),
            keyboard_key_released: ListenerRegistry::new("keyboard key released"),
        }
    }

    /// Dispatch a decoded gesture: the generic category first, then the
    /// category for its kind.
    ///
    /// The kind-specific event is built after the generic listeners ran, so
    /// a malformed detail still reaches them before the error is returned.
    pub fn dispatch_gesture(&self, event: &GestureEvent) -> Result<()> {
        self.gesture.dispatch(event)?;

        match event.detail()? {
            GestureDetail::Press(e) => self.press.dispatch(&e),
            GestureDetail::Tap(e) => self.tap.dispatch(&e),
            GestureDetail::Flick(e) => self.flick.dispatch(&e),
            GestureDetail::Zoom(e) => self.zoom.dispatch(&e),
            GestureDetail::Rotate(e) => self.rotate.dispatch(&e),
            GestureDetail::Move(e) => self.move_gesture.dispatch(&e),
            GestureDetail::Hold(e) => self.hold.dispatch(&e),
            GestureDetail::Release(e) => self.release.dispatch(&e),
            GestureDetail::Scroll(e) => self.scroll.dispatch(&e),
        }
    }

    /// Dispatch the notifications a key transition produced.
    ///
    /// State changed always goes out; pressed or released follow when the
    /// transition says so.
    pub fn dispatch_key(&self, transition: &KeyTransition) -> Result<()> {
        self.key_state_changed.dispatch(&transition.state_changed())?;
        if let Some(event) = transition.pressed() {
            self.key_pressed.dispatch(&event)?;
        }
        if let Some(event) = transition.released() {
            self.key_released.dispatch(&event)?;
        }
        Ok(())
    }
}
