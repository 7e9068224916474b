//! Event decoding and dispatch for Razer SwitchBlade devices
//!
//! This crate turns the raw callbacks of the SwitchBlade driver (dynamic key
//! states, touchpad gesture masks, captured keyboard messages and app
//! lifecycle notifications) into typed events and fans them out to
//! listeners. The driver itself sits behind the [`Driver`] trait.

pub mod bus;
pub mod control;
pub mod error;
pub mod events;
pub mod gesture;
pub mod key;
pub mod keyboard;
pub mod native;
pub mod registry;
pub mod session;
pub mod sim;
pub mod subscription;

pub use bus::{listener, EventBus, Listener, ListenerRegistry};
pub use control::{ControlMarker, FileMarker};
pub use error::{BladeError, ListenerError, NativeCallError, Result};
pub use events::*;
pub use gesture::{Gesture, GestureSet};
pub use key::{DynamicKey, KeyIdentity, KeyState, KeyTransition, TargetDisplay, KEY_COUNT};
pub use keyboard::{ModifierKeys, VirtualKey};
pub use native::{Driver, ResultCode};
pub use session::{DeviceSession, SessionOptions, SessionState};
pub use sim::{DriverCall, SimulatedDriver};
pub use subscription::SubscriptionState;
