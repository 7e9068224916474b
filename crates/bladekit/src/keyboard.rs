//! Keyboard capture decoding
//!
//! While keyboard capture is on, the driver forwards window messages for the
//! physical keyboard. Only three message types carry meaning here:
//!
//! - `WM_KEYDOWN` (`0x0100`) and `WM_KEYUP` (`0x0101`): `data` is the
//!   virtual-key code
//! - `WM_CHAR` (`0x0102`): `data` is the UTF-16 code unit typed
//!
//! Everything else is only visible through the raw keyboard category.

use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

use crate::events::{KeyboardCharEvent, KeyboardKeyEvent};

bitflags! {
    /// Modifier keys held (or toggled, for caps lock) when a key message arrives
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct ModifierKeys: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const CAPS_LOCK = 1 << 3;
    }
}

/// A Windows virtual-key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    pub const BACK: VirtualKey = VirtualKey(0x08);
    pub const TAB: VirtualKey = VirtualKey(0x09);
    pub const RETURN: VirtualKey = VirtualKey(0x0D);
    pub const SHIFT: VirtualKey = VirtualKey(0x10);
    pub const CONTROL: VirtualKey = VirtualKey(0x11);
    pub const MENU: VirtualKey = VirtualKey(0x12);
    pub const CAPITAL: VirtualKey = VirtualKey(0x14);
    pub const ESCAPE: VirtualKey = VirtualKey(0x1B);
    pub const SPACE: VirtualKey = VirtualKey(0x20);

    pub fn code(self) -> u16 {
        self.0
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x30..=0x39 | 0x41..=0x5A => write!(f, "{}", char::from(self.0 as u8)),
            code => write!(f, "VK({:#04x})", code),
        }
    }
}

/// The keyboard messages that produce typed events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardMessage {
    KeyDown,
    KeyUp,
    Char,
}

impl KeyboardMessage {
    pub fn from_raw(message: u32) -> Option<Self> {
        match message {
            0x0100 => Some(KeyboardMessage::KeyDown),
            0x0101 => Some(KeyboardMessage::KeyUp),
            0x0102 => Some(KeyboardMessage::Char),
            _ => None,
        }
    }
}

/// What a keyboard message means beyond its raw form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardInput {
    Char(KeyboardCharEvent),
    KeyDown(KeyboardKeyEvent),
    KeyUp(KeyboardKeyEvent),
    /// Control characters and unrelated messages
    Ignored,
}

/// Decode a captured keyboard message.
///
/// `modifiers` is only sampled for key-down/key-up messages.
pub fn decode_keyboard(
    message: u32,
    data: usize,
    modifiers: impl FnOnce() -> ModifierKeys,
) -> KeyboardInput {
    match KeyboardMessage::from_raw(message) {
        Some(KeyboardMessage::Char) => {
            // Truncation to a UTF-16 code unit matches the driver's WPARAM
            match char::from_u32(data as u16 as u32) {
                Some(character) if !character.is_control() => {
                    KeyboardInput::Char(KeyboardCharEvent { character })
                }
                _ => KeyboardInput::Ignored,
            }
        }
        Some(kind @ (KeyboardMessage::KeyDown | KeyboardMessage::KeyUp)) => {
            let event = KeyboardKeyEvent {
                key: VirtualKey(data as u16),
                modifiers: modifiers(),
            };
            if kind == KeyboardMessage::KeyDown {
                KeyboardInput::KeyDown(event)
            } else {
                KeyboardInput::KeyUp(event)
            }
        }
        None => KeyboardInput::Ignored,
    }
}
