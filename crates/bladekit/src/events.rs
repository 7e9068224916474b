//! Typed events delivered to listeners
//!
//! Raw callback integers are decoded into these types before dispatch. Each
//! enum that arrives as a raw integer has a validated `from_raw` lookup;
//! out-of-range values are rejected with [`BladeError::InvalidArgument`].

use std::fmt;

use serde::Serialize;

use crate::error::{BladeError, Result};
use crate::gesture::{self, Gesture};
use crate::key::{KeyIdentity, KeyState};
use crate::keyboard::{ModifierKeys, VirtualKey};

// ============================================================================
// Gesture events
// ============================================================================

/// Direction of a flick gesture, decoded from the callback's `z` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    None,
    Left,
    Right,
    Up,
    Down,
    Invalid,
}

impl Direction {
    const TABLE: [Direction; 6] = [
        Direction::None,
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
        Direction::Invalid,
    ];

    pub fn from_raw(raw: i16) -> Result<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::TABLE.get(i).copied())
            .ok_or_else(|| BladeError::invalid(format!("flick direction {} out of range", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomDirection {
    In,
    Out,
    Invalid,
}

impl ZoomDirection {
    pub fn from_parameter(parameter: u32) -> Self {
        match parameter {
            1 => ZoomDirection::In,
            2 => ZoomDirection::Out,
            _ => ZoomDirection::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateDirection {
    Clockwise,
    CounterClockwise,
    Invalid,
}

impl RotateDirection {
    pub fn from_parameter(parameter: u32) -> Self {
        match parameter {
            1 => RotateDirection::Clockwise,
            2 => RotateDirection::CounterClockwise,
            _ => RotateDirection::Invalid,
        }
    }
}

/// A gesture exactly as the driver reported it.
///
/// Also the payload for hold and scroll gestures, which carry every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GestureEvent {
    pub gesture: Gesture,
    pub parameters: u32,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PressGesture {
    pub touch_points: u32,
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReleaseGesture {
    pub touch_points: u32,
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TapGesture {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveGesture {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlickGesture {
    pub touch_points: u32,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomGesture {
    pub direction: ZoomDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotateGesture {
    pub direction: RotateDirection,
}

/// The kind-specific view of a gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureDetail {
    Press(PressGesture),
    Tap(TapGesture),
    Flick(FlickGesture),
    Zoom(ZoomGesture),
    Rotate(RotateGesture),
    Move(MoveGesture),
    Hold(GestureEvent),
    Release(ReleaseGesture),
    Scroll(GestureEvent),
}

/// Decode the generic event of one gesture callback.
///
/// The mask must decode to exactly one normal gesture; the hardware never
/// reports two gestures in a single callback. The kind-specific fields are
/// not checked here, see [`GestureEvent::detail`].
pub fn decode_gesture_event(
    raw_mask: u32,
    parameters: u32,
    x: i16,
    y: i16,
    z: i16,
) -> Result<GestureEvent> {
    let decoded = gesture::decode(raw_mask);
    let mut normal = decoded.normal();

    let gesture = match (normal.next(), normal.next()) {
        (Some(g), None) => g,
        _ => {
            return Err(BladeError::invalid(format!(
                "gesture mask {:#06x} decoded to {}, expected exactly one gesture",
                raw_mask, decoded
            )))
        }
    };

    Ok(GestureEvent {
        gesture,
        parameters,
        x,
        y,
        z,
    })
}

/// Decode one gesture callback into its generic and kind-specific events.
pub fn decode_gesture(
    raw_mask: u32,
    parameters: u32,
    x: i16,
    y: i16,
    z: i16,
) -> Result<(GestureEvent, GestureDetail)> {
    let event = decode_gesture_event(raw_mask, parameters, x, y, z)?;
    let detail = event.detail()?;
    Ok((event, detail))
}

impl GestureEvent {
    /// The kind-specific view of this gesture.
    ///
    /// Fails for a flick whose `z` is not a direction.
    pub fn detail(&self) -> Result<GestureDetail> {
        let GestureEvent {
            gesture,
            parameters,
            x,
            y,
            z,
        } = *self;

        let detail = match gesture {
            // Parameter is the number of touch points
            Gesture::Press => GestureDetail::Press(PressGesture {
                touch_points: parameters,
                x,
                y,
            }),
            Gesture::Tap => GestureDetail::Tap(TapGesture { x, y }),
            Gesture::Flick => GestureDetail::Flick(FlickGesture {
                touch_points: parameters,
                direction: Direction::from_raw(z)?,
            }),
            Gesture::Zoom => GestureDetail::Zoom(ZoomGesture {
                direction: ZoomDirection::from_parameter(parameters),
            }),
            Gesture::Rotate => GestureDetail::Rotate(RotateGesture {
                direction: RotateDirection::from_parameter(parameters),
            }),
            Gesture::Move => GestureDetail::Move(MoveGesture { x, y }),
            Gesture::Hold => GestureDetail::Hold(*self),
            Gesture::Release => GestureDetail::Release(ReleaseGesture {
                touch_points: parameters,
                x,
                y,
            }),
            Gesture::Scroll => GestureDetail::Scroll(*self),
            Gesture::None | Gesture::All => {
                return Err(BladeError::invalid(format!("{} is not a reportable gesture", gesture)))
            }
        };

        Ok(detail)
    }
}

// ============================================================================
// Key events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    StateChanged,
    Pressed,
    Released,
}

/// A dynamic key notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key: KeyIdentity,
    pub state: KeyState,
}

// ============================================================================
// App events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEventKind {
    None,
    Activated,
    Deactivated,
    Close,
    Exit,
    Invalid,
}

impl AppEventKind {
    const TABLE: [AppEventKind; 6] = [
        AppEventKind::None,
        AppEventKind::Activated,
        AppEventKind::Deactivated,
        AppEventKind::Close,
        AppEventKind::Exit,
        AppEventKind::Invalid,
    ];

    pub fn from_raw(raw: u32) -> Result<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::TABLE.get(i).copied())
            .ok_or_else(|| BladeError::invalid(format!("app event type {} out of range", raw)))
    }
}

/// How the application is hosted on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEventMode {
    Applet,
    Normal,
}

impl AppEventMode {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0x02 => Ok(AppEventMode::Applet),
            0x04 => Ok(AppEventMode::Normal),
            _ => Err(BladeError::invalid(format!("app event mode {:#x} is not recognized", raw))),
        }
    }
}

/// Application lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppEvent {
    pub kind: AppEventKind,
    pub mode: AppEventMode,
    pub process_id: u32,
}

// ============================================================================
// Keyboard events
// ============================================================================

/// Every keyboard message, undecoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyboardRawEvent {
    pub message: u32,
    pub data: usize,
    pub modifiers: isize,
}

/// A printable character typed while keyboard capture is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyboardCharEvent {
    pub character: char,
}

/// A key going down or up while keyboard capture is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyboardKeyEvent {
    pub key: VirtualKey,
    pub modifiers: ModifierKeys,
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} ({:?})", self.key, self.kind, self.state)
    }
}
