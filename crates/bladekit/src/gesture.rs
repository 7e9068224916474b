//! Gesture flag codec
//!
//! The touchpad driver reports gestures as bit masks. Each of the nine
//! "normal" gestures owns one bit; two synthetic members complete the set:
//!
//! | Gesture   | Bits     |
//! |-----------|----------|
//! | `None`    | `0x0000` |
//! | `Press`   | `0x0001` |
//! | `Tap`     | `0x0002` |
//! | `Flick`   | `0x0004` |
//! | `Zoom`    | `0x0008` |
//! | `Rotate`  | `0x0010` |
//! | `Move`    | `0x0020` |
//! | `Hold`    | `0x0040` |
//! | `Release` | `0x0080` |
//! | `Scroll`  | `0x0100` |
//! | `All`     | `0xFFFF` |
//!
//! Decoding never yields an empty set: a mask without any normal bit decodes
//! to `{None}`, and a mask carrying every normal bit also gets `All`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A single gesture flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    None,
    Press,
    Tap,
    Flick,
    Zoom,
    Rotate,
    Move,
    Hold,
    Release,
    Scroll,
    All,
}

impl Gesture {
    /// The gestures that map to a single bit, in bit order.
    pub const NORMAL: [Gesture; 9] = [
        Gesture::Press,
        Gesture::Tap,
        Gesture::Flick,
        Gesture::Zoom,
        Gesture::Rotate,
        Gesture::Move,
        Gesture::Hold,
        Gesture::Release,
        Gesture::Scroll,
    ];

    /// Bit pattern of this flag on the wire.
    pub fn bits(self) -> u32 {
        match self {
            Gesture::None => 0x0000,
            Gesture::Press => 0x0001,
            Gesture::Tap => 0x0002,
            Gesture::Flick => 0x0004,
            Gesture::Zoom => 0x0008,
            Gesture::Rotate => 0x0010,
            Gesture::Move => 0x0020,
            Gesture::Hold => 0x0040,
            Gesture::Release => 0x0080,
            Gesture::Scroll => 0x0100,
            Gesture::All => 0xFFFF,
        }
    }

    /// Whether this is one of the synthetic `None`/`All` members.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Gesture::None | Gesture::All)
    }

    pub fn name(self) -> &'static str {
        match self {
            Gesture::None => "none",
            Gesture::Press => "press",
            Gesture::Tap => "tap",
            Gesture::Flick => "flick",
            Gesture::Zoom => "zoom",
            Gesture::Rotate => "rotate",
            Gesture::Move => "move",
            Gesture::Hold => "hold",
            Gesture::Release => "release",
            Gesture::Scroll => "scroll",
            Gesture::All => "all",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Gesture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Gesture::None),
            "press" => Ok(Gesture::Press),
            "tap" => Ok(Gesture::Tap),
            "flick" => Ok(Gesture::Flick),
            "zoom" => Ok(Gesture::Zoom),
            "rotate" => Ok(Gesture::Rotate),
            "move" => Ok(Gesture::Move),
            "hold" => Ok(Gesture::Hold),
            "release" => Ok(Gesture::Release),
            "scroll" => Ok(Gesture::Scroll),
            "all" => Ok(Gesture::All),
            _ => Err(format!("Unknown gesture: {}", s)),
        }
    }
}

// ============================================================================
// GestureSet
// ============================================================================

/// An ordered set of gesture flags, including the synthetic members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct GestureSet(BTreeSet<Gesture>);

impl GestureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The normal gestures without the `All` marker.
    pub fn normal_range() -> Self {
        Gesture::NORMAL.into_iter().collect()
    }

    /// Every normal gesture plus the `All` marker.
    pub fn all() -> Self {
        let mut set = Self::normal_range();
        set.insert(Gesture::All);
        set
    }

    pub fn insert(&mut self, gesture: Gesture) -> bool {
        self.0.insert(gesture)
    }

    pub fn remove(&mut self, gesture: Gesture) -> bool {
        self.0.remove(&gesture)
    }

    pub fn contains(&self, gesture: Gesture) -> bool {
        self.0.contains(&gesture)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Gesture> + '_ {
        self.0.iter().copied()
    }

    /// Iterate the non-synthetic members only.
    pub fn normal(&self) -> impl Iterator<Item = Gesture> + '_ {
        self.iter().filter(|g| !g.is_synthetic())
    }

    /// True for the empty set and for exactly `{None}`.
    pub fn is_nothing(&self) -> bool {
        self.normal().next().is_none() && !self.contains(Gesture::All)
    }

    /// Whether every normal gesture is present.
    pub fn has_full_range(&self) -> bool {
        Gesture::NORMAL.iter().all(|g| self.0.contains(g))
    }

    /// Whether this set covers every normal gesture in `other`.
    ///
    /// A set carrying `All` covers everything.
    pub fn covers(&self, other: &GestureSet) -> bool {
        self.contains(Gesture::All) || other.normal().all(|g| self.contains(g))
    }

    /// Bring the synthetic members in line with the normal ones.
    ///
    /// A set containing `All` is expanded to the full range, a full range
    /// gains `All`, `All` is dropped once any normal gesture is missing, and
    /// `None` only survives in an otherwise empty set.
    pub fn canonical(mut self) -> Self {
        if self.contains(Gesture::All) {
            return Self::all();
        }
        if self.has_full_range() {
            self.insert(Gesture::All);
        }
        if self.normal().next().is_some() {
            self.remove(Gesture::None);
        }
        self
    }

    pub fn union(&self, other: &GestureSet) -> GestureSet {
        self.0.union(&other.0).copied().collect()
    }

    /// Remove `other`'s normal gestures. The `All` marker goes with them.
    pub fn difference(&self, other: &GestureSet) -> GestureSet {
        let mut result: GestureSet = self
            .normal()
            .filter(|g| !other.contains(*g))
            .collect();
        if !other.is_nothing() {
            return result;
        }
        if self.contains(Gesture::All) {
            result.insert(Gesture::All);
        }
        result
    }
}

impl FromIterator<Gesture> for GestureSet {
    fn from_iter<I: IntoIterator<Item = Gesture>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Gesture> for GestureSet {
    fn from(gesture: Gesture) -> Self {
        std::iter::once(gesture).collect()
    }
}

impl<const N: usize> From<[Gesture; N]> for GestureSet {
    fn from(gestures: [Gesture; N]) -> Self {
        gestures.into_iter().collect()
    }
}

impl fmt::Display for GestureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, gesture) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", gesture)?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Decode a raw gesture mask.
///
/// Never returns an empty set: an empty decode yields `{None}` and a full
/// decode additionally carries `All`. Bits above `Scroll` are ignored.
pub fn decode(mask: u32) -> GestureSet {
    let mut result: GestureSet = Gesture::NORMAL
        .into_iter()
        .filter(|g| mask & g.bits() != 0)
        .collect();

    if result.is_empty() {
        result.insert(Gesture::None);
    } else if result.has_full_range() {
        result.insert(Gesture::All);
    }

    result
}

/// Encode a gesture set as the OR of its members' bit patterns.
///
/// Synthetic members contribute their literal bits, so a set carrying `All`
/// encodes to `0xFFFF`.
pub fn encode(flags: &GestureSet) -> u32 {
    flags.iter().fold(0, |mask, g| mask | g.bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_synthetic(set: &GestureSet) -> GestureSet {
        set.normal().collect()
    }

    #[test]
    fn test_decode_zero_is_none() {
        assert_eq!(decode(0), GestureSet::from(Gesture::None));
    }

    #[test]
    fn test_decode_single_bit() {
        assert_eq!(decode(0x0001), GestureSet::from(Gesture::Press));
        assert_eq!(decode(0x0004), GestureSet::from(Gesture::Flick));
        assert_eq!(decode(0x0100), GestureSet::from(Gesture::Scroll));
    }

    #[test]
    fn test_decode_full_range_adds_all() {
        let decoded = decode(0x01 | 0x02 | 0x04 | 0x08 | 0x10 | 0x20 | 0x40 | 0x80 | 0x100);
        assert_eq!(decoded, GestureSet::all());
        assert_eq!(decoded.len(), 10);
    }

    #[test]
    fn test_decode_all_literal() {
        assert_eq!(decode(0xFFFF), GestureSet::all());
    }

    #[test]
    fn test_decode_ignores_unknown_high_bits() {
        assert_eq!(decode(0x0200), GestureSet::from(Gesture::None));
        assert_eq!(decode(0x0202), GestureSet::from(Gesture::Tap));
    }

    #[test]
    fn test_decode_is_idempotent_over_encode() {
        for mask in 0..=0x1FFu32 {
            let first = decode(mask);
            assert!(!first.is_empty());
            let again = decode(encode(&strip_synthetic(&first)));
            assert_eq!(
                strip_synthetic(&again),
                strip_synthetic(&first),
                "mask {:#x}",
                mask
            );
        }
    }

    #[test]
    fn test_encode_literal_bits() {
        assert_eq!(encode(&GestureSet::new()), 0);
        assert_eq!(encode(&GestureSet::from(Gesture::None)), 0);
        assert_eq!(encode(&[Gesture::Tap, Gesture::Zoom].into()), 0x000A);
        assert_eq!(encode(&GestureSet::all()), 0xFFFF);
        assert_eq!(encode(&GestureSet::normal_range()), 0x01FF);
    }

    #[test]
    fn test_covers_with_all_marker() {
        let all = GestureSet::from(Gesture::All);
        assert!(all.covers(&GestureSet::from(Gesture::Rotate)));

        let press = GestureSet::from(Gesture::Press);
        assert!(press.covers(&GestureSet::from(Gesture::Press)));
        assert!(!press.covers(&[Gesture::Press, Gesture::Tap].into()));
        assert!(press.covers(&GestureSet::from(Gesture::None)));
    }

    #[test]
    fn test_canonical_expands_all() {
        assert_eq!(GestureSet::from(Gesture::All).canonical(), GestureSet::all());
        assert_eq!(GestureSet::normal_range().canonical(), GestureSet::all());
        assert_eq!(
            GestureSet::from([Gesture::None, Gesture::Tap]).canonical(),
            GestureSet::from(Gesture::Tap)
        );
    }

    #[test]
    fn test_difference_drops_all_marker() {
        let remaining = GestureSet::all().difference(&GestureSet::from(Gesture::Press));
        assert!(!remaining.contains(Gesture::All));
        assert!(!remaining.contains(Gesture::Press));
        assert_eq!(remaining.len(), 8);
    }

    #[test]
    fn test_is_nothing() {
        assert!(GestureSet::new().is_nothing());
        assert!(GestureSet::from(Gesture::None).is_nothing());
        assert!(!GestureSet::from(Gesture::All).is_nothing());
        assert!(!GestureSet::from(Gesture::Hold).is_nothing());
    }

    #[test]
    fn test_gesture_from_str_case_insensitive() {
        assert_eq!("Flick".parse::<Gesture>(), Ok(Gesture::Flick));
        assert_eq!("ALL".parse::<Gesture>(), Ok(Gesture::All));
        assert!("swipe".parse::<Gesture>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(GestureSet::from([Gesture::Tap, Gesture::Press]).to_string(), "{press, tap}");
    }
}
