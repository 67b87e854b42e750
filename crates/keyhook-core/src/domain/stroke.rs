//! Raw keyboard strokes as delivered by the capture driver.
//!
//! A stroke carries a hardware scan code plus a bit-flag state word.  Bit 0
//! is the key-up flag; bits 1 and 2 are the two extended-prefix variants
//! (`E0` and `E1`).  Key down has no bit of its own: it is the absence of
//! the key-up flag.

use serde::{Deserialize, Serialize};

/// State bits and filter masks of the capture interface.
///
/// Kept as plain constants rather than an enum because the driver treats the
/// state word as an open bit set.
pub struct StateFlags;

impl StateFlags {
    /// Key down carries no bit.
    pub const KEY_DOWN: u16 = 0x00;
    /// Set when the key is released.
    pub const KEY_UP: u16 = 0x01;
    /// `E0` extended prefix (navigation cluster, right-hand modifiers).
    pub const KEY_E0: u16 = 0x02;
    /// `E1` extended prefix (Pause/Break).
    pub const KEY_E1: u16 = 0x04;

    /// Filter mask: key-down edges.
    pub const FILTER_KEY_DOWN: u16 = 0x01;
    /// Filter mask: key-up edges.
    pub const FILTER_KEY_UP: u16 = 0x02;
    /// Filter mask: `E0` strokes.
    pub const FILTER_KEY_E0: u16 = 0x04;
    /// Filter mask: `E1` strokes.
    pub const FILTER_KEY_E1: u16 = 0x08;
    /// Filter mask selecting every keyboard edge.
    pub const FILTER_KEY_ALL: u16 = 0x0F;
}

/// One keyboard stroke exactly as received from the driver.
///
/// The stroke is forwarded back to the OS unchanged, so every field,
/// including the opaque `information` word, is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyStroke {
    /// Hardware scan code.
    pub code: u16,
    /// Bit-flag state word (see [`StateFlags`]).
    pub state: u16,
    /// Driver-specific extra information, passed through untouched.
    pub information: u32,
}

impl KeyStroke {
    /// Creates a stroke with no extra information.
    pub fn new(code: u16, state: u16) -> Self {
        Self {
            code,
            state,
            information: 0,
        }
    }

    /// `true` iff the key-up bit is clear.
    pub fn is_key_down(&self) -> bool {
        self.state & StateFlags::KEY_UP == 0
    }

    /// `true` iff the key-up bit is set.
    pub fn is_key_up(&self) -> bool {
        !self.is_key_down()
    }

    /// `true` when the stroke carries the `E0` prefix.
    pub fn is_extended(&self) -> bool {
        self.state & StateFlags::KEY_E0 != 0
    }
}
