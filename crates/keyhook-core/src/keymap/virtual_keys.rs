//! Symbolic key names to Windows virtual keys.
//!
//! Used by the keystroke action to turn `"Ctrl+Shift+F1"` into concrete
//! virtual-key presses.  Names match case-insensitively.
//!
//! # Extended keys
//!
//! Some virtual keys sit on scan codes that the hardware sends with an `E0`
//! prefix (navigation cluster, right-hand Ctrl/Alt, Windows keys, the menu
//! key, numpad Divide and numpad Enter).  Synthesised presses *and* releases
//! of those keys must carry the extended flag, otherwise the OS key-state
//! table ends up tracking the numpad twin and the key appears stuck.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A synthesisable key: Windows virtual-key code plus extended marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualKey {
    /// `VK_*` code.
    pub code: u8,
    /// Whether press and release must carry `KEYEVENTF_EXTENDEDKEY`.
    pub extended: bool,
}

impl VirtualKey {
    /// Creates a key whose extended marking is derived from its code.
    pub const fn new(code: u8) -> Self {
        Self {
            code,
            extended: is_extended_vk(code),
        }
    }

    /// Creates a key that is always sent extended, for keys such as numpad
    /// Enter that share a code with a non-extended twin.
    pub const fn extended(code: u8) -> Self {
        Self {
            code,
            extended: true,
        }
    }

    /// `true` for Shift, Ctrl, Alt and Windows keys in all their variants.
    pub fn is_modifier(&self) -> bool {
        matches!(self.code, 0x10..=0x12 | 0xA0..=0xA5 | 0x5B | 0x5C)
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "VK 0x{:02X} (extended)", self.code)
        } else {
            write!(f, "VK 0x{:02X}", self.code)
        }
    }
}

const fn is_extended_vk(code: u8) -> bool {
    matches!(
        code,
        0x21..=0x28   // PageUp, PageDown, End, Home, arrows
            | 0x2D    // Insert
            | 0x2E    // Delete
            | 0x5B    // Left Win
            | 0x5C    // Right Win
            | 0x5D    // Apps / Menu
            | 0x6F    // NumPad Divide
            | 0xA3    // Right Ctrl
            | 0xA5 // Right Alt
    )
}

/// Every recognised name.  Aliases share a code.
const SYMBOLS: &[(&str, VirtualKey)] = &[
    // ── Modifiers ────────────────────────────────────────────────────────────
    ("Shift", VirtualKey::new(0x10)),
    ("Ctrl", VirtualKey::new(0x11)),
    ("Control", VirtualKey::new(0x11)),
    ("Alt", VirtualKey::new(0x12)),
    ("LShift", VirtualKey::new(0xA0)),
    ("LeftShift", VirtualKey::new(0xA0)),
    ("RShift", VirtualKey::new(0xA1)),
    ("RightShift", VirtualKey::new(0xA1)),
    ("LCtrl", VirtualKey::new(0xA2)),
    ("LeftCtrl", VirtualKey::new(0xA2)),
    ("RCtrl", VirtualKey::new(0xA3)),
    ("RightCtrl", VirtualKey::new(0xA3)),
    ("LAlt", VirtualKey::new(0xA4)),
    ("LeftAlt", VirtualKey::new(0xA4)),
    ("RAlt", VirtualKey::new(0xA5)),
    ("RightAlt", VirtualKey::new(0xA5)),
    ("Win", VirtualKey::new(0x5B)),
    ("LWin", VirtualKey::new(0x5B)),
    ("LeftWin", VirtualKey::new(0x5B)),
    ("RWin", VirtualKey::new(0x5C)),
    ("RightWin", VirtualKey::new(0x5C)),
    // ── Function keys ────────────────────────────────────────────────────────
    ("F1", VirtualKey::new(0x70)),
    ("F2", VirtualKey::new(0x71)),
    ("F3", VirtualKey::new(0x72)),
    ("F4", VirtualKey::new(0x73)),
    ("F5", VirtualKey::new(0x74)),
    ("F6", VirtualKey::new(0x75)),
    ("F7", VirtualKey::new(0x76)),
    ("F8", VirtualKey::new(0x77)),
    ("F9", VirtualKey::new(0x78)),
    ("F10", VirtualKey::new(0x79)),
    ("F11", VirtualKey::new(0x7A)),
    ("F12", VirtualKey::new(0x7B)),
    ("F13", VirtualKey::new(0x7C)),
    ("F14", VirtualKey::new(0x7D)),
    ("F15", VirtualKey::new(0x7E)),
    ("F16", VirtualKey::new(0x7F)),
    ("F17", VirtualKey::new(0x80)),
    ("F18", VirtualKey::new(0x81)),
    ("F19", VirtualKey::new(0x82)),
    ("F20", VirtualKey::new(0x83)),
    ("F21", VirtualKey::new(0x84)),
    ("F22", VirtualKey::new(0x85)),
    ("F23", VirtualKey::new(0x86)),
    ("F24", VirtualKey::new(0x87)),
    // ── Editing and navigation ───────────────────────────────────────────────
    ("Enter", VirtualKey::new(0x0D)),
    ("Return", VirtualKey::new(0x0D)),
    ("Tab", VirtualKey::new(0x09)),
    ("Escape", VirtualKey::new(0x1B)),
    ("Esc", VirtualKey::new(0x1B)),
    ("Backspace", VirtualKey::new(0x08)),
    ("BS", VirtualKey::new(0x08)),
    ("Delete", VirtualKey::new(0x2E)),
    ("Del", VirtualKey::new(0x2E)),
    ("Insert", VirtualKey::new(0x2D)),
    ("Ins", VirtualKey::new(0x2D)),
    ("Home", VirtualKey::new(0x24)),
    ("End", VirtualKey::new(0x23)),
    ("PageUp", VirtualKey::new(0x21)),
    ("PgUp", VirtualKey::new(0x21)),
    ("PageDown", VirtualKey::new(0x22)),
    ("PgDn", VirtualKey::new(0x22)),
    ("Up", VirtualKey::new(0x26)),
    ("Down", VirtualKey::new(0x28)),
    ("Left", VirtualKey::new(0x25)),
    ("Right", VirtualKey::new(0x27)),
    // ── System keys ──────────────────────────────────────────────────────────
    ("Space", VirtualKey::new(0x20)),
    ("PrintScreen", VirtualKey::new(0x2C)),
    ("PrtSc", VirtualKey::new(0x2C)),
    ("ScrollLock", VirtualKey::new(0x91)),
    ("Pause", VirtualKey::new(0x13)),
    ("Break", VirtualKey::new(0x13)),
    ("CapsLock", VirtualKey::new(0x14)),
    ("NumLock", VirtualKey::new(0x90)),
    ("Apps", VirtualKey::new(0x5D)),
    ("Menu", VirtualKey::new(0x5D)),
    // ── Numpad ───────────────────────────────────────────────────────────────
    ("NumPad0", VirtualKey::new(0x60)),
    ("NumPad1", VirtualKey::new(0x61)),
    ("NumPad2", VirtualKey::new(0x62)),
    ("NumPad3", VirtualKey::new(0x63)),
    ("NumPad4", VirtualKey::new(0x64)),
    ("NumPad5", VirtualKey::new(0x65)),
    ("NumPad6", VirtualKey::new(0x66)),
    ("NumPad7", VirtualKey::new(0x67)),
    ("NumPad8", VirtualKey::new(0x68)),
    ("NumPad9", VirtualKey::new(0x69)),
    ("NumPadMul", VirtualKey::new(0x6A)),
    ("NumPadAdd", VirtualKey::new(0x6B)),
    ("NumPadSub", VirtualKey::new(0x6D)),
    ("NumPadDot", VirtualKey::new(0x6E)),
    ("NumPadDiv", VirtualKey::new(0x6F)),
    ("NumPadEnter", VirtualKey::extended(0x0D)),
    // ── Punctuation (US layout OEM keys) ─────────────────────────────────────
    ("Semicolon", VirtualKey::new(0xBA)),
    (";", VirtualKey::new(0xBA)),
    ("Equals", VirtualKey::new(0xBB)),
    ("=", VirtualKey::new(0xBB)),
    ("Comma", VirtualKey::new(0xBC)),
    (",", VirtualKey::new(0xBC)),
    ("Minus", VirtualKey::new(0xBD)),
    ("-", VirtualKey::new(0xBD)),
    ("Period", VirtualKey::new(0xBE)),
    (".", VirtualKey::new(0xBE)),
    ("Slash", VirtualKey::new(0xBF)),
    ("/", VirtualKey::new(0xBF)),
    ("Grave", VirtualKey::new(0xC0)),
    ("`", VirtualKey::new(0xC0)),
    ("LeftBracket", VirtualKey::new(0xDB)),
    ("[", VirtualKey::new(0xDB)),
    ("Backslash", VirtualKey::new(0xDC)),
    ("\\", VirtualKey::new(0xDC)),
    ("RightBracket", VirtualKey::new(0xDD)),
    ("]", VirtualKey::new(0xDD)),
    ("Quote", VirtualKey::new(0xDE)),
    ("'", VirtualKey::new(0xDE)),
    // ── Letters ──────────────────────────────────────────────────────────────
    ("A", VirtualKey::new(0x41)),
    ("B", VirtualKey::new(0x42)),
    ("C", VirtualKey::new(0x43)),
    ("D", VirtualKey::new(0x44)),
    ("E", VirtualKey::new(0x45)),
    ("F", VirtualKey::new(0x46)),
    ("G", VirtualKey::new(0x47)),
    ("H", VirtualKey::new(0x48)),
    ("I", VirtualKey::new(0x49)),
    ("J", VirtualKey::new(0x4A)),
    ("K", VirtualKey::new(0x4B)),
    ("L", VirtualKey::new(0x4C)),
    ("M", VirtualKey::new(0x4D)),
    ("N", VirtualKey::new(0x4E)),
    ("O", VirtualKey::new(0x4F)),
    ("P", VirtualKey::new(0x50)),
    ("Q", VirtualKey::new(0x51)),
    ("R", VirtualKey::new(0x52)),
    ("S", VirtualKey::new(0x53)),
    ("T", VirtualKey::new(0x54)),
    ("U", VirtualKey::new(0x55)),
    ("V", VirtualKey::new(0x56)),
    ("W", VirtualKey::new(0x57)),
    ("X", VirtualKey::new(0x58)),
    ("Y", VirtualKey::new(0x59)),
    ("Z", VirtualKey::new(0x5A)),
    // ── Digits ───────────────────────────────────────────────────────────────
    ("0", VirtualKey::new(0x30)),
    ("1", VirtualKey::new(0x31)),
    ("2", VirtualKey::new(0x32)),
    ("3", VirtualKey::new(0x33)),
    ("4", VirtualKey::new(0x34)),
    ("5", VirtualKey::new(0x35)),
    ("6", VirtualKey::new(0x36)),
    ("7", VirtualKey::new(0x37)),
    ("8", VirtualKey::new(0x38)),
    ("9", VirtualKey::new(0x39)),
];

fn symbol_index() -> &'static HashMap<String, VirtualKey> {
    static INDEX: OnceLock<HashMap<String, VirtualKey>> = OnceLock::new();
    INDEX.get_or_init(|| {
        SYMBOLS
            .iter()
            .map(|(name, key)| (name.to_ascii_lowercase(), *key))
            .collect()
    })
}

/// Looks up a key by name, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<VirtualKey> {
    symbol_index().get(&name.to_ascii_lowercase()).copied()
}

/// All recognised key names in table order.
pub fn symbol_names() -> impl Iterator<Item = &'static str> {
    SYMBOLS.iter().map(|(name, _)| *name)
}
