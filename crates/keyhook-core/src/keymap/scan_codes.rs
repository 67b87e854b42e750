//! Scan code to key name tables.
//!
//! Set 1 scan codes fit in seven bits, so each table is a 128-entry array
//! indexed by the code.  Keys that share a code with a numpad key (the
//! navigation cluster, right-hand modifiers, numpad Enter and Divide) are
//! told apart by the `E0` prefix and live in the extended table.
//!
//! Codes without a name render as `Key0x{XX}`.

const TABLE_SIZE: usize = 128;

/// Names for strokes without the `E0` prefix.
const NORMAL_NAMES: [Option<&str>; TABLE_SIZE] = {
    let mut t: [Option<&str>; TABLE_SIZE] = [None; TABLE_SIZE];

    // ── Function keys ────────────────────────────────────────────────────────
    t[0x3B] = Some("F1");
    t[0x3C] = Some("F2");
    t[0x3D] = Some("F3");
    t[0x3E] = Some("F4");
    t[0x3F] = Some("F5");
    t[0x40] = Some("F6");
    t[0x41] = Some("F7");
    t[0x42] = Some("F8");
    t[0x43] = Some("F9");
    t[0x44] = Some("F10");
    t[0x57] = Some("F11");
    t[0x58] = Some("F12");

    // ── Digit row ────────────────────────────────────────────────────────────
    t[0x02] = Some("1");
    t[0x03] = Some("2");
    t[0x04] = Some("3");
    t[0x05] = Some("4");
    t[0x06] = Some("5");
    t[0x07] = Some("6");
    t[0x08] = Some("7");
    t[0x09] = Some("8");
    t[0x0A] = Some("9");
    t[0x0B] = Some("0");

    // ── Letters (QWERTY positions) ───────────────────────────────────────────
    t[0x1E] = Some("A");
    t[0x30] = Some("B");
    t[0x2E] = Some("C");
    t[0x20] = Some("D");
    t[0x12] = Some("E");
    t[0x21] = Some("F");
    t[0x22] = Some("G");
    t[0x23] = Some("H");
    t[0x17] = Some("I");
    t[0x24] = Some("J");
    t[0x25] = Some("K");
    t[0x26] = Some("L");
    t[0x32] = Some("M");
    t[0x31] = Some("N");
    t[0x18] = Some("O");
    t[0x19] = Some("P");
    t[0x10] = Some("Q");
    t[0x13] = Some("R");
    t[0x1F] = Some("S");
    t[0x14] = Some("T");
    t[0x16] = Some("U");
    t[0x2F] = Some("V");
    t[0x11] = Some("W");
    t[0x2D] = Some("X");
    t[0x15] = Some("Y");
    t[0x2C] = Some("Z");

    // ── Numpad ───────────────────────────────────────────────────────────────
    t[0x52] = Some("NumPad0");
    t[0x4F] = Some("NumPad1");
    t[0x50] = Some("NumPad2");
    t[0x51] = Some("NumPad3");
    t[0x4B] = Some("NumPad4");
    t[0x4C] = Some("NumPad5");
    t[0x4D] = Some("NumPad6");
    t[0x47] = Some("NumPad7");
    t[0x48] = Some("NumPad8");
    t[0x49] = Some("NumPad9");
    t[0x53] = Some("NumPadDot");
    t[0x37] = Some("NumPadMul");
    t[0x4A] = Some("NumPadSub");
    t[0x4E] = Some("NumPadAdd");

    // ── Control keys ─────────────────────────────────────────────────────────
    t[0x01] = Some("Escape");
    t[0x0E] = Some("Backspace");
    t[0x0F] = Some("Tab");
    t[0x1C] = Some("Enter");
    t[0x1D] = Some("LeftCtrl");
    t[0x2A] = Some("LeftShift");
    t[0x36] = Some("RightShift");
    t[0x38] = Some("LeftAlt");
    t[0x39] = Some("Space");
    t[0x3A] = Some("CapsLock");
    t[0x45] = Some("NumLock");
    t[0x46] = Some("ScrollLock");

    // ── Punctuation ──────────────────────────────────────────────────────────
    t[0x0C] = Some("Minus");
    t[0x0D] = Some("Equals");
    t[0x1A] = Some("LeftBracket");
    t[0x1B] = Some("RightBracket");
    t[0x27] = Some("Semicolon");
    t[0x28] = Some("Quote");
    t[0x29] = Some("Grave");
    t[0x2B] = Some("Backslash");
    t[0x33] = Some("Comma");
    t[0x34] = Some("Period");
    t[0x35] = Some("Slash");

    t
};

/// Names for strokes carrying the `E0` prefix.
const EXTENDED_NAMES: [Option<&str>; TABLE_SIZE] = {
    let mut t: [Option<&str>; TABLE_SIZE] = [None; TABLE_SIZE];

    t[0x1C] = Some("NumPadEnter");
    t[0x1D] = Some("RightCtrl");
    t[0x35] = Some("NumPadDiv");
    t[0x38] = Some("RightAlt");
    t[0x47] = Some("Home");
    t[0x48] = Some("Up");
    t[0x49] = Some("PageUp");
    t[0x4B] = Some("Left");
    t[0x4D] = Some("Right");
    t[0x4F] = Some("End");
    t[0x50] = Some("Down");
    t[0x51] = Some("PageDown");
    t[0x52] = Some("Insert");
    t[0x53] = Some("Delete");
    t[0x5B] = Some("LeftWin");
    t[0x5C] = Some("RightWin");
    t[0x5D] = Some("Menu");

    t
};

/// Returns the display name of `scan_code`, consulting the extended table
/// first when `extended` is set.
///
/// An extended code missing from the extended table falls back to the normal
/// table; a code missing from both renders as `Key0x{XX}`.
pub fn key_name(scan_code: u16, extended: bool) -> String {
    let index = scan_code as usize;
    let lookup = |table: &[Option<&'static str>; TABLE_SIZE]| table.get(index).copied().flatten();

    let name = if extended {
        lookup(&EXTENDED_NAMES).or_else(|| lookup(&NORMAL_NAMES))
    } else {
        lookup(&NORMAL_NAMES)
    };

    match name {
        Some(name) => name.to_string(),
        None => format!("Key0x{scan_code:02X}"),
    }
}

/// Every named key as `(scan_code, extended, name)`, normal table first.
///
/// Used by hosts to populate key pickers.
pub fn all_key_names() -> Vec<(u16, bool, &'static str)> {
    let normal = NORMAL_NAMES
        .iter()
        .enumerate()
        .filter_map(|(code, name)| name.map(|n| (code as u16, false, n)));
    let extended = EXTENDED_NAMES
        .iter()
        .enumerate()
        .filter_map(|(code, name)| name.map(|n| (code as u16, true, n)));
    normal.chain(extended).collect()
}
