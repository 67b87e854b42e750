//! Key-sequence parsing and emission planning.
//!
//! A key sequence is the user-facing string of a `send_keys` action.  Three
//! shapes are accepted:
//!
//! | Input             | Parsed as                        |
//! |-------------------|----------------------------------|
//! | `"Ctrl+Shift+F1"` | [`KeySequence::Combo`]           |
//! | `"Delete"`, `"a"` | [`KeySequence::Key`]             |
//! | `"Hello"`         | [`KeySequence::Text`] (literal)  |
//!
//! Parsing never fails: unrecognised tokens are skipped and a sequence
//! without a usable main key becomes [`KeySequence::Unresolved`], which plans
//! to nothing.  [`KeySequence::validate`] reports the same conditions as
//! errors for configuration-time checks.
//!
//! # Emission order
//!
//! [`KeySequence::plan`] flattens a sequence into [`KeyStep`]s.  For a combo:
//!
//! 1. press every modifier in the order written
//! 2. settle pause
//! 3. press main key, hold pause, release main key
//! 4. settle pause
//! 5. release the modifiers in reverse order
//!
//! The executor must run the steps strictly in order.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::keymap::virtual_keys::{self, VirtualKey};

/// Pause after pressing modifiers and before releasing them.
pub const SETTLE_DELAY: Duration = Duration::from_millis(20);
/// Pause between pressing and releasing the main key.
pub const HOLD_DELAY: Duration = Duration::from_millis(20);

/// Token separator inside a combo.
const SEPARATOR: char = '+';

/// Configuration-time problems with a key sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("Key sequence is required")]
    Empty,
    #[error("Key sequence '{0}' has no main key")]
    NoMainKey(String),
}

/// A parsed key sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySequence {
    /// Blank input.
    Empty,
    /// One key pressed and released on its own.
    Key(VirtualKey),
    /// Modifiers held around a single main key.
    Combo {
        modifiers: Vec<VirtualKey>,
        main: VirtualKey,
    },
    /// Literal text injected character by character.
    Text(String),
    /// A combo in which no token resolved to a main key.
    Unresolved { input: String },
}

/// One step of an emission plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStep {
    Press(VirtualKey),
    Release(VirtualKey),
    Pause(Duration),
    /// Literal text, bypassing press/release entirely.
    Text(String),
}

impl fmt::Display for KeyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStep::Press(key) => write!(f, "press {key}"),
            KeyStep::Release(key) => write!(f, "release {key}"),
            KeyStep::Pause(d) => write!(f, "pause {}ms", d.as_millis()),
            KeyStep::Text(text) => write!(f, "text {} chars", text.chars().count()),
        }
    }
}

/// Parses a user-facing key sequence.
pub fn parse_sequence(input: &str) -> KeySequence {
    let input = input.trim();
    if input.is_empty() {
        return KeySequence::Empty;
    }

    if input.contains(SEPARATOR) {
        return parse_combo(input);
    }

    if let Some(key) = virtual_keys::lookup(input) {
        return KeySequence::Key(key);
    }

    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => match char_key(c) {
            Some(key) => KeySequence::Key(key),
            None => KeySequence::Text(input.to_string()),
        },
        _ => KeySequence::Text(input.to_string()),
    }
}

fn parse_combo(input: &str) -> KeySequence {
    let mut modifiers = Vec::new();
    let mut main: Option<VirtualKey> = None;

    for token in input.split(SEPARATOR).map(str::trim).filter(|t| !t.is_empty()) {
        let key = match virtual_keys::lookup(token) {
            Some(key) => key,
            None => {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => match char_key(c) {
                        Some(key) => key,
                        None => {
                            debug!(token, "skipping non-ASCII key token");
                            continue;
                        }
                    },
                    _ => {
                        debug!(token, "skipping unrecognised key token");
                        continue;
                    }
                }
            }
        };

        if key.is_modifier() {
            modifiers.push(key);
        } else {
            if let Some(previous) = main {
                warn!(%previous, replacement = %key, sequence = input, "multiple main keys, using the last");
            }
            main = Some(key);
        }
    }

    match main {
        Some(main) => KeySequence::Combo { modifiers, main },
        None => KeySequence::Unresolved {
            input: input.to_string(),
        },
    }
}

/// Maps a single unmatched ASCII character by its upper-case code point.
fn char_key(c: char) -> Option<VirtualKey> {
    if c.is_ascii() && !c.is_ascii_control() {
        Some(VirtualKey::new(c.to_ascii_uppercase() as u8))
    } else {
        None
    }
}

impl KeySequence {
    /// Reports blank input and combos without a main key.
    pub fn validate(&self) -> Result<(), SequenceError> {
        match self {
            KeySequence::Empty => Err(SequenceError::Empty),
            KeySequence::Unresolved { input } => Err(SequenceError::NoMainKey(input.clone())),
            _ => Ok(()),
        }
    }

    /// `true` when [`plan`](Self::plan) yields at least one step.
    pub fn is_actionable(&self) -> bool {
        self.validate().is_ok()
    }

    /// Flattens the sequence into strictly ordered, timed steps.
    ///
    /// Empty and unresolved sequences plan to nothing.
    pub fn plan(&self) -> Vec<KeyStep> {
        match self {
            KeySequence::Empty | KeySequence::Unresolved { .. } => Vec::new(),
            KeySequence::Key(key) => vec![
                KeyStep::Press(*key),
                KeyStep::Pause(HOLD_DELAY),
                KeyStep::Release(*key),
            ],
            KeySequence::Combo { modifiers, main } => {
                let mut steps = Vec::with_capacity(modifiers.len() * 2 + 5);
                steps.extend(modifiers.iter().map(|m| KeyStep::Press(*m)));
                if !modifiers.is_empty() {
                    steps.push(KeyStep::Pause(SETTLE_DELAY));
                }
                steps.push(KeyStep::Press(*main));
                steps.push(KeyStep::Pause(HOLD_DELAY));
                steps.push(KeyStep::Release(*main));
                if !modifiers.is_empty() {
                    steps.push(KeyStep::Pause(SETTLE_DELAY));
                }
                steps.extend(modifiers.iter().rev().map(|m| KeyStep::Release(*m)));
                steps
            }
            KeySequence::Text(text) => vec![KeyStep::Text(text.clone())],
        }
    }
}
