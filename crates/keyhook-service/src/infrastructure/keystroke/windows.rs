//! Windows keystroke injection via the SendInput API.
//!
//! Virtual-key presses carry `KEYEVENTF_EXTENDEDKEY` when the key is marked
//! extended, on both edges.  Literal text uses `KEYEVENTF_UNICODE`, one
//! down/up pair per UTF-16 unit, so it is independent of keyboard layout and
//! of any modifier currently held.

#![cfg(target_os = "windows")]

use keyhook_core::VirtualKey;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, VIRTUAL_KEY,
};

use super::{KeystrokeSink, SynthesisError};

/// [`KeystrokeSink`] backed by `SendInput`.
#[derive(Debug, Default)]
pub struct SendInputSink;

impl SendInputSink {
    pub fn new() -> Self {
        Self
    }
}

impl KeystrokeSink for SendInputSink {
    fn press(&self, key: VirtualKey) -> Result<(), SynthesisError> {
        send_inputs(&[virtual_key_input(key, false)])
    }

    fn release(&self, key: VirtualKey) -> Result<(), SynthesisError> {
        send_inputs(&[virtual_key_input(key, true)])
    }

    fn type_text(&self, text: &str) -> Result<(), SynthesisError> {
        let inputs: Vec<INPUT> = text
            .encode_utf16()
            .flat_map(|unit| [unicode_input(unit, false), unicode_input(unit, true)])
            .collect();
        if inputs.is_empty() {
            return Ok(());
        }
        send_inputs(&inputs)
    }
}

fn virtual_key_input(key: VirtualKey, key_up: bool) -> INPUT {
    let mut flags = KEYBD_EVENT_FLAGS(0);
    if key.extended {
        flags |= KEYEVENTF_EXTENDEDKEY;
    }
    if key_up {
        flags |= KEYEVENTF_KEYUP;
    }
    keyboard_input(VIRTUAL_KEY(key.code as u16), 0, flags)
}

fn unicode_input(unit: u16, key_up: bool) -> INPUT {
    let mut flags = KEYEVENTF_UNICODE;
    if key_up {
        flags |= KEYEVENTF_KEYUP;
    }
    keyboard_input(VIRTUAL_KEY(0), unit, flags)
}

fn keyboard_input(vk: VIRTUAL_KEY, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send_inputs(inputs: &[INPUT]) -> Result<(), SynthesisError> {
    // SAFETY: every element is a fully initialised keyboard INPUT and the size
    // argument matches the struct layout SendInput expects.
    let accepted = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    let submitted = inputs.len() as u32;
    if accepted == submitted {
        Ok(())
    } else {
        Err(SynthesisError::Rejected {
            accepted,
            submitted,
        })
    }
}
