//! Key events as seen by listeners on the capture thread.

use std::sync::Arc;

use super::device::DeviceRecord;
use super::stroke::KeyStroke;
use crate::keymap::scan_codes;

/// One keystroke from one device, plus the listener-settable handled flag.
///
/// Everything except `handled` is fixed at construction.  Listeners receive
/// `&mut KeyEvent` for the single notification round on the capture thread;
/// if any of them sets `handled`, the stroke is not forwarded to the OS.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    device: Arc<DeviceRecord>,
    stroke: KeyStroke,
    handled: bool,
}

impl KeyEvent {
    pub fn new(device: Arc<DeviceRecord>, stroke: KeyStroke) -> Self {
        Self {
            device,
            stroke,
            handled: false,
        }
    }

    /// The device the stroke came from.
    pub fn device(&self) -> &Arc<DeviceRecord> {
        &self.device
    }

    /// The raw stroke exactly as received.
    pub fn stroke(&self) -> KeyStroke {
        self.stroke
    }

    pub fn scan_code(&self) -> u16 {
        self.stroke.code
    }

    pub fn state(&self) -> u16 {
        self.stroke.state
    }

    /// `true` iff the key-up bit is clear.
    pub fn is_key_down(&self) -> bool {
        self.stroke.is_key_down()
    }

    pub fn is_key_up(&self) -> bool {
        self.stroke.is_key_up()
    }

    /// Human readable key name, e.g. `"A"`, `"RightCtrl"`, `"Key0x7F"`.
    pub fn key_name(&self) -> String {
        scan_codes::key_name(self.stroke.code, self.stroke.is_extended())
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Marks the stroke as consumed so it is not forwarded to the OS.
    pub fn set_handled(&mut self) {
        self.handled = true;
    }
}
