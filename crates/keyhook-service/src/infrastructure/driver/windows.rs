//! Interception driver gateway for Windows.
//!
//! Talks to the driver through the raw `interception-sys` layer re-exported
//! by `kanata-interception`.  The typed wrapper maps every scan code its
//! enum lacks (0x73, 0x7D and friends) to `Esc`, which would both hide those
//! keys from bindings and re-inject the wrong key, so strokes stay in their
//! raw `InterceptionKeyStroke` form from receive to send.
//!
//! # Safety
//!
//! Every `unsafe` block is an FFI call on the context pointer owned by
//! [`RawContext`], which is non-null from creation until `Drop`.  Buffers
//! passed to the driver are stack values that outlive the call.

#![cfg(target_os = "windows")]

use std::os::raw::c_int;
use std::path::PathBuf;
use std::time::Duration;

use kanata_interception::raw;
use keyhook_core::{DeviceId, KeyStroke};
use tracing::{debug, trace, warn};
use windows::Win32::System::Threading::{GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_HIGHEST};

use super::{
    decode_hardware_id, CaptureDriver, DeviceClass, DriverError, DriverGateway, WaitOutcome,
};

/// Size of the hardware id buffer; ids are UTF-16 multi-strings.
const HARDWARE_ID_BUFFER_LEN: usize = 500;

/// [`CaptureDriver`] backed by the Interception kernel driver.
#[derive(Debug, Default)]
pub struct InterceptionDriver;

impl InterceptionDriver {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureDriver for InterceptionDriver {
    fn create_context(&self) -> Result<Box<dyn DriverGateway>, DriverError> {
        match RawContext::create() {
            Some(context) => {
                debug!("interception context created");
                Ok(Box::new(InterceptionGateway {
                    context,
                    last_received: None,
                }))
            }
            None => Err(diagnose_context_failure()),
        }
    }
}

/// Distinguishes a missing driver from a stopped or disabled one.
///
/// The installer places `keyboard.sys` in the system driver directory; if it
/// is there the driver is installed but its service did not start.
fn diagnose_context_failure() -> DriverError {
    let driver_file = std::env::var_os("SystemRoot")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("C:\\Windows"))
        .join("System32")
        .join("drivers")
        .join("keyboard.sys");

    if driver_file.exists() {
        DriverError::ServiceDisabled
    } else {
        DriverError::DriverMissing(format!("{} not found", driver_file.display()))
    }
}

/// Raises the calling thread to `THREAD_PRIORITY_HIGHEST`.
pub(super) fn raise_current_thread_priority() {
    // SAFETY: GetCurrentThread returns a pseudo-handle valid for the calling
    // thread; SetThreadPriority only reads it.
    let result = unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_HIGHEST) };
    if let Err(e) = result {
        warn!("failed to raise capture thread priority: {e}");
    }
}

unsafe extern "C" fn keyboard_predicate(device: raw::InterceptionDevice) -> c_int {
    raw::interception_is_keyboard(device)
}

unsafe extern "C" fn mouse_predicate(device: raw::InterceptionDevice) -> c_int {
    raw::interception_is_mouse(device)
}

/// Owning handle to a driver context.  Destroyed on drop.
struct RawContext(raw::InterceptionContext);

impl RawContext {
    fn create() -> Option<Self> {
        // SAFETY: no preconditions; a null return means the driver is absent.
        let ctx = unsafe { raw::interception_create_context() };
        if ctx.is_null() {
            None
        } else {
            Some(Self(ctx))
        }
    }
}

impl Drop for RawContext {
    fn drop(&mut self) {
        // SAFETY: the pointer came from interception_create_context and is
        // destroyed exactly once.
        unsafe { raw::interception_destroy_context(self.0) }
    }
}

/// Converts a raw driver stroke, keeping the scan code exactly as delivered.
fn key_stroke_from_raw(stroke: &raw::InterceptionKeyStroke) -> KeyStroke {
    KeyStroke {
        code: stroke.code,
        state: stroke.state,
        information: stroke.information,
    }
}

/// Owned capture context.  Only the capture loop thread holds one.
pub struct InterceptionGateway {
    context: RawContext,
    /// Raw form of the most recent stroke, for faithful re-injection.
    last_received: Option<(DeviceId, raw::InterceptionKeyStroke)>,
}

impl DriverGateway for InterceptionGateway {
    fn set_filter(&mut self, class: DeviceClass, mask: u16) {
        let predicate: raw::InterceptionPredicate = match class {
            DeviceClass::Keyboard => Some(keyboard_predicate),
            DeviceClass::Mouse => Some(mouse_predicate),
        };
        // SAFETY: live context; the predicates are plain functions.
        unsafe { raw::interception_set_filter(self.context.0, predicate, mask) }
    }

    fn wait_with_timeout(&mut self, timeout: Duration) -> WaitOutcome {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        // SAFETY: live context.
        let device = unsafe { raw::interception_wait_with_timeout(self.context.0, millis as _) };
        if device > 0 {
            WaitOutcome::Device(DeviceId(device))
        } else {
            WaitOutcome::Timeout
        }
    }

    fn is_keyboard(&self, device: DeviceId) -> bool {
        device.is_keyboard()
    }

    fn receive(&mut self, device: DeviceId) -> Option<KeyStroke> {
        let mut buffer = raw::InterceptionKeyStroke::default();
        // SAFETY: live context; the buffer holds exactly one keyboard stroke
        // and only keyboard devices reach this call.
        let received = unsafe {
            raw::interception_receive(
                self.context.0,
                device.0,
                (&mut buffer as *mut raw::InterceptionKeyStroke).cast(),
                1,
            )
        };
        if received <= 0 {
            return None;
        }

        let stroke = key_stroke_from_raw(&buffer);
        trace!(device = device.0, ?stroke, "received stroke");
        self.last_received = Some((device, buffer));
        Some(stroke)
    }

    fn send(&mut self, device: DeviceId, stroke: &KeyStroke) -> Result<(), DriverError> {
        let raw_stroke = match self.last_received {
            Some((last_device, raw_stroke))
                if last_device == device && key_stroke_from_raw(&raw_stroke) == *stroke =>
            {
                raw_stroke
            }
            _ => {
                warn!(device = device.0, ?stroke, "refusing to send a stroke that was not just received");
                return Err(DriverError::SendFailed { device });
            }
        };

        // SAFETY: live context; one keyboard stroke read from a stack value.
        let sent = unsafe {
            raw::interception_send(
                self.context.0,
                device.0,
                (&raw_stroke as *const raw::InterceptionKeyStroke).cast(),
                1,
            )
        };
        if sent <= 0 {
            return Err(DriverError::SendFailed { device });
        }
        Ok(())
    }

    fn hardware_id(&mut self, device: DeviceId) -> Option<String> {
        let mut buffer = [0u8; HARDWARE_ID_BUFFER_LEN];
        // SAFETY: live context; the length passed matches the buffer.
        let len = unsafe {
            raw::interception_get_hardware_id(
                self.context.0,
                device.0,
                buffer.as_mut_ptr().cast(),
                HARDWARE_ID_BUFFER_LEN as _,
            )
        } as usize;
        if len == 0 {
            return None;
        }
        decode_hardware_id(&buffer[..len.min(HARDWARE_ID_BUFFER_LEN)])
    }
}
