//! Driver gateway: synchronous wrapper over the low-level capture driver.
//!
//! The capture driver sits below the OS input queue.  Once a filter is
//! installed, every matching stroke is withheld from the system until the
//! gateway sends it back, which is what lets the service block keys.
//!
//! # Threading
//!
//! A [`DriverGateway`] lives and dies on exactly one thread (the capture
//! loop).  The trait is neither `Send` nor `Sync`: the loop thread calls
//! [`CaptureDriver::create_context`] itself, so the native context never
//! crosses threads and nothing else can call into it.
//!
//! # Lifecycle
//!
//! Dropping the gateway destroys the context.  The loop thread drops it
//! after its last wait returns, so the context outlives every use even if
//! the owner stops waiting for the thread.
//!
//! # Testability
//!
//! [`mock::MockDriver`] scripts device waits and strokes and records every
//! send, so the loop can be tested without the driver installed.

use std::time::Duration;

use keyhook_core::{DeviceId, KeyStroke};
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Device class selected by a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Keyboard,
    Mouse,
}

/// Result of a bounded wait for input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A stroke is pending on this device.
    Device(DeviceId),
    /// Nothing arrived within the timeout.
    Timeout,
}

/// Error type for driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver is not installed on this machine.
    #[error("The interception driver is not installed: {0}. Install the driver and restart the computer.")]
    DriverMissing(String),

    /// The driver files exist but no context could be created.
    #[error("Failed to create interception context. The driver might not be installed or the service is disabled.")]
    ServiceDisabled,

    /// Kernel-level capture is not available on this platform.
    #[error("keyboard interception is not supported on {0}")]
    Unsupported(&'static str),

    /// The driver refused to re-inject a stroke.
    #[error("failed to send stroke to device {device}")]
    SendFailed { device: DeviceId },
}

/// Single-owner handle to an open capture context.
///
/// Every method except context creation is infallible or returns a
/// non-fatal error; callers skip and continue.
pub trait DriverGateway {
    /// Installs the filter for `class`.  `mask` is a combination of the
    /// `FILTER_*` bits in [`keyhook_core::StateFlags`].
    fn set_filter(&mut self, class: DeviceClass, mask: u16);

    /// Blocks until a device has input or `timeout` elapses.  Never blocks
    /// indefinitely.
    fn wait_with_timeout(&mut self, timeout: Duration) -> WaitOutcome;

    /// `true` when `device` is a keyboard.
    fn is_keyboard(&self, device: DeviceId) -> bool;

    /// Receives one stroke from `device`, or `None` if none was available.
    fn receive(&mut self, device: DeviceId) -> Option<KeyStroke>;

    /// Re-injects `stroke` into the OS input stream.
    fn send(&mut self, device: DeviceId, stroke: &KeyStroke) -> Result<(), DriverError>;

    /// Stable hardware id of `device`, or `None` when the driver has none.
    fn hardware_id(&mut self, device: DeviceId) -> Option<String>;
}

/// Factory for capture contexts.
pub trait CaptureDriver: Send + Sync {
    /// Opens a new capture context.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] describing why the driver is unavailable.
    fn create_context(&self) -> Result<Box<dyn DriverGateway>, DriverError>;
}

/// Returns the capture driver for the current platform.
pub fn platform_driver() -> Box<dyn CaptureDriver> {
    #[cfg(target_os = "windows")]
    {
        Box::new(self::windows::InterceptionDriver::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(UnsupportedDriver)
    }
}

/// Raises the calling thread's scheduling priority so the capture loop
/// keeps up with typing even under load.  Failures are logged and ignored.
pub fn raise_capture_thread_priority() {
    #[cfg(target_os = "windows")]
    self::windows::raise_current_thread_priority();
}

/// Capture driver for platforms without the kernel driver.
#[cfg(not(target_os = "windows"))]
struct UnsupportedDriver;

#[cfg(not(target_os = "windows"))]
impl CaptureDriver for UnsupportedDriver {
    fn create_context(&self) -> Result<Box<dyn DriverGateway>, DriverError> {
        Err(DriverError::Unsupported(std::env::consts::OS))
    }
}

/// Decodes a UTF-16LE hardware id buffer, stopping at the first NUL.
///
/// The driver reports ids as a multi-string; the first entry is the most
/// specific and is the one used for matching.
pub fn decode_hardware_id(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    if units.is_empty() {
        return None;
    }
    let id = String::from_utf16_lossy(&units);
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
