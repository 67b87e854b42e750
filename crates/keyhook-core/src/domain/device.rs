//! Session-scoped keyboard device records.
//!
//! The capture driver identifies devices by a small integer that is only
//! stable for the lifetime of one capture context.  The hardware id is the
//! value that survives reboots and re-plugging, so it is what configuration
//! refers to and what record equality is based on.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Driver-assigned device number.  Keyboards occupy ids 1 through 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub i32);

impl DeviceId {
    /// First id the driver assigns to a keyboard.
    pub const FIRST_KEYBOARD: i32 = 1;
    /// Last id the driver assigns to a keyboard.
    pub const LAST_KEYBOARD: i32 = 10;

    /// Returns `true` when the id falls inside the keyboard range.
    pub fn is_keyboard(self) -> bool {
        (Self::FIRST_KEYBOARD..=Self::LAST_KEYBOARD).contains(&self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical keyboard as observed during this session.
///
/// Records are shared between the capture thread and the configuration path
/// behind an `Arc`, so the mutable parts (intercept flag, friendly name,
/// last-seen time) use interior mutability.
#[derive(Debug)]
pub struct DeviceRecord {
    id: DeviceId,
    hardware_id: Option<String>,
    friendly_name: RwLock<String>,
    intercepted: AtomicBool,
    last_seen_ms: AtomicU64,
}

impl DeviceRecord {
    /// Creates a record that has just been observed.
    ///
    /// An empty hardware id is normalised to `None`.
    pub fn new(
        id: DeviceId,
        hardware_id: Option<String>,
        friendly_name: impl Into<String>,
        intercepted: bool,
    ) -> Self {
        Self {
            id,
            hardware_id: hardware_id.filter(|h| !h.is_empty()),
            friendly_name: RwLock::new(friendly_name.into()),
            intercepted: AtomicBool::new(intercepted),
            last_seen_ms: AtomicU64::new(now_millis()),
        }
    }

    /// Session-scoped driver id.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Stable hardware id, if the driver reported one.
    pub fn hardware_id(&self) -> Option<&str> {
        self.hardware_id.as_deref()
    }

    /// Display name for logs and pickers.
    pub fn friendly_name(&self) -> String {
        match self.friendly_name.read() {
            Ok(name) => name.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_friendly_name(&self, name: impl Into<String>) {
        let name = name.into();
        match self.friendly_name.write() {
            Ok(mut guard) => *guard = name,
            Err(poisoned) => *poisoned.into_inner() = name,
        }
    }

    /// Whether every stroke from this device is withheld from the OS.
    pub fn is_intercepted(&self) -> bool {
        self.intercepted.load(Ordering::Acquire)
    }

    pub fn set_intercepted(&self, intercepted: bool) {
        self.intercepted.store(intercepted, Ordering::Release);
    }

    /// Milliseconds since the Unix epoch at which a stroke was last seen.
    pub fn last_seen_ms(&self) -> u64 {
        self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// Refreshes the last-seen timestamp to now.
    pub fn touch(&self) {
        self.last_seen_ms.store(now_millis(), Ordering::Relaxed);
    }
}

impl PartialEq for DeviceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.hardware_id == other.hardware_id
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Device {})", self.friendly_name(), self.id)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
