//! Keystroke injection for the `send_keys` action.
//!
//! The sink turns planned [`KeyStep`](keyhook_core::KeyStep)s into OS input.
//! Press and release honour the extended flag carried by the
//! [`VirtualKey`]; literal text goes through Unicode injection and does not
//! touch virtual-key state at all.

use keyhook_core::VirtualKey;
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for keystroke injection.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The OS accepted fewer inputs than were submitted.
    #[error("OS accepted {accepted} of {submitted} synthesized inputs")]
    Rejected { accepted: u32, submitted: u32 },
    /// Injection is not available on this platform.
    #[error("keystroke injection is not supported on {0}")]
    Unsupported(&'static str),
}

/// Platform keystroke injector.
pub trait KeystrokeSink: Send + Sync {
    fn press(&self, key: VirtualKey) -> Result<(), SynthesisError>;
    fn release(&self, key: VirtualKey) -> Result<(), SynthesisError>;
    /// Types `text` literally, character by character.
    fn type_text(&self, text: &str) -> Result<(), SynthesisError>;
}

/// Returns the keystroke sink for the current platform.
pub fn platform_sink() -> std::sync::Arc<dyn KeystrokeSink> {
    #[cfg(target_os = "windows")]
    {
        std::sync::Arc::new(self::windows::SendInputSink::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::sync::Arc::new(UnsupportedSink)
    }
}

#[cfg(not(target_os = "windows"))]
struct UnsupportedSink;

#[cfg(not(target_os = "windows"))]
impl KeystrokeSink for UnsupportedSink {
    fn press(&self, _key: VirtualKey) -> Result<(), SynthesisError> {
        Err(SynthesisError::Unsupported(std::env::consts::OS))
    }

    fn release(&self, _key: VirtualKey) -> Result<(), SynthesisError> {
        Err(SynthesisError::Unsupported(std::env::consts::OS))
    }

    fn type_text(&self, _text: &str) -> Result<(), SynthesisError> {
        Err(SynthesisError::Unsupported(std::env::consts::OS))
    }
}
