//! Infrastructure layer for the Keyhook service.
//!
//! Contains OS-facing adapters: the capture driver gateway, keystroke
//! injection, audio output, the concrete actions, and file-system storage.
//!
//! Each adapter family exposes a trait in its `mod.rs`, a `mock` test
//! double, and a `windows` implementation compiled only on Windows.

pub mod actions;
pub mod audio;
pub mod driver;
pub mod keystroke;
pub mod storage;
