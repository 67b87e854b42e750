//! # keyhook-core
//!
//! Shared library for Keyhook containing the domain entities, the immutable
//! key tables, and the key-sequence planner used by the keystroke action.
//!
//! This crate has zero dependencies on OS APIs, capture drivers, or async
//! runtimes.  Everything here can be compiled and tested on any platform.
//!
//! # Architecture overview
//!
//! Keyhook sits below the OS input queue: a low-level capture driver hands
//! every physical keystroke to the service, which decides per device and per
//! key whether the stroke reaches the rest of the system and which configured
//! action (launch a process, type keys, call a URL, play a sound) to fire.
//!
//! - **`domain`** – Devices, raw strokes, key events, and bindings.  These are
//!   the values that flow between the capture loop and the action engine.
//!
//! - **`keymap`** – Process-wide lookup tables built once: scan code to human
//!   readable key name, and symbolic key name to Windows virtual key.
//!
//! - **`sequence`** – Parses `"Ctrl+Shift+F1"`-style strings and turns them
//!   into a strictly ordered, timed list of press/release steps.

pub mod domain;
pub mod keymap;
pub mod sequence;

pub use domain::binding::{ActionDescriptor, Binding};
pub use domain::device::{DeviceId, DeviceRecord};
pub use domain::event::KeyEvent;
pub use domain::stroke::{KeyStroke, StateFlags};
pub use keymap::scan_codes::key_name;
pub use keymap::virtual_keys::VirtualKey;
pub use sequence::{parse_sequence, KeySequence, KeyStep, SequenceError};
