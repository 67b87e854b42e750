//! Domain entities for Keyhook.
//!
//! Pure data types shared by the capture loop, the device registry, and the
//! action engine.  Nothing in here touches the OS.
//!
//! - [`stroke::KeyStroke`] is the raw value the capture driver hands over.
//! - [`device::DeviceRecord`] is the session-scoped view of one keyboard.
//! - [`event::KeyEvent`] is what listeners see for each stroke.
//! - [`binding::Binding`] is the host-owned rule mapping a key to an action.

pub mod binding;
pub mod device;
pub mod event;
pub mod stroke;
