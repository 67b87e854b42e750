//! Application layer use cases for the Keyhook service.
//!
//! # What lives here? (for beginners)
//!
//! The *application* layer sits between the domain types in `keyhook-core`
//! and the OS adapters in [`crate::infrastructure`].  It owns the decisions
//! (which stroke is blocked, which action fires) and talks to the OS only
//! through traits, so every use case can be tested against mocks.
//!
//! # Sub-modules
//!
//! - **`interception_loop`** – The capture thread: wait, receive, notify
//!   listeners, then block or forward.  Runs on every physical keystroke.
//!
//! - **`device_registry`** – Session-scoped records for each keyboard the
//!   driver reports, plus the per-device intercept policy.
//!
//! - **`action_registry`** – Type id to action factory mapping, the explicit
//!   field tables that apply configured parameters, and the executor that
//!   runs actions off the capture thread.
//!
//! - **`dispatch_bindings`** – The key listener that matches bindings and
//!   hands triggered actions to the executor.

pub mod action_registry;
pub mod device_registry;
pub mod dispatch_bindings;
pub mod interception_loop;
