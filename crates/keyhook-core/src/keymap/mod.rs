//! Immutable key lookup tables.
//!
//! Both tables are process-wide and read-only: the scan-code name tables are
//! `const` arrays, the symbol table is built once on first use and then shared
//! by reference.
//!
//! - [`scan_codes`]: hardware scan code (plus `E0` flag) to display name.
//! - [`virtual_keys`]: symbolic key name (`"Ctrl"`, `"F1"`, `"PageUp"`) to the
//!   Windows virtual key used for synthesis, with its extended-key marking.

pub mod scan_codes;
pub mod virtual_keys;

pub use scan_codes::{all_key_names, key_name};
pub use virtual_keys::{lookup, VirtualKey};
