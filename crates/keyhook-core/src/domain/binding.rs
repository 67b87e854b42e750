//! Host-owned key bindings.
//!
//! A binding maps one key on one physical keyboard to an action descriptor
//! and a block decision.  The core never persists bindings; the host loads
//! them from its configuration and hands them over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A pluggable side effect, described by its type id and loosely typed
/// parameters.  The action registry coerces the parameters into the typed
/// fields of the concrete action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Registered action type, e.g. `"run_app"` or `"send_keys"`.
    pub type_id: String,
    /// Named parameters as stored in configuration.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ActionDescriptor {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Builder-style helper for adding one parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Rule mapping `(device, scan code, edge)` to an action and a block flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Hardware id of the keyboard this binding applies to.
    pub device_hardware_id: String,
    /// Scan code of the bound key.
    pub scan_code: u16,
    /// Display name of the key, informational only.
    #[serde(default)]
    pub key_name: String,
    /// Fire the action when the key goes down.
    #[serde(default = "default_true")]
    pub trigger_on_key_down: bool,
    /// Fire the action when the key comes up.
    #[serde(default)]
    pub trigger_on_key_up: bool,
    /// Withhold the key from the OS on both edges.
    #[serde(default = "default_true")]
    pub block_key: bool,
    pub action: ActionDescriptor,
}

fn default_true() -> bool {
    true
}

impl Binding {
    /// Creates a binding with the default edge and block flags.
    pub fn new(device_hardware_id: impl Into<String>, scan_code: u16, action: ActionDescriptor) -> Self {
        Self {
            device_hardware_id: device_hardware_id.into(),
            scan_code,
            key_name: String::new(),
            trigger_on_key_down: true,
            trigger_on_key_up: false,
            block_key: true,
            action,
        }
    }

    /// `true` when this binding is for `scan_code` on the keyboard with
    /// `hardware_id`.  Hardware ids compare case-insensitively.
    pub fn matches(&self, hardware_id: &str, scan_code: u16) -> bool {
        self.scan_code == scan_code && self.device_hardware_id.eq_ignore_ascii_case(hardware_id)
    }

    /// Whether the action fires on the given edge.
    pub fn triggers_on(&self, is_key_down: bool) -> bool {
        if is_key_down {
            self.trigger_on_key_down
        } else {
            self.trigger_on_key_up
        }
    }
}
