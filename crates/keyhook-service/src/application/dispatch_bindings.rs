//! BindingDispatcher: the key listener that turns bindings into actions.
//!
//! Runs on the capture thread for every key event, so it only does lookups
//! and hands the action off to the [`ActionExecutor`].  Per edge, the first
//! binding whose hardware id and scan code match and whose trigger flags
//! cover that edge wins, so a key-down and a key-up binding can share a key.
//!
//! Blocking is decided over every matching binding: any `block_key` marks
//! the event handled on both edges, even when only one edge triggers an
//! action, so the OS never sees a lone key-up for a key whose key-down it
//! never received.

use std::sync::Arc;

use keyhook_core::{Binding, KeyEvent};
use tracing::{debug, info, warn};

use super::action_registry::{ActionExecutor, ActionRegistry};

/// A configuration problem found by [`validate_bindings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingIssue {
    /// Position of the binding in the configured list.
    pub index: usize,
    pub device_hardware_id: String,
    pub scan_code: u16,
    pub message: String,
}

impl std::fmt::Display for BindingIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "binding #{} ({} / 0x{:02X}): {}",
            self.index, self.device_hardware_id, self.scan_code, self.message
        )
    }
}

/// Key listener dispatching events to configured actions.
pub struct BindingDispatcher {
    bindings: Vec<Binding>,
    registry: Arc<ActionRegistry>,
    executor: ActionExecutor,
}

impl BindingDispatcher {
    pub fn new(bindings: Vec<Binding>, registry: Arc<ActionRegistry>, executor: ActionExecutor) -> Self {
        info!(count = bindings.len(), "bindings loaded");
        Self {
            bindings,
            registry,
            executor,
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// First binding for `hardware_id` and `scan_code` that triggers on the
    /// given edge.
    pub fn find(&self, hardware_id: &str, scan_code: u16, is_key_down: bool) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|b| b.matches(hardware_id, scan_code) && b.triggers_on(is_key_down))
    }

    /// `true` if any binding for the key asks for it to be swallowed.
    pub fn blocks(&self, hardware_id: &str, scan_code: u16) -> bool {
        self.bindings
            .iter()
            .any(|b| b.block_key && b.matches(hardware_id, scan_code))
    }

    /// Handles one key event.  Never blocks and never panics on bad
    /// configuration.
    pub fn handle(&self, event: &mut KeyEvent) {
        let Some(hardware_id) = event.device().hardware_id().map(str::to_owned) else {
            return;
        };
        let hardware_id = hardware_id.as_str();
        let scan_code = event.scan_code();
        if self.blocks(hardware_id, scan_code) {
            event.set_handled();
        }

        let Some(binding) = self.find(hardware_id, scan_code, event.is_key_down()) else {
            return;
        };

        let descriptor = &binding.action;
        let Some(action) = self.registry.create(&descriptor.type_id, &descriptor.parameters) else {
            warn!(
                type_id = %descriptor.type_id,
                scan_code = binding.scan_code,
                "binding skipped: unknown action type"
            );
            return;
        };

        let invocation = self.executor.execute(action, event.clone());
        debug!(
            %invocation,
            key = %event.key_name(),
            device = %event.device(),
            "binding triggered"
        );
    }
}

/// Checks every binding once at startup: the action type must be registered
/// and the built action must pass `validate()`.  Problems are returned, not
/// raised; the affected bindings still block their keys at runtime.
pub fn validate_bindings(bindings: &[Binding], registry: &ActionRegistry) -> Vec<BindingIssue> {
    let mut issues = Vec::new();
    for (index, binding) in bindings.iter().enumerate() {
        let issue = |message: String| BindingIssue {
            index,
            device_hardware_id: binding.device_hardware_id.clone(),
            scan_code: binding.scan_code,
            message,
        };

        if !binding.trigger_on_key_down && !binding.trigger_on_key_up && !binding.block_key {
            issues.push(issue("binding neither triggers nor blocks".to_string()));
            continue;
        }

        let descriptor = &binding.action;
        if !registry.is_registered(&descriptor.type_id) {
            issues.push(issue(format!("Unknown action type: {}", descriptor.type_id)));
            continue;
        }

        if let Some(action) = registry.create(&descriptor.type_id, &descriptor.parameters) {
            if let Err(e) = action.validate() {
                issues.push(issue(e.to_string()));
            }
        }
    }
    issues
}
