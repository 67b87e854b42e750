//! DeviceRegistry: lazily created, session-scoped keyboard records.
//!
//! The capture loop calls [`DeviceRegistry::get_or_create`] for every stroke.
//! The first call for a driver id resolves the hardware id (a driver call,
//! made outside the lock) and builds the record; later calls return the same
//! `Arc`.  The configuration path writes the intercept policy and friendly
//! names concurrently.
//!
//! # Locking
//!
//! One mutex guards both the record map and the intercepted-hardware-id set.
//! Every critical section is a map lookup or a short loop over at most ten
//! keyboards, so the capture loop never waits long enough to miss its
//! polling cadence.  Hardware ids compare case-insensitively.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use keyhook_core::{DeviceId, DeviceRecord};
use tracing::{debug, info};

use crate::infrastructure::storage::config::DeviceEntry;

#[derive(Debug, Default)]
struct RegistryState {
    devices: HashMap<DeviceId, Arc<DeviceRecord>>,
    /// Lower-cased hardware ids whose keys never reach the OS.
    intercepted: HashSet<String>,
    /// Lower-cased hardware id to configured display name.
    friendly_names: HashMap<String, String>,
}

/// Registry of every keyboard seen during this capture session.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

fn normalise(hardware_id: &str) -> String {
    hardware_id.to_ascii_lowercase()
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the policy and names of configured devices.
    pub fn with_devices(devices: &[DeviceEntry]) -> Self {
        let registry = Self::new();
        for entry in devices {
            registry.configure_device(&entry.hardware_id, Some(&entry.friendly_name), entry.intercepted);
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A poisoned lock only means a panic elsewhere; the maps are still
        // consistent because every write is a single insert or flag store.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seeds the policy and name for a configured device before it is seen.
    pub fn configure_device(&self, hardware_id: &str, friendly_name: Option<&str>, intercepted: bool) {
        let key = normalise(hardware_id);
        let mut state = self.lock();
        if let Some(name) = friendly_name.filter(|n| !n.is_empty()) {
            state.friendly_names.insert(key.clone(), name.to_string());
        }
        if intercepted {
            state.intercepted.insert(key);
        } else {
            state.intercepted.remove(&key);
        }
    }

    /// Returns the record for `id`, creating it on first sight.
    ///
    /// `resolve_hardware_id` is called at most once per id and never while
    /// the lock is held.  The boolean is `true` only for the call that
    /// created the record, so callers can announce each device exactly once.
    pub fn get_or_create<F>(&self, id: DeviceId, resolve_hardware_id: F) -> (Arc<DeviceRecord>, bool)
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(existing) = self.lock().devices.get(&id) {
            existing.touch();
            return (Arc::clone(existing), false);
        }

        let hardware_id = resolve_hardware_id();

        let mut state = self.lock();
        if let Some(existing) = state.devices.get(&id) {
            existing.touch();
            return (Arc::clone(existing), false);
        }

        let key = hardware_id.as_deref().map(normalise);
        let intercepted = key
            .as_ref()
            .map(|k| state.intercepted.contains(k))
            .unwrap_or(false);
        let friendly_name = key
            .as_ref()
            .and_then(|k| state.friendly_names.get(k).cloned())
            .unwrap_or_else(|| format!("Keyboard {}", id.0));

        let record = Arc::new(DeviceRecord::new(id, hardware_id, friendly_name, intercepted));
        state.devices.insert(id, Arc::clone(&record));
        drop(state);

        info!(
            device = id.0,
            hardware_id = record.hardware_id().unwrap_or("<none>"),
            intercepted,
            "keyboard discovered"
        );
        (record, true)
    }

    /// Looks up an already-seen device.
    pub fn get(&self, id: DeviceId) -> Option<Arc<DeviceRecord>> {
        self.lock().devices.get(&id).cloned()
    }

    /// Changes the intercept policy for a hardware id and every record that
    /// shares it.
    pub fn set_intercepted(&self, hardware_id: &str, intercepted: bool) {
        let key = normalise(hardware_id);
        let mut state = self.lock();
        if intercepted {
            state.intercepted.insert(key.clone());
        } else {
            state.intercepted.remove(&key);
        }
        let mut updated = 0;
        for record in state.devices.values() {
            if record.hardware_id().map(normalise).as_deref() == Some(key.as_str()) {
                record.set_intercepted(intercepted);
                updated += 1;
            }
        }
        debug!(hardware_id, intercepted, updated, "intercept policy changed");
    }

    /// `true` when the hardware id is in the intercepted set.
    pub fn is_intercepted(&self, hardware_id: &str) -> bool {
        self.lock().intercepted.contains(&normalise(hardware_id))
    }

    /// Renames a hardware id and every record that shares it.
    pub fn set_friendly_name(&self, hardware_id: &str, name: &str) {
        let key = normalise(hardware_id);
        let mut state = self.lock();
        state.friendly_names.insert(key.clone(), name.to_string());
        for record in state.devices.values() {
            if record.hardware_id().map(normalise).as_deref() == Some(key.as_str()) {
                record.set_friendly_name(name);
            }
        }
    }

    /// Snapshot of every device seen this session, ordered by id.
    pub fn devices(&self) -> Vec<Arc<DeviceRecord>> {
        let mut devices: Vec<_> = self.lock().devices.values().cloned().collect();
        devices.sort_by_key(|d| d.id());
        devices
    }

    /// Forgets all session records; configured policy and names survive.
    pub fn clear_session(&self) {
        self.lock().devices.clear();
    }
}
