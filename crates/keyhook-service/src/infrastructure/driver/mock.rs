//! Mock capture driver for unit and integration testing.
//!
//! Tests script the sequence of waits the loop will observe and inspect
//! everything the loop sent back, without the kernel driver installed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyhook_core::{DeviceId, KeyStroke};

use super::{CaptureDriver, DeviceClass, DriverError, DriverGateway, WaitOutcome};

/// One scripted driver event.
#[derive(Debug, Clone)]
enum Scripted {
    /// A stroke is pending on a device.
    Stroke(DeviceId, KeyStroke),
    /// The device signals input but has nothing to receive.
    Empty(DeviceId),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<Scripted>,
    pending: HashMap<DeviceId, KeyStroke>,
    hardware_ids: HashMap<DeviceId, String>,
    hardware_id_queries: HashMap<DeviceId, usize>,
    filters: Vec<(DeviceClass, u16)>,
    sent: Vec<(DeviceId, KeyStroke)>,
    fail_sends: bool,
    fail_create: Option<fn() -> DriverError>,
    /// Overrides the caller's timeout for waits with an empty script.
    idle_wait: Option<Duration>,
    /// Wait calls per context, indexed by creation order.
    waits: Vec<usize>,
    contexts_created: usize,
    contexts_destroyed: usize,
}

/// Scriptable [`CaptureDriver`] whose gateways share one recorded state.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `create_context` call fail with the error built by `make`.
    pub fn failing_with(make: fn() -> DriverError) -> Self {
        let driver = Self::new();
        driver.lock().fail_create = Some(make);
        driver
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock driver lock poisoned")
    }

    /// Registers the hardware id reported for `device`.
    pub fn with_hardware_id(self, device: DeviceId, hardware_id: &str) -> Self {
        self.lock().hardware_ids.insert(device, hardware_id.to_string());
        self
    }

    /// Queues a stroke to be delivered by a future wait/receive pair.
    pub fn push_stroke(&self, device: DeviceId, stroke: KeyStroke) {
        self.lock().script.push_back(Scripted::Stroke(device, stroke));
    }

    /// Queues a wait that reports `device` but yields nothing on receive.
    pub fn push_empty_wait(&self, device: DeviceId) {
        self.lock().script.push_back(Scripted::Empty(device));
    }

    /// Makes every idle wait block for `duration`, like a driver that
    /// ignores short timeouts.
    pub fn with_idle_wait(self, duration: Duration) -> Self {
        self.lock().idle_wait = Some(duration);
        self
    }

    /// Number of waits issued by the `index`-th context created.
    pub fn waits_on_context(&self, index: usize) -> usize {
        self.lock().waits.get(index).copied().unwrap_or(0)
    }

    /// Makes every subsequent send fail.
    pub fn fail_sends(&self) {
        self.lock().fail_sends = true;
    }

    /// Strokes the gateway sent back, in order.
    pub fn sent(&self) -> Vec<(DeviceId, KeyStroke)> {
        self.lock().sent.clone()
    }

    /// Filters installed on any context, in order.
    pub fn filters(&self) -> Vec<(DeviceClass, u16)> {
        self.lock().filters.clone()
    }

    /// `true` once the script has been fully consumed.
    pub fn script_drained(&self) -> bool {
        self.lock().script.is_empty()
    }

    pub fn hardware_id_queries(&self, device: DeviceId) -> usize {
        self.lock().hardware_id_queries.get(&device).copied().unwrap_or(0)
    }

    pub fn contexts_created(&self) -> usize {
        self.lock().contexts_created
    }

    pub fn contexts_destroyed(&self) -> usize {
        self.lock().contexts_destroyed
    }
}

impl CaptureDriver for MockDriver {
    fn create_context(&self) -> Result<Box<dyn DriverGateway>, DriverError> {
        let mut state = self.lock();
        if let Some(make) = state.fail_create {
            return Err(make());
        }
        let index = state.contexts_created;
        state.contexts_created += 1;
        state.waits.push(0);
        Ok(Box::new(MockGateway {
            state: Arc::clone(&self.state),
            index,
        }))
    }
}

/// Gateway handed out by [`MockDriver`]; records its own destruction.
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
    index: usize,
}

impl MockGateway {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock driver lock poisoned")
    }
}

impl DriverGateway for MockGateway {
    fn set_filter(&mut self, class: DeviceClass, mask: u16) {
        self.lock().filters.push((class, mask));
    }

    fn wait_with_timeout(&mut self, timeout: Duration) -> WaitOutcome {
        let (next, idle_wait) = {
            let mut state = self.lock();
            state.waits[self.index] += 1;
            (state.script.pop_front(), state.idle_wait)
        };
        match next {
            Some(Scripted::Stroke(device, stroke)) => {
                self.lock().pending.insert(device, stroke);
                WaitOutcome::Device(device)
            }
            Some(Scripted::Empty(device)) => WaitOutcome::Device(device),
            None => {
                std::thread::sleep(idle_wait.unwrap_or(timeout));
                WaitOutcome::Timeout
            }
        }
    }

    fn is_keyboard(&self, device: DeviceId) -> bool {
        device.is_keyboard()
    }

    fn receive(&mut self, device: DeviceId) -> Option<KeyStroke> {
        self.lock().pending.remove(&device)
    }

    fn send(&mut self, device: DeviceId, stroke: &KeyStroke) -> Result<(), DriverError> {
        let mut state = self.lock();
        if state.fail_sends {
            return Err(DriverError::SendFailed { device });
        }
        state.sent.push((device, *stroke));
        Ok(())
    }

    fn hardware_id(&mut self, device: DeviceId) -> Option<String> {
        let mut state = self.lock();
        *state.hardware_id_queries.entry(device).or_insert(0) += 1;
        state.hardware_ids.get(&device).cloned()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.contexts_destroyed += 1;
        }
    }
}
