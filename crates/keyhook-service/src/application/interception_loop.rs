//! InterceptionService: the capture loop and its block/forward decision.
//!
//! # State machine
//!
//! ```text
//! Stopped ──start()──► Starting ──context ok──► Running ──stop()──► Stopping ──► Stopped
//!                          │
//!                          └── context failed ──► Stopped (error returned)
//! ```
//!
//! # Run cycle
//!
//! One dedicated thread opens the capture context, owns the
//! [`DriverGateway`] for its whole life, and repeats, while the running flag
//! is set:
//!
//! 1. wait for input with a short timeout (a timeout just loops, which is
//!    where the stop flag is observed)
//! 2. skip devices that are not keyboards
//! 3. receive one stroke, skipping if none is available
//! 4. resolve or create the device record (announcing new devices)
//! 5. build the [`KeyEvent`]
//! 6. read the device-level intercept policy
//! 7. notify key listeners in subscription order, catching panics
//! 8. send the original stroke back iff neither the policy nor a listener
//!    asked to block it
//!
//! Strokes are decided one at a time in arrival order.  A failed send is
//! logged and never retried.
//!
//! # Listeners
//!
//! Listeners run synchronously on the capture thread.  They must return
//! quickly: anything slow (actions) is handed to the executor.  A panicking
//! listener is logged and the loop continues with the next one.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use keyhook_core::{DeviceId, DeviceRecord, KeyEvent, KeyStroke, StateFlags};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::device_registry::DeviceRegistry;
use crate::infrastructure::driver::{
    raise_capture_thread_priority, CaptureDriver, DeviceClass, DriverError, DriverGateway,
    WaitOutcome,
};

/// Listener notified of every key event, with the power to block it.
pub type KeyListener = Arc<dyn Fn(&mut KeyEvent) + Send + Sync>;
/// Listener notified once per newly seen device.
pub type DeviceListener = Arc<dyn Fn(&Arc<DeviceRecord>) + Send + Sync>;

/// Lifecycle state of the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Stopped => "stopped",
            LoopState::Starting => "starting",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Why [`InterceptionService::start`] failed.  The `Display` text is meant
/// for the user.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("interception cannot start while {0}")]
    InvalidState(LoopState),
    #[error(transparent)]
    Context(#[from] DriverError),
    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error("capture thread exited before the context was ready")]
    StartupAborted,
}

/// Timing knobs for the capture loop.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    /// Driver wait timeout; the stop flag is checked at least this often.
    pub wait_timeout: Duration,
    /// How long `stop()` waits for the loop thread before detaching it.
    pub stop_join_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(100),
            stop_join_timeout: Duration::from_millis(1000),
        }
    }
}

/// Counters maintained by the capture thread.
#[derive(Debug, Default)]
struct LoopCounters {
    received: AtomicU64,
    forwarded: AtomicU64,
    blocked: AtomicU64,
    send_failures: AtomicU64,
    listener_faults: AtomicU64,
}

/// Point-in-time copy of the loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: u64,
    pub forwarded: u64,
    pub blocked: u64,
    pub send_failures: u64,
    pub listener_faults: u64,
}

/// Everything the capture thread shares with the service.
struct LoopShared {
    registry: Arc<DeviceRegistry>,
    key_listeners: RwLock<Vec<KeyListener>>,
    device_listeners: RwLock<Vec<DeviceListener>>,
    counters: LoopCounters,
    wait_timeout: Duration,
}

struct LoopWorker {
    handle: JoinHandle<()>,
    /// Stop flag owned by this run alone; a detached thread keeps its own.
    running: Arc<AtomicBool>,
    /// Signalled after the thread has destroyed its context.
    done_rx: mpsc::Receiver<()>,
}

/// Owns the capture thread and its lifecycle.
pub struct InterceptionService {
    driver: Arc<dyn CaptureDriver>,
    settings: CaptureSettings,
    shared: Arc<LoopShared>,
    state: LoopState,
    worker: Option<LoopWorker>,
}

impl InterceptionService {
    pub fn new(driver: Box<dyn CaptureDriver>, registry: Arc<DeviceRegistry>, settings: CaptureSettings) -> Self {
        Self {
            driver: Arc::from(driver),
            settings,
            shared: Arc::new(LoopShared {
                registry,
                key_listeners: RwLock::new(Vec::new()),
                device_listeners: RwLock::new(Vec::new()),
                counters: LoopCounters::default(),
                wait_timeout: settings.wait_timeout,
            }),
            state: LoopState::Stopped,
            worker: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.shared.registry
    }

    /// Appends a key listener.  Listeners run in subscription order.
    pub fn on_key_event<F>(&self, listener: F)
    where
        F: Fn(&mut KeyEvent) + Send + Sync + 'static,
    {
        write_lock(&self.shared.key_listeners).push(Arc::new(listener));
    }

    /// Appends a device-discovered listener.
    pub fn on_device_discovered<F>(&self, listener: F)
    where
        F: Fn(&Arc<DeviceRecord>) + Send + Sync + 'static,
    {
        write_lock(&self.shared.device_listeners).push(Arc::new(listener));
    }

    pub fn stats(&self) -> LoopStats {
        let c = &self.shared.counters;
        LoopStats {
            received: c.received.load(Ordering::Relaxed),
            forwarded: c.forwarded.load(Ordering::Relaxed),
            blocked: c.blocked.load(Ordering::Relaxed),
            send_failures: c.send_failures.load(Ordering::Relaxed),
            listener_faults: c.listener_faults.load(Ordering::Relaxed),
        }
    }

    /// Spawns the capture thread, which opens a capture context and
    /// installs the keyboard filter before the loop starts.  Returns once the
    /// context is ready or has failed.
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] whose `Display` text explains the failure;
    /// the service stays `Stopped` and may be started again later.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != LoopState::Stopped {
            return Err(CaptureError::InvalidState(self.state));
        }
        self.state = LoopState::Starting;
        let running = Arc::new(AtomicBool::new(true));

        let driver = Arc::clone(&self.driver);
        let shared = Arc::clone(&self.shared);
        let thread_running = Arc::clone(&running);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), DriverError>>();
        let (done_tx, done_rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("keyhook-capture".to_string())
            .spawn(move || {
                raise_capture_thread_priority();
                let mut gateway = match driver.create_context() {
                    Ok(gateway) => gateway,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                gateway.set_filter(DeviceClass::Keyboard, StateFlags::FILTER_KEY_ALL);
                let _ = ready_tx.send(Ok(()));

                run_capture_loop(gateway.as_mut(), &shared, &thread_running);
                drop(gateway);
                debug!("capture context destroyed");
                let _ = done_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state = LoopState::Stopped;
                error!("failed to spawn capture thread: {e}");
                return Err(CaptureError::ThreadSpawn(e));
            }
        };

        let failure = match ready_rx.recv() {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(CaptureError::Context(e)),
            Err(_) => Some(CaptureError::StartupAborted),
        };
        if let Some(e) = failure {
            let _ = handle.join();
            self.state = LoopState::Stopped;
            error!("failed to start interception: {e}");
            return Err(e);
        }

        self.worker = Some(LoopWorker { handle, running, done_rx });
        self.state = LoopState::Running;
        info!(
            wait_timeout_ms = self.settings.wait_timeout.as_millis() as u64,
            "interception started"
        );
        Ok(())
    }

    /// Stops the capture thread and waits for it to destroy the context.
    ///
    /// Waits up to the configured join timeout.  If the thread does not
    /// finish in time it is detached; it still destroys the context itself
    /// once its current wait returns.
    pub fn stop(&mut self) {
        if self.state != LoopState::Running {
            return;
        }
        self.state = LoopState::Stopping;

        if let Some(worker) = self.worker.take() {
            worker.running.store(false, Ordering::Release);
            match worker.done_rx.recv_timeout(self.settings.stop_join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        error!("capture thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_ms = self.settings.stop_join_timeout.as_millis() as u64,
                        "capture thread did not stop in time; detaching it"
                    );
                }
            }
        }

        self.state = LoopState::Stopped;
        info!(stats = ?self.stats(), "interception stopped");
    }
}

impl Drop for InterceptionService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Body of the capture thread, run until the running flag is cleared.
fn run_capture_loop(gateway: &mut dyn DriverGateway, shared: &LoopShared, running: &AtomicBool) {
    debug!("capture loop running");
    while running.load(Ordering::Acquire) {
        let device = match gateway.wait_with_timeout(shared.wait_timeout) {
            WaitOutcome::Device(device) => device,
            WaitOutcome::Timeout => continue,
        };

        if !gateway.is_keyboard(device) {
            trace!(device = device.0, "ignoring non-keyboard device");
            continue;
        }

        let Some(stroke) = gateway.receive(device) else {
            continue;
        };

        process_stroke(gateway, shared, device, stroke);
    }
    debug!("capture loop exiting");
}

/// Steps 4 to 8 of the run cycle for one received stroke.
fn process_stroke(gateway: &mut dyn DriverGateway, shared: &LoopShared, device_id: DeviceId, stroke: KeyStroke) {
    let counters = &shared.counters;
    counters.received.fetch_add(1, Ordering::Relaxed);

    let (device, created) = shared
        .registry
        .get_or_create(device_id, || gateway.hardware_id(device_id));
    if created {
        notify_device_listeners(shared, &device);
    }

    let mut event = KeyEvent::new(Arc::clone(&device), stroke);
    let device_blocked = device.is_intercepted();

    notify_key_listeners(shared, &mut event);

    if device_blocked || event.is_handled() {
        counters.blocked.fetch_add(1, Ordering::Relaxed);
        trace!(
            device = device_id.0,
            scan_code = stroke.code,
            device_blocked,
            handled = event.is_handled(),
            "stroke blocked"
        );
        return;
    }

    match gateway.send(device_id, &stroke) {
        Ok(()) => {
            counters.forwarded.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.send_failures.fetch_add(1, Ordering::Relaxed);
            warn!(device = device_id.0, scan_code = stroke.code, "stroke dropped: {e}");
        }
    }
}

fn notify_key_listeners(shared: &LoopShared, event: &mut KeyEvent) {
    let listeners: Vec<KeyListener> = read_lock(&shared.key_listeners).clone();
    for (index, listener) in listeners.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            shared.counters.listener_faults.fetch_add(1, Ordering::Relaxed);
            warn!(listener = index, scan_code = event.scan_code(), "key listener panicked");
        }
    }
}

fn notify_device_listeners(shared: &LoopShared, device: &Arc<DeviceRecord>) {
    let listeners: Vec<DeviceListener> = read_lock(&shared.device_listeners).clone();
    for (index, listener) in listeners.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener(device))).is_err() {
            shared.counters.listener_faults.fetch_add(1, Ordering::Relaxed);
            warn!(listener = index, device = %device, "device listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::driver::mock::MockDriver;
    use std::sync::Mutex;
    use std::time::Instant;

    const FAST: CaptureSettings = CaptureSettings {
        wait_timeout: Duration::from_millis(5),
        stop_join_timeout: Duration::from_millis(1000),
    };

    fn service(driver: &MockDriver) -> InterceptionService {
        InterceptionService::new(Box::new(driver.clone()), Arc::new(DeviceRegistry::new()), FAST)
    }

    fn wait_for_drain(driver: &MockDriver) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !driver.script_drained() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        // One more cycle so the last stroke is fully decided.
        thread::sleep(Duration::from_millis(30));
    }

    fn down(code: u16) -> KeyStroke {
        KeyStroke::new(code, StateFlags::KEY_DOWN)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[test]
    fn test_start_installs_keyboard_filter_for_all_edges() {
        // Arrange
        let driver = MockDriver::new();
        let mut svc = service(&driver);

        // Act
        svc.start().expect("start");
        svc.stop();

        // Assert
        assert_eq!(
            driver.filters(),
            vec![(DeviceClass::Keyboard, StateFlags::FILTER_KEY_ALL)]
        );
    }

    #[test]
    fn test_start_failure_reports_cause_and_stays_stopped() {
        let driver = MockDriver::failing_with(|| DriverError::ServiceDisabled);
        let mut svc = service(&driver);

        let err = svc.start().expect_err("must fail");

        assert!(err.to_string().contains("service is disabled"));
        assert_eq!(svc.state(), LoopState::Stopped);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let driver = MockDriver::new();
        let mut svc = service(&driver);
        svc.start().expect("start");

        let second = svc.start();

        assert!(matches!(second, Err(CaptureError::InvalidState(LoopState::Running))));
        svc.stop();
    }

    #[test]
    fn test_stop_with_no_device_is_bounded_and_releases_context() {
        // Arrange
        let driver = MockDriver::new();
        let mut svc = service(&driver);
        svc.start().expect("start");

        // Act
        let started = Instant::now();
        svc.stop();
        let elapsed = started.elapsed();

        // Assert
        assert!(elapsed < FAST.stop_join_timeout, "stop took {elapsed:?}");
        assert_eq!(svc.state(), LoopState::Stopped);
        assert_eq!(driver.contexts_destroyed(), 1);
    }

    #[test]
    fn test_service_can_restart_after_stop() {
        let driver = MockDriver::new();
        let mut svc = service(&driver);
        svc.start().expect("first start");
        svc.stop();

        svc.start().expect("second start");
        svc.stop();

        assert_eq!(driver.contexts_created(), 2);
        assert_eq!(driver.contexts_destroyed(), 2);
    }

    #[test]
    fn test_restart_after_detached_stop_leaves_one_loop_running() {
        // Arrange: each idle wait outlasts the stop timeout, so stop detaches
        let driver = MockDriver::new().with_idle_wait(Duration::from_millis(200));
        let settings = CaptureSettings {
            wait_timeout: Duration::from_millis(5),
            stop_join_timeout: Duration::from_millis(20),
        };
        let mut svc =
            InterceptionService::new(Box::new(driver.clone()), Arc::new(DeviceRegistry::new()), settings);
        svc.start().expect("first start");
        svc.stop();
        assert_eq!(svc.state(), LoopState::Stopped);

        // Act
        svc.start().expect("second start");
        thread::sleep(Duration::from_millis(700));
        let old_waits = driver.waits_on_context(0);
        let new_waits = driver.waits_on_context(1);
        svc.stop();
        thread::sleep(Duration::from_millis(300));

        // Assert: the detached loop finished its one wait and exited
        assert_eq!(old_waits, 1);
        assert!(new_waits >= 2, "new loop waited {new_waits} times");
        assert_eq!(driver.contexts_destroyed(), 2);
    }

    // ── Forward decision ──────────────────────────────────────────────────────

    #[test]
    fn test_unhandled_stroke_is_forwarded_exactly_once() {
        // Arrange
        let driver = MockDriver::new().with_hardware_id(DeviceId(1), "HID\\A");
        driver.push_stroke(DeviceId(1), down(0x1E));
        let mut svc = service(&driver);

        // Act
        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        // Assert
        assert_eq!(driver.sent(), vec![(DeviceId(1), down(0x1E))]);
        assert_eq!(svc.stats().forwarded, 1);
    }

    #[test]
    fn test_handled_stroke_is_not_forwarded() {
        let driver = MockDriver::new();
        driver.push_stroke(DeviceId(1), down(0x3B));
        let mut svc = service(&driver);
        svc.on_key_event(|event| event.set_handled());

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        assert!(driver.sent().is_empty());
        assert_eq!(svc.stats().blocked, 1);
    }

    #[test]
    fn test_intercepted_device_is_blocked_even_if_unhandled() {
        let driver = MockDriver::new().with_hardware_id(DeviceId(2), "HID\\PAD");
        driver.push_stroke(DeviceId(2), down(0x1E));
        let registry = Arc::new(DeviceRegistry::new());
        registry.configure_device("HID\\PAD", None, true);
        let mut svc = InterceptionService::new(Box::new(driver.clone()), registry, FAST);

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        assert!(driver.sent().is_empty());
    }

    #[test]
    fn test_non_keyboard_and_empty_waits_are_skipped() {
        let driver = MockDriver::new();
        driver.push_empty_wait(DeviceId(11));
        driver.push_empty_wait(DeviceId(1));
        driver.push_stroke(DeviceId(1), down(0x10));
        let mut svc = service(&driver);

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        assert_eq!(driver.sent(), vec![(DeviceId(1), down(0x10))]);
        assert_eq!(svc.stats().received, 1);
    }

    #[test]
    fn test_send_failure_is_counted_not_retried() {
        let driver = MockDriver::new();
        driver.fail_sends();
        driver.push_stroke(DeviceId(1), down(0x1E));
        let mut svc = service(&driver);

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        let stats = svc.stats();
        assert_eq!(stats.send_failures, 1);
        assert_eq!(stats.forwarded, 0);
        assert!(svc.stats().received == 1);
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    #[test]
    fn test_panicking_listener_does_not_stop_loop_or_later_listeners() {
        // Arrange
        let driver = MockDriver::new();
        driver.push_stroke(DeviceId(1), down(0x1E));
        driver.push_stroke(DeviceId(1), down(0x30));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut svc = service(&driver);
        svc.on_key_event(|_| panic!("listener bug"));
        {
            let seen = Arc::clone(&seen);
            svc.on_key_event(move |event| seen.lock().unwrap().push(event.scan_code()));
        }

        // Act
        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![0x1E, 0x30]);
        assert_eq!(svc.stats().listener_faults, 2);
        assert_eq!(driver.sent().len(), 2);
    }

    #[test]
    fn test_listeners_run_in_subscription_order() {
        let driver = MockDriver::new();
        driver.push_stroke(DeviceId(1), down(0x1E));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut svc = service(&driver);
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            svc.on_key_event(move |_| order.lock().unwrap().push(tag));
        }

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_device_discovered_fires_once_per_device() {
        let driver = MockDriver::new()
            .with_hardware_id(DeviceId(1), "HID\\A")
            .with_hardware_id(DeviceId(2), "HID\\B");
        for (device, code) in [(1, 0x1E), (1, 0x1E), (2, 0x30), (1, 0x30)] {
            driver.push_stroke(DeviceId(device), down(code));
        }
        let discovered = Arc::new(Mutex::new(Vec::new()));
        let mut svc = service(&driver);
        {
            let discovered = Arc::clone(&discovered);
            svc.on_device_discovered(move |d| discovered.lock().unwrap().push(d.id()));
        }

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        assert_eq!(*discovered.lock().unwrap(), vec![DeviceId(1), DeviceId(2)]);
        assert_eq!(driver.hardware_id_queries(DeviceId(1)), 1);
    }

    #[test]
    fn test_strokes_are_decided_in_arrival_order() {
        let driver = MockDriver::new();
        let codes: Vec<u16> = (0x10..0x20).collect();
        for &code in &codes {
            driver.push_stroke(DeviceId(1), down(code));
        }
        let mut svc = service(&driver);

        svc.start().expect("start");
        wait_for_drain(&driver);
        svc.stop();

        let sent: Vec<u16> = driver.sent().iter().map(|(_, s)| s.code).collect();
        assert_eq!(sent, codes);
    }
}
