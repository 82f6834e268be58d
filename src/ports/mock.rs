//! Recording port implementations for tests
//!
//! These mocks record calls instead of executing them, preventing tests from
//! injecting real input events or running real actions. Each recorder exposes
//! assertion helpers over the call log.

use super::{ActionDispatchPort, ConfigPort, DeviceQueryPort, InjectPort, PowerPort, Timeout};
use crate::key::{ComboKey, KeyCode};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded port call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    Inject {
        code: KeyCode,
        down: bool,
        repeat: u32,
        injected_flag: bool,
    },
    Perform(String),
    WakeDevice,
    WakeHold(Duration),
}

/// Shared call log with assertion helpers
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<PortCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PortCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn record(&self, call: PortCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Assert that the action was performed exactly once
    pub fn assert_performed_once(&self, action_id: &str) {
        let count = self
            .calls()
            .iter()
            .filter(|c| matches!(c, PortCall::Perform(id) if id == action_id))
            .count();
        assert!(
            count == 1,
            "expected exactly one dispatch of {:?} but saw {} in {:?}",
            action_id,
            count,
            self.calls()
        );
    }

    /// Assert that no action was ever dispatched
    pub fn assert_nothing_performed(&self) {
        let calls = self.calls();
        assert!(
            !calls.iter().any(|c| matches!(c, PortCall::Perform(_))),
            "expected no dispatched actions but got: {calls:?}"
        );
    }

    /// Assert that no calls at all were recorded
    pub fn assert_no_calls(&self) {
        let calls = self.calls();
        assert!(calls.is_empty(), "expected no calls but got: {calls:?}");
    }

    /// Injected key transitions, in order, as (code, down, repeat)
    pub fn injections(&self) -> Vec<(KeyCode, bool, u32)> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                PortCall::Inject {
                    code, down, repeat, ..
                } => Some((*code, *down, *repeat)),
                _ => None,
            })
            .collect()
    }

    pub fn assert_woke_device(&self) {
        assert!(
            self.calls().contains(&PortCall::WakeDevice),
            "expected a wake_device call in {:?}",
            self.calls()
        );
    }
}

/// Mock injector writing to the shared call log
pub struct MockInject {
    log: CallLog,
    fail: AtomicBool,
}

impl MockInject {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent injection fail, for port-failure tests
    pub fn fail_injections(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl InjectPort for MockInject {
    fn inject_key(&self, code: KeyCode, down: bool, repeat: u32, policy_flags: u32) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("injection unavailable"));
        }
        self.log.record(PortCall::Inject {
            code,
            down,
            repeat,
            injected_flag: policy_flags & crate::key::FLAG_INJECTED != 0,
        });
        Ok(())
    }
}

/// Mock dispatcher writing to the shared call log
pub struct MockDispatch {
    log: CallLog,
}

impl MockDispatch {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ActionDispatchPort for MockDispatch {
    async fn perform(&self, action_id: &str) -> Result<()> {
        self.log.record(PortCall::Perform(action_id.to_string()));
        Ok(())
    }
}

/// Mock power port writing to the shared call log
pub struct MockPower {
    log: CallLog,
    device: Option<Arc<MockDevice>>,
}

impl MockPower {
    pub fn new(log: CallLog) -> Self {
        Self { log, device: None }
    }

    /// Like the real power source, waking flips the linked device's screen
    /// state on
    pub fn waking(log: CallLog, device: Arc<MockDevice>) -> Self {
        Self {
            log,
            device: Some(device),
        }
    }
}

impl PowerPort for MockPower {
    fn wake_device(&self) {
        self.log.record(PortCall::WakeDevice);
        if let Some(device) = &self.device {
            device.set_screen_on(true);
        }
    }

    fn acquire_brief_wake_hold(&self, duration: Duration) {
        self.log.record(PortCall::WakeHold(duration));
    }
}

/// Settable device state for tests
pub struct MockDevice {
    screen_on: AtomicBool,
    keyguard: AtomicBool,
    app: Mutex<Option<String>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            screen_on: AtomicBool::new(true),
            keyguard: AtomicBool::new(false),
            app: Mutex::new(None),
        }
    }

    pub fn set_screen_on(&self, on: bool) {
        self.screen_on.store(on, Ordering::SeqCst);
    }

    pub fn set_keyguard(&self, showing: bool) {
        self.keyguard.store(showing, Ordering::SeqCst);
    }

    pub fn set_foreground_app(&self, app: Option<&str>) {
        *self.app.lock().unwrap() = app.map(str::to_string);
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceQueryPort for MockDevice {
    fn is_keyguard_showing(&self) -> bool {
        self.keyguard.load(Ordering::SeqCst)
    }

    fn foreground_app_id(&self) -> Option<String> {
        self.app.lock().unwrap().clone()
    }

    fn is_screen_on(&self) -> bool {
        self.screen_on.load(Ordering::SeqCst)
    }
}

/// Map-backed binding store for tests
pub struct MapConfig {
    slots: Mutex<HashMap<(ComboKey, String), Vec<Option<String>>>>,
    timeouts: Mutex<HashMap<Timeout, u64>>,
    extended: AtomicBool,
}

impl MapConfig {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
            extended: AtomicBool::new(true),
        }
    }

    pub fn set_extended(&self, extended: bool) {
        self.extended.store(extended, Ordering::SeqCst);
    }

    pub fn set_timeout(&self, name: Timeout, ms: u64) {
        self.timeouts.lock().unwrap().insert(name, ms);
    }

    /// Install a slot list for a combo under a condition. Slot order:
    /// click, tap, press, double-press, triple-tap, triple-press.
    pub fn bind(&self, combo: ComboKey, condition: &str, slots: &[Option<&str>]) {
        self.slots.lock().unwrap().insert(
            (combo, condition.to_string()),
            slots.iter().map(|s| s.map(str::to_string)).collect(),
        );
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPort for MapConfig {
    fn action_slots(&self, combo: &ComboKey, condition: &str) -> Option<Vec<Option<String>>> {
        self.slots
            .lock()
            .unwrap()
            .get(&(*combo, condition.to_string()))
            .cloned()
    }

    fn timeout_ms(&self, name: Timeout) -> Option<u64> {
        self.timeouts.lock().unwrap().get(&name).copied()
    }

    fn extended_mode(&self) -> bool {
        self.extended.load(Ordering::SeqCst)
    }
}
