//! Synthetic auto-repeat emulation
//!
//! When a long press resolves to default behavior the original down was
//! already suppressed, so the rest of the system would see a silent held key.
//! The injector replays the hold as a conventional auto-repeating key:
//! repeat 0 goes out the moment the repeating phase begins, each subsequent
//! hardware repeat is re-synthesized with an incrementing count (cadence is
//! inherited from the platform's own repeat timing), and release emits one
//! final up.

use crate::key::{FLAG_INJECTED, KeyCode};
use crate::ports::InjectPort;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RepeatInjector {
    inject: Arc<dyn InjectPort>,
}

impl RepeatInjector {
    pub fn new(inject: Arc<dyn InjectPort>) -> Self {
        Self { inject }
    }

    /// The long-press window closed with no binding: replay the held key
    /// immediately at repeat 0
    pub fn begin(&self, code: KeyCode, policy_flags: u32) {
        debug!(key = %code, "repeat: begin default hold emulation");
        self.emit(code, true, 0, policy_flags);
    }

    /// A hardware auto-repeat arrived while emulating; mirror it
    pub fn on_hardware_repeat(&self, code: KeyCode, repeat: u32, policy_flags: u32) {
        self.emit(code, true, repeat, policy_flags);
    }

    /// The key came back up; close the synthetic hold
    pub fn finish(&self, code: KeyCode, policy_flags: u32) {
        debug!(key = %code, "repeat: release");
        self.emit(code, false, 0, policy_flags);
    }

    /// Injection failures must never take input handling down; log and move on
    fn emit(&self, code: KeyCode, down: bool, repeat: u32, policy_flags: u32) {
        if let Err(err) = self
            .inject
            .inject_key(code, down, repeat, policy_flags | FLAG_INJECTED)
        {
            warn!(key = %code, down, repeat, "repeat injection failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::{CallLog, MockInject};
    use assert2::assert;

    const POWER: KeyCode = KeyCode::new(116);

    fn injector() -> (RepeatInjector, CallLog) {
        let log = CallLog::new();
        let injector = RepeatInjector::new(Arc::new(MockInject::new(log.clone())));
        (injector, log)
    }

    #[test]
    fn test_emulated_hold_sequence() {
        let (injector, log) = injector();

        injector.begin(POWER, 0);
        injector.on_hardware_repeat(POWER, 1, 0);
        injector.on_hardware_repeat(POWER, 2, 0);
        injector.finish(POWER, 0);

        assert!(
            log.injections()
                == vec![
                    (POWER, true, 0),
                    (POWER, true, 1),
                    (POWER, true, 2),
                    (POWER, false, 0),
                ]
        );
    }

    #[test]
    fn test_injected_marker_always_set() {
        let (injector, log) = injector();
        injector.begin(POWER, 0);

        let marked = log.calls().iter().all(|c| {
            matches!(
                c,
                crate::ports::mock::PortCall::Inject {
                    injected_flag: true,
                    ..
                }
            )
        });
        assert!(marked);
    }

    #[test]
    fn test_injection_failure_is_swallowed() {
        let log = CallLog::new();
        let mock = Arc::new(MockInject::new(log.clone()));
        mock.fail_injections();
        let injector = RepeatInjector::new(mock);

        // Must not panic
        injector.begin(POWER, 0);
        injector.finish(POWER, 0);
        log.assert_no_calls();
    }
}
