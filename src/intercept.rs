//! The two hook entry points of the resolution pipeline
//!
//! Every raw key transition makes first contact at [`Interceptor::before_queueing`],
//! which decides whether the event proceeds at all: synthetic events pass
//! straight through, stray events are handed back to default handling, and
//! tracked events are provisionally suppressed. Suppressed-but-tracked events
//! then reach [`Interceptor::before_dispatching`], which performs the timing
//! waits, fires the resolved action (or replays the originals), and owns the
//! final suppress/forward decision.
//!
//! Both entries are idempotent with respect to injected events and may run
//! concurrently; all cross-call state lives in the shared [`GestureEngine`].

use crate::engine::repeat::RepeatInjector;
use crate::engine::{GestureEngine, Phase, Registration};
use crate::key::{ComboKey, FLAG_INJECTED, KeyEvent};
use crate::ports::{ActionDispatchPort, DeviceQueryPort, InjectPort, PowerPort};
use crate::table::{ActionTable, Resolved};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// How long the device is kept awake while a screen-off gesture resolves
const WAKE_HOLD: Duration = Duration::from_millis(3000);

/// First-contact decision for a raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueVerdict {
    /// Deliver the raw event unmodified; the engine wants nothing from it
    Forward,
    /// The event was folded into engine state and ends here
    Swallow,
    /// Provisionally suppressed; the dispatching entry resolves it
    Continue,
}

/// Final decision of the dispatching entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Default behavior was restored (via synthetic replay)
    Forwarded,
    /// The underlying event was swallowed
    Suppressed,
}

/// Orchestrates the gesture engine, action table and capability ports behind
/// the two hook entry points. Cheap to clone; all parts are shared.
#[derive(Clone)]
pub struct Interceptor {
    engine: Arc<GestureEngine>,
    table: Arc<ActionTable>,
    inject: Arc<dyn InjectPort>,
    power: Arc<dyn PowerPort>,
    device: Arc<dyn DeviceQueryPort>,
    dispatch: Arc<dyn ActionDispatchPort>,
    repeat: Arc<RepeatInjector>,
}

impl Interceptor {
    pub fn new(
        engine: Arc<GestureEngine>,
        table: Arc<ActionTable>,
        inject: Arc<dyn InjectPort>,
        power: Arc<dyn PowerPort>,
        device: Arc<dyn DeviceQueryPort>,
        dispatch: Arc<dyn ActionDispatchPort>,
    ) -> Self {
        let repeat = Arc::new(RepeatInjector::new(inject.clone()));
        Self {
            engine,
            table,
            inject,
            power,
            device,
            dispatch,
            repeat,
        }
    }

    /// Queueing entry: first contact with a raw key transition. Never blocks.
    pub fn before_queueing(&self, event: &KeyEvent) -> QueueVerdict {
        // Our own synthetic events must never re-enter resolution; they pass
        // through with the marker stripped at emission
        if event.injected() {
            trace!(key = %event.code, "injected event, passing through");
            return QueueVerdict::Forward;
        }

        let now = Instant::now();
        // A new key can supersede an emulated hold; remember who to close out
        let repeating_primary = match self.engine.phase() {
            Phase::Repeating => self.engine.current_episode().map(|(combo, _)| combo.primary),
            _ => None,
        };
        let registration = self
            .engine
            .register_key(event.code, event.down, event.policy_flags, now);

        match registration {
            Registration::Stray => QueueVerdict::Forward,
            Registration::AutoRepeat => {
                // While emulating a default hold, mirror the hardware cadence
                if self.engine.phase() == Phase::Repeating {
                    self.repeat.on_hardware_repeat(
                        event.code,
                        self.engine.repeat_count(event.code),
                        event.policy_flags,
                    );
                }
                QueueVerdict::Swallow
            }
            Registration::NewGesture | Registration::ComboStarted => {
                if let Some(primary) = repeating_primary {
                    // The synthetic stream still shows the key held; end the
                    // emulated hold before the superseding gesture resolves
                    self.repeat.finish(primary, event.policy_flags);
                }
                self.start_episode(event, registration, now)
            }
            Registration::Tracked => QueueVerdict::Continue,
        }
    }

    /// A new episode (or a combo supersession) begins: wake the device if
    /// needed and attach a freshly resolved binding.
    fn start_episode(
        &self,
        event: &KeyEvent,
        registration: Registration,
        now: Instant,
    ) -> QueueVerdict {
        // Capture the condition before any wake nudge: waking flips the
        // screen state on, and a gesture that started in the dark must keep
        // resolving against the "off" table
        let screen_on = self.device.is_screen_on();
        let condition = self.table.condition(self.device.as_ref(), screen_on);
        if !screen_on {
            // A held key must not be lost to a slow wake path; nudge the
            // device before any timing window starts
            debug!(key = %event.code, "gesture started with screen off, waking device");
            self.power.wake_device();
            self.power.acquire_brief_wake_hold(WAKE_HOLD);
        }
        let Some((combo, mut episode)) = self.engine.current_episode() else {
            return QueueVerdict::Forward;
        };

        let mut binding = self.table.resolve(&combo, screen_on, &condition);
        if binding.is_empty()
            && registration == Registration::ComboStarted
            && let Some((fresh_combo, fresh)) = self.engine.demote_secondary(episode, now)
        {
            // Unconfigured combination: fall back to single-key handling for
            // the new key instead of silently eating it
            binding = self.table.resolve(&fresh_combo, screen_on, &condition);
            episode = fresh;
        }

        if binding.is_empty() {
            // Pure default passthrough; no gesture to time
            self.engine.complete(episode);
            return QueueVerdict::Forward;
        }

        self.engine
            .set_binding(episode, binding, screen_on, Some(condition));
        QueueVerdict::Continue
    }

    /// Dispatching entry: second contact. Performs the timing-window waits
    /// and owns the final suppress/forward decision for the event.
    pub async fn before_dispatching(&self, event: KeyEvent) -> DispatchOutcome {
        if event.injected() {
            return DispatchOutcome::Forwarded;
        }
        if event.down {
            self.dispatch_down(event).await
        } else {
            self.dispatch_up(event).await
        }
    }

    /// A tracked down-stroke: wait out the long-press window. If the key is
    /// released early the matching up owns resolution.
    async fn dispatch_down(&self, event: KeyEvent) -> DispatchOutcome {
        let Some((combo, episode)) = self.engine.current_episode() else {
            return DispatchOutcome::Suppressed;
        };
        let Some(binding) = self.engine.binding(episode) else {
            return DispatchOutcome::Suppressed;
        };

        let expired = self
            .engine
            .wait_while_held(binding.long_press_timeout, episode)
            .await;
        if !expired {
            return DispatchOutcome::Suppressed;
        }

        // Still held after the full window: this is a long press. The state
        // transition guards below make resolution fire at most once even if
        // two waiters raced on the same episode.
        let prior_taps = self.engine.tap_count();
        match binding.press_action(prior_taps) {
            Resolved::Action(id) => {
                if self.engine.mark_invoked(episode) {
                    self.perform(id);
                }
            }
            Resolved::Disabled => {
                debug!(combo = %combo, "long press disabled, swallowing");
                self.engine.mark_invoked(episode);
            }
            Resolved::Default => {
                if self.engine.begin_repeating(episode) {
                    self.repeat.begin(combo.primary, event.policy_flags);
                }
            }
        }
        DispatchOutcome::Suppressed
    }

    /// A tracked release: close a repeating hold, or resolve the tap count
    /// once the multi-tap window shuts.
    async fn dispatch_up(&self, event: KeyEvent) -> DispatchOutcome {
        match self.engine.phase() {
            Phase::Repeating => {
                if self.engine.all_released() {
                    self.repeat.finish(event.code, event.policy_flags);
                    self.engine.finish_repeating();
                }
                DispatchOutcome::Suppressed
            }
            Phase::Ongoing => self.resolve_click(event).await,
            // Invoked gestures swallow everything until release; canceled and
            // pending episodes have nothing left to decide
            _ => DispatchOutcome::Suppressed,
        }
    }

    async fn resolve_click(&self, event: KeyEvent) -> DispatchOutcome {
        let Some((combo, episode)) = self.engine.current_episode() else {
            return DispatchOutcome::Suppressed;
        };
        if !self.engine.all_released() {
            // First release of a combo; the final release resolves
            return DispatchOutcome::Suppressed;
        }
        let Some(binding) = self.engine.binding(episode) else {
            self.engine.complete(episode);
            return DispatchOutcome::Suppressed;
        };

        let taps = self.engine.tap_count();
        if binding.wants_more_taps(taps) {
            let expired = self
                .engine
                .wait_for_tap_window(binding.double_tap_timeout, episode)
                .await;
            if !expired {
                // Another press continued the gesture; its own events resolve
                return DispatchOutcome::Suppressed;
            }
        }

        match binding.click_action(taps) {
            Resolved::Action(id) => {
                if self.engine.complete(episode) {
                    self.perform(id);
                }
                DispatchOutcome::Suppressed
            }
            Resolved::Disabled => {
                debug!(combo = %combo, taps, "click disabled, swallowing");
                self.engine.complete(episode);
                DispatchOutcome::Suppressed
            }
            Resolved::Default => {
                if self.engine.complete(episode) {
                    self.replay_clicks(&combo, taps, event.policy_flags);
                    return DispatchOutcome::Forwarded;
                }
                DispatchOutcome::Suppressed
            }
        }
    }

    /// Fire-and-forget action dispatch; failures are logged and swallowed so
    /// a broken action can never stall or kill input handling.
    fn perform(&self, action_id: String) {
        debug!(action = %action_id, "dispatching action");
        let dispatch = self.dispatch.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatch.perform(&action_id).await {
                warn!(action = %action_id, "action dispatch failed: {err:#}");
            }
        });
    }

    /// Re-deliver the suppressed transitions so default behavior occurs:
    /// one down/up pair per completed tap, combos pressed in order and
    /// released in reverse.
    fn replay_clicks(&self, combo: &ComboKey, taps: u32, policy_flags: u32) {
        debug!(combo = %combo, taps, "no binding for tap count, replaying original events");
        let mut keys = vec![combo.primary];
        if let Some(secondary) = combo.secondary {
            keys.push(secondary);
        }
        for _ in 0..taps.max(1) {
            for key in &keys {
                self.emit(*key, true, policy_flags);
            }
            for key in keys.iter().rev() {
                self.emit(*key, false, policy_flags);
            }
        }
    }

    fn emit(&self, code: crate::key::KeyCode, down: bool, policy_flags: u32) {
        if let Err(err) = self
            .inject
            .inject_key(code, down, 0, policy_flags | FLAG_INJECTED)
        {
            warn!(key = %code, down, "replay injection failed: {err:#}");
        }
    }
}
