//! Gesture resolution state machine
//!
//! The engine owns all mutable gesture state behind a single mutex. Two
//! independent call sites (the queueing and dispatching hooks) may mutate it
//! concurrently; every operation takes the lock, mutates, and returns without
//! blocking.
//!
//! Timing windows are detected by bounded cooperative polling rather than a
//! blocking condition-variable wait: the producing side of the event pipeline
//! cannot reliably signal across execution contexts, so the waiter re-acquires
//! the lock every [`POLL_INTERVAL`] and re-reads state. Cancellation is
//! implicit: any mutation that changes the episode's start timestamp or moves
//! the phase away from `Ongoing` makes the next poll observe a mismatch and
//! return early.

pub mod repeat;

use crate::key::{ComboKey, KeyCode, KeyIdentity};
use crate::table::GestureBinding;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

/// Poll cadence for timing-window waits. Kept short so tap and long-press
/// thresholds stay perceptually accurate.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A gap longer than this between transitions ends any multi-tap sequence
pub const TAP_INACTIVITY: Duration = Duration::from_millis(1000);

/// Lifecycle phase of the current gesture episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No gesture active (initial and terminal)
    #[default]
    Pending,
    /// A primary (and possibly secondary) key is down and being timed
    Ongoing,
    /// A custom action fired; further transitions for the key are swallowed
    /// until release
    Invoked,
    /// Default long-press behavior is being emulated via synthetic repeats
    Repeating,
    /// An out-of-sequence key aborted the gesture
    Canceled,
}

/// Outcome of registering a raw key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A brand-new gesture started; bindings must be re-resolved
    NewGesture,
    /// A secondary key joined the gesture; bindings must be re-resolved
    ComboStarted,
    /// Hardware auto-repeat of a key that is already down
    AutoRepeat,
    /// The transition belongs to the current episode
    Tracked,
    /// Not a key we track; the episode (if any) was canceled and the caller
    /// should restore default handling for this event
    Stray,
}

/// All mutable gesture state, guarded by one mutex
#[derive(Debug, Default)]
struct EventState {
    phase: Phase,
    primary: Option<KeyIdentity>,
    secondary: Option<KeyIdentity>,
    is_combo: bool,
    tap_count: u32,
    episode_started_at: Option<Instant>,
    first_up_at: Option<Instant>,
    last_transition_at: Option<Instant>,
    screen_on: bool,
    context: Option<String>,
    /// Binding for the current episode only; dropped on reset
    binding: Option<GestureBinding>,
    /// A primary that was dropped by combo demotion; its pending release is
    /// forwarded instead of canceling the fresh gesture
    abandoned: Option<KeyCode>,
}

impl EventState {
    fn identity_mut(&mut self, code: KeyCode) -> Option<&mut KeyIdentity> {
        if self.primary.as_ref().is_some_and(|p| p.code == code) {
            return self.primary.as_mut();
        }
        if self.secondary.as_ref().is_some_and(|s| s.code == code) {
            return self.secondary.as_mut();
        }
        None
    }

    /// All tracked keys currently held down
    fn keys_held(&self) -> bool {
        self.primary.as_ref().is_some_and(|p| p.is_down)
            && self.secondary.as_ref().is_none_or(|s| s.is_down)
    }

    /// Every tracked key released
    fn all_released(&self) -> bool {
        self.primary.as_ref().is_none_or(|p| !p.is_down)
            && self.secondary.as_ref().is_none_or(|s| !s.is_down)
    }

    fn combo_key(&self) -> Option<ComboKey> {
        let primary = self.primary.as_ref()?.code;
        Some(match &self.secondary {
            Some(sec) => ComboKey::combo(primary, sec.code),
            None => ComboKey::single(primary),
        })
    }

    /// Return to the terminal state; the episode is over
    fn reset(&mut self) {
        self.phase = Phase::Pending;
        self.primary = None;
        self.secondary = None;
        self.is_combo = false;
        self.tap_count = 0;
        self.episode_started_at = None;
        self.first_up_at = None;
        self.binding = None;
        self.context = None;
        self.abandoned = None;
    }
}

/// The gesture engine: one instance per hook-chain installation, shared by
/// both hook entry points.
pub struct GestureEngine {
    state: Mutex<EventState>,
}

impl GestureEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventState::default()),
        }
    }

    /// A panicking lock holder must not take physical input down with it;
    /// recover the inner state instead of propagating the poison.
    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First-contact registration of a raw key transition. Never blocks.
    pub fn register_key(
        &self,
        code: KeyCode,
        down: bool,
        policy_flags: u32,
        now: Instant,
    ) -> Registration {
        let mut s = self.lock();
        if down {
            self.register_down(&mut s, code, policy_flags, now)
        } else {
            self.register_up(&mut s, code, now)
        }
    }

    fn register_down(
        &self,
        s: &mut EventState,
        code: KeyCode,
        policy_flags: u32,
        now: Instant,
    ) -> Registration {
        let active = !matches!(s.phase, Phase::Pending | Phase::Canceled);

        // Hardware auto-repeat of a key that is already down
        if active && let Some(identity) = s.identity_mut(code) {
            if identity.is_down {
                identity.repeat_count += 1;
                s.last_transition_at = Some(now);
                return Registration::AutoRepeat;
            }
        }

        // Second key of a combination: primary is held and a different key
        // goes down (or the known secondary comes back down). This supersedes
        // an invoked or repeating episode too, so the phase moves back to
        // ongoing and resolution restarts for the pair.
        if active
            && s.primary.as_ref().is_some_and(|p| p.is_down && p.code != code)
            && s.secondary.as_ref().is_none_or(|sec| sec.code == code)
        {
            s.secondary = Some(KeyIdentity::secondary(code, policy_flags));
            s.is_combo = true;
            s.tap_count = 0;
            s.phase = Phase::Ongoing;
            s.episode_started_at = Some(now);
            s.first_up_at = None;
            s.last_transition_at = Some(now);
            s.binding = None;
            debug!(key = %code, "gesture: secondary joined, combo started");
            return Registration::ComboStarted;
        }

        // Brand-new gesture. The tap count survives only when the same key
        // continues an ongoing multi-tap sequence without going stale.
        let continues_sequence = s.phase == Phase::Ongoing
            && s.primary.as_ref().is_some_and(|p| p.code == code)
            && s.last_transition_at
                .is_some_and(|t| now.duration_since(t) <= TAP_INACTIVITY);
        if !continues_sequence {
            s.tap_count = 0;
        }

        s.primary = Some(KeyIdentity::primary(code, policy_flags));
        s.secondary = None;
        s.is_combo = false;
        s.phase = Phase::Ongoing;
        s.episode_started_at = Some(now);
        s.first_up_at = None;
        s.last_transition_at = Some(now);
        s.binding = None;
        s.abandoned = None;
        debug!(key = %code, taps = s.tap_count, "gesture: new episode");
        Registration::NewGesture
    }

    fn register_up(&self, s: &mut EventState, code: KeyCode, now: Instant) -> Registration {
        let Some(identity) = s.identity_mut(code) else {
            // A release for a key we are not tracking. A primary dropped by
            // combo demotion still owes one release; hand it back to default
            // handling without disturbing the fresh gesture.
            if s.abandoned == Some(code) {
                s.abandoned = None;
                debug!(key = %code, "gesture: abandoned combo key released");
                return Registration::Stray;
            }
            if matches!(s.phase, Phase::Pending | Phase::Canceled) {
                return Registration::Stray;
            }
            debug!(key = %code, "gesture: stray key, episode canceled");
            s.phase = Phase::Canceled;
            return Registration::Stray;
        };

        debug!(key = %code, role = ?identity.role, "gesture: key released");
        identity.is_down = false;
        if s.first_up_at.is_none() {
            s.first_up_at = Some(now);
        }
        s.last_transition_at = Some(now);

        if s.all_released() {
            match s.phase {
                Phase::Ongoing => {
                    s.tap_count += 1;
                    debug!(taps = s.tap_count, "gesture: tap completed");
                }
                Phase::Invoked | Phase::Canceled => {
                    debug!("gesture: fully released, back to pending");
                    s.reset();
                }
                // Repeating closes in the dispatch hook, which owes the
                // pipeline a final synthetic up first
                Phase::Repeating | Phase::Pending => {}
            }
        }
        Registration::Tracked
    }

    /// Poll every [`POLL_INTERVAL`] until `live` turns false or `timeout`
    /// elapses. The lock is released between polls so the other hook can
    /// still mutate state while the wait is outstanding; state is always
    /// re-read under the lock, never cached.
    async fn wait_window<F>(&self, timeout: Duration, live: F) -> bool
    where
        F: Fn(&EventState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let s = self.lock();
                if !live(&s) {
                    return false;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Wait out the long-press window: true only if the episode's keys stay
    /// down for the full timeout, false the moment anything changes.
    pub async fn wait_while_held(&self, timeout: Duration, episode: Instant) -> bool {
        self.wait_window(timeout, move |s| {
            s.phase == Phase::Ongoing
                && s.episode_started_at == Some(episode)
                && s.keys_held()
        })
        .await
    }

    /// Wait out the multi-tap window after a release: true only if no further
    /// press arrives for the full timeout, false as soon as a new press (or
    /// anything else) supersedes the episode.
    pub async fn wait_for_tap_window(&self, timeout: Duration, episode: Instant) -> bool {
        self.wait_window(timeout, move |s| {
            s.phase == Phase::Ongoing && s.episode_started_at == Some(episode)
        })
        .await
    }

    /// The combo and start timestamp of the episode in flight
    pub fn current_episode(&self) -> Option<(ComboKey, Instant)> {
        let s = self.lock();
        Some((s.combo_key()?, s.episode_started_at?))
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn tap_count(&self) -> u32 {
        self.lock().tap_count
    }

    pub fn all_released(&self) -> bool {
        self.lock().all_released()
    }

    /// Auto-repeat count accumulated for a tracked key's current down-stroke
    pub fn repeat_count(&self, code: KeyCode) -> u32 {
        let mut s = self.lock();
        s.identity_mut(code).map_or(0, |id| id.repeat_count)
    }

    /// Attach the freshly resolved binding to the episode. Fails (false) if
    /// the episode has already been superseded.
    pub fn set_binding(
        &self,
        episode: Instant,
        binding: GestureBinding,
        screen_on: bool,
        context: Option<String>,
    ) -> bool {
        let mut s = self.lock();
        if s.episode_started_at != Some(episode) {
            return false;
        }
        s.binding = Some(binding);
        s.screen_on = screen_on;
        s.context = context;
        true
    }

    /// The episode's binding, if it is still the episode in flight
    pub fn binding(&self, episode: Instant) -> Option<GestureBinding> {
        let s = self.lock();
        if s.episode_started_at != Some(episode) {
            return None;
        }
        s.binding.clone()
    }

    /// A custom action fired for this episode. Remaining transitions are
    /// swallowed until release; if everything is already released the episode
    /// ends immediately.
    pub fn mark_invoked(&self, episode: Instant) -> bool {
        let mut s = self.lock();
        if s.phase != Phase::Ongoing || s.episode_started_at != Some(episode) {
            return false;
        }
        if s.all_released() {
            debug!(context = ?s.context, "gesture: invoked after release, episode done");
            s.reset();
        } else {
            debug!(context = ?s.context, "gesture: invoked, swallowing until release");
            s.phase = Phase::Invoked;
        }
        true
    }

    /// Default long-press behavior begins: synthetic repeats will emulate a
    /// conventionally held key.
    pub fn begin_repeating(&self, episode: Instant) -> bool {
        let mut s = self.lock();
        if s.phase != Phase::Ongoing || s.episode_started_at != Some(episode) || !s.keys_held() {
            return false;
        }
        debug!(screen_was_off = !s.screen_on, "gesture: entering repeating");
        s.phase = Phase::Repeating;
        true
    }

    /// Close out a repeating episode once every key is released
    pub fn finish_repeating(&self) -> bool {
        let mut s = self.lock();
        if s.phase == Phase::Repeating && s.all_released() {
            debug!("gesture: repeating finished");
            s.reset();
            return true;
        }
        false
    }

    /// The episode resolved (or was abandoned) with no lingering state to
    /// keep; return to pending.
    pub fn complete(&self, episode: Instant) -> bool {
        let mut s = self.lock();
        if s.phase != Phase::Ongoing || s.episode_started_at != Some(episode) {
            return false;
        }
        s.reset();
        true
    }

    /// An unconfigured combo falls back to single-key handling: the secondary
    /// becomes a brand-new primary and a fresh episode starts for it.
    pub fn demote_secondary(&self, episode: Instant, now: Instant) -> Option<(ComboKey, Instant)> {
        let mut s = self.lock();
        if s.episode_started_at != Some(episode) || !s.is_combo {
            return None;
        }
        let secondary = s.secondary.take()?;
        debug!(key = %secondary.code, "gesture: combo unbound, demoting secondary");
        s.abandoned = s.primary.as_ref().map(|p| p.code);
        s.primary = Some(KeyIdentity::primary(secondary.code, secondary.policy_flags));
        s.is_combo = false;
        s.tap_count = 0;
        s.phase = Phase::Ongoing;
        s.episode_started_at = Some(now);
        s.first_up_at = None;
        s.last_transition_at = Some(now);
        s.binding = None;
        Some((ComboKey::single(secondary.code), now))
    }
}

impl Default for GestureEngine {
    fn default() -> Self {
        Self::new()
    }
}
