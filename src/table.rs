//! Action binding resolution
//!
//! Maps a key combination and the contextual condition it fired under to the
//! set of gesture actions configured for it. Lookups go through the
//! [`ConfigPort`]; a miss is never an error, it just means default behavior.
//!
//! Conditions are chosen in priority order: keyguard showing, then the
//! foreground app identifier (extended mode only), then a static `"on"`/
//! `"off"` key derived from screen state. When a keyguard or per-app lookup
//! finds nothing, the static screen-state entry is tried before giving up.

use crate::key::ComboKey;
use crate::ports::{ConfigPort, DeviceQueryPort, Timeout};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Sentinel action string meaning "no action, and suppress default behavior"
pub const DISABLED_ACTION: &str = "disabled";

pub const DEFAULT_DOUBLE_TAP_MS: u64 = 300;
pub const DEFAULT_LONG_PRESS_MS: u64 = 500;

/// Fixed slot positions in a stored action list
const SLOT_CLICK: usize = 0;
const SLOT_TAP: usize = 1;
const SLOT_PRESS: usize = 2;
const SLOT_DOUBLE_PRESS: usize = 3;
const SLOT_TRIPLE_TAP: usize = 4;
const SLOT_TRIPLE_PRESS: usize = 5;

/// Outcome of looking up one gesture slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Nothing configured: let the platform's default behavior happen
    Default,
    /// Explicitly disabled: no action, and the default is suppressed too
    Disabled,
    /// A mapped action identifier to hand to the dispatch port
    Action(String),
}

/// The actions and timing windows bound to one combo for the current episode.
///
/// Computed fresh at the start of each gesture and discarded when the episode
/// resolves. Click slots are indexed by completed tap count (single, double,
/// triple); press slots by the number of taps completed before the hold.
#[derive(Debug, Clone)]
pub struct GestureBinding {
    click: [Option<String>; 3],
    press: [Option<String>; 3],
    pub double_tap_timeout: Duration,
    pub long_press_timeout: Duration,
}

impl GestureBinding {
    fn empty(double_tap_timeout: Duration, long_press_timeout: Duration) -> Self {
        Self {
            click: [None, None, None],
            press: [None, None, None],
            double_tap_timeout,
            long_press_timeout,
        }
    }

    /// Whether no gesture slot is configured at all
    pub fn is_empty(&self) -> bool {
        self.click.iter().all(Option::is_none) && self.press.iter().all(Option::is_none)
    }

    /// Action for a click resolution after `taps` completed taps (1..=3)
    pub fn click_action(&self, taps: u32) -> Resolved {
        let index = (taps.clamp(1, 3) - 1) as usize;
        resolve_slot(&self.click[index])
    }

    /// Action for a long-press resolution after `prior_taps` completed taps
    pub fn press_action(&self, prior_taps: u32) -> Resolved {
        let index = prior_taps.min(2) as usize;
        resolve_slot(&self.press[index])
    }

    /// Whether any slot beyond `completed` taps is configured, meaning the
    /// tap window must stay open after the `completed`-th release
    pub fn wants_more_taps(&self, completed: u32) -> bool {
        let from = completed.min(3) as usize;
        (from..3).any(|i| self.click[i].is_some() || self.press[i].is_some())
    }
}

fn resolve_slot(slot: &Option<String>) -> Resolved {
    match slot {
        None => Resolved::Default,
        Some(id) if id == DISABLED_ACTION => Resolved::Disabled,
        Some(id) => Resolved::Action(id.clone()),
    }
}

/// Resolves bindings for gestures through the configuration port
pub struct ActionTable {
    config: Arc<dyn ConfigPort>,
}

impl ActionTable {
    pub fn new(config: Arc<dyn ConfigPort>) -> Self {
        Self { config }
    }

    /// Pick the condition key for the current device state. `screen_on` is
    /// the state the caller captured at gesture start; it is not re-queried
    /// here because waking the device mid-episode must not move the gesture
    /// onto the other screen-state table.
    pub fn condition(&self, device: &dyn DeviceQueryPort, screen_on: bool) -> String {
        if device.is_keyguard_showing() {
            return "keyguard".to_string();
        }
        if self.config.extended_mode()
            && let Some(app) = device.foreground_app_id()
        {
            return app;
        }
        screen_condition(screen_on).to_string()
    }

    /// Resolve the binding for a combo under a condition.
    ///
    /// Never errors: missing or malformed entries resolve to an empty binding
    /// (everything falls through to default behavior).
    pub fn resolve(&self, combo: &ComboKey, screen_on: bool, condition: &str) -> GestureBinding {
        let double_tap = Duration::from_millis(
            self.config
                .timeout_ms(Timeout::DoubleTap)
                .unwrap_or(DEFAULT_DOUBLE_TAP_MS),
        );
        let long_press = Duration::from_millis(
            self.config
                .timeout_ms(Timeout::LongPress)
                .unwrap_or(DEFAULT_LONG_PRESS_MS),
        );

        let fallback = screen_condition(screen_on);
        let slots = self.config.action_slots(combo, condition).or_else(|| {
            if condition == fallback {
                None
            } else {
                self.config.action_slots(combo, fallback)
            }
        });

        let Some(slots) = slots else {
            return GestureBinding::empty(double_tap, long_press);
        };

        let extended = self.config.extended_mode();
        let slot = |index: usize| -> Option<String> {
            let id = slots.get(index)?.clone()?;
            // Only click and single long-press are honored without the
            // extended entitlement, and launch-shaped actions are not
            if !extended {
                if index != SLOT_CLICK && index != SLOT_PRESS {
                    return None;
                }
                if id.contains('.') {
                    return None;
                }
            }
            Some(id)
        };

        let binding = GestureBinding {
            click: [slot(SLOT_CLICK), slot(SLOT_TAP), slot(SLOT_TRIPLE_TAP)],
            press: [
                slot(SLOT_PRESS),
                slot(SLOT_DOUBLE_PRESS),
                slot(SLOT_TRIPLE_PRESS),
            ],
            double_tap_timeout: double_tap,
            long_press_timeout: long_press,
        };
        trace!(combo = %combo, condition, ?binding, "resolved binding");
        binding
    }
}

fn screen_condition(screen_on: bool) -> &'static str {
    if screen_on { "on" } else { "off" }
}
