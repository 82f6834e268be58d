//! Capability ports consumed by the gesture engine
//!
//! Each port is a narrow capability, not a whole subsystem. The core never
//! performs dynamic platform lookups; everything OS- or store-specific comes
//! in through one of these traits. Production implementations live in the
//! `config` and `platform` modules; recording mocks for tests live in
//! [`mock`].

#[cfg(test)]
pub mod mock;

use crate::key::{ComboKey, KeyCode};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Named timing windows resolved through the configuration port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Window after a release during which another press extends the gesture
    DoubleTap,
    /// Hold duration after which a down-stroke becomes a long press
    LongPress,
}

/// Read access to the external binding store.
///
/// Lookups never fail: a missing or malformed entry is reported as `None`
/// and the engine falls through to default behavior.
pub trait ConfigPort: Send + Sync {
    /// Raw action slot list for a combo under a condition key, in fixed slot
    /// order: click, tap, press, double-press, triple-tap, triple-press.
    /// Absent or out-of-range slots are `None`.
    fn action_slots(&self, combo: &ComboKey, condition: &str) -> Option<Vec<Option<String>>>;

    /// Configured timing window in milliseconds, if overridden
    fn timeout_ms(&self, name: Timeout) -> Option<u64>;

    /// Whether extended gesture slots and per-app conditions are unlocked
    fn extended_mode(&self) -> bool;
}

/// Synthetic key event injection into the platform input pipeline.
///
/// Implementations must mark injected events so they are recognized on
/// re-entry and passed straight through the hooks.
pub trait InjectPort: Send + Sync {
    fn inject_key(&self, code: KeyCode, down: bool, repeat: u32, policy_flags: u32) -> Result<()>;
}

/// Device power control for gestures that start while the screen is off
pub trait PowerPort: Send + Sync {
    /// Nudge the device out of low-power state so a held key is not lost
    /// to a slow wake path
    fn wake_device(&self);

    /// Keep the device awake for a bounded duration while a gesture resolves.
    /// The hold is released on a timer regardless of gesture outcome.
    fn acquire_brief_wake_hold(&self, duration: Duration);
}

/// Queries about the current device/session state used to pick the binding
/// condition for a gesture
pub trait DeviceQueryPort: Send + Sync {
    fn is_keyguard_showing(&self) -> bool;
    fn foreground_app_id(&self) -> Option<String>;
    fn is_screen_on(&self) -> bool;
}

/// Fire-and-forget execution of a resolved action.
///
/// The engine spawns the returned future; `perform` must never block the
/// engine's event path. Failures are logged by the caller and swallowed.
#[async_trait]
pub trait ActionDispatchPort: Send + Sync {
    async fn perform(&self, action_id: &str) -> Result<()>;
}
