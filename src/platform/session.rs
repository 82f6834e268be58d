//! Device and session state source
//!
//! Backs the query and power ports on targets without a session manager: the
//! daemon tracks screen, keyguard, and foreground-app state itself and an
//! integration layer (or tests) feeds it through the setters. Wake holds are
//! released on a timer regardless of what the gesture resolved to.

use crate::ports::{DeviceQueryPort, PowerPort};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub struct SessionState {
    screen_on: AtomicBool,
    keyguard_showing: AtomicBool,
    foreground_app: Mutex<Option<String>>,
    /// Shared with the timer tasks that release holds
    active_wake_holds: Arc<AtomicUsize>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            screen_on: AtomicBool::new(true),
            keyguard_showing: AtomicBool::new(false),
            foreground_app: Mutex::new(None),
            active_wake_holds: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_screen_on(&self, on: bool) {
        self.screen_on.store(on, Ordering::Relaxed);
    }

    pub fn set_keyguard_showing(&self, showing: bool) {
        self.keyguard_showing.store(showing, Ordering::Relaxed);
    }

    pub fn set_foreground_app(&self, app_id: Option<String>) {
        *self
            .foreground_app
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = app_id;
    }

    pub fn active_wake_holds(&self) -> usize {
        self.active_wake_holds.load(Ordering::Relaxed)
    }
}

impl DeviceQueryPort for SessionState {
    fn is_keyguard_showing(&self) -> bool {
        self.keyguard_showing.load(Ordering::Relaxed)
    }

    fn foreground_app_id(&self) -> Option<String> {
        self.foreground_app
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn is_screen_on(&self) -> bool {
        self.screen_on.load(Ordering::Relaxed)
    }
}

impl PowerPort for SessionState {
    fn wake_device(&self) {
        debug!("wake requested");
        // Without a session manager the wake itself is the state change
        self.screen_on.store(true, Ordering::Relaxed);
    }

    fn acquire_brief_wake_hold(&self, duration: Duration) {
        self.active_wake_holds.fetch_add(1, Ordering::Relaxed);
        debug!(?duration, "wake hold acquired");

        let holds = Arc::clone(&self.active_wake_holds);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            holds.fetch_sub(1, Ordering::Relaxed);
            debug!("wake hold released");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let state = SessionState::new();
        assert!(state.is_screen_on());
        assert!(!state.is_keyguard_showing());
        assert!(state.foreground_app_id().is_none());
    }

    #[test]
    fn test_setters_feed_queries() {
        let state = SessionState::new();
        state.set_screen_on(false);
        state.set_keyguard_showing(true);
        state.set_foreground_app(Some("com.example.app".to_string()));

        assert!(!state.is_screen_on());
        assert!(state.is_keyguard_showing());
        assert!(state.foreground_app_id() == Some("com.example.app".to_string()));
    }

    #[tokio::test]
    async fn test_wake_hold_releases_on_timer() {
        let state = Arc::new(SessionState::new());
        state.set_screen_on(false);

        state.wake_device();
        assert!(state.is_screen_on(), "wake turns the screen state on");

        state.acquire_brief_wake_hold(Duration::from_millis(20));
        assert!(state.active_wake_holds() == 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(state.active_wake_holds() == 0);
    }
}
