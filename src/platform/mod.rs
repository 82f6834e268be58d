//! Platform abstraction layer
//!
//! Provides:
//! - Raw button/key event capture (exclusive device grab)
//! - Synthetic event injection (the [`InjectPort`][crate::ports::InjectPort]
//!   implementation)
//! - Device/session state backing the query and power ports on targets
//!   without a session manager
//!
//! Only Linux (evdev + uinput) is implemented; the name-resolution fallbacks
//! keep the core compiling elsewhere.

#[cfg(unix)]
mod linux;
mod session;

#[cfg(unix)]
pub use linux::{Platform, UinputInjector, build_key_name_map, get_key_name};
pub use session::SessionState;

/// What the event loop should do with a raw event after the queueing hook ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    /// Swallow the raw event; resolution owns it now
    Block,
    /// Deliver the raw event unchanged
    Passthrough,
}

#[cfg(not(unix))]
pub fn get_key_name(code: u32) -> String {
    format!("KEY_{code:#06X}")
}

#[cfg(not(unix))]
pub fn build_key_name_map() -> std::collections::HashMap<String, u32> {
    std::collections::HashMap::new()
}
