//! Platform-agnostic key and gesture identity types
//!
//! Key codes are platform-native (evdev codes on Linux) and display names are
//! queried from the platform layer. A gesture tracks at most two live keys:
//! the primary (first down) and an optional secondary that turns the gesture
//! into a combo.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::platform;

/// Marks a synthetic event injected by this daemon. Events carrying this flag
/// must never re-enter the resolution pipeline.
pub const FLAG_INJECTED: u32 = 1 << 24;

/// Platform-agnostic key code.
///
/// Stores the raw OS-specific key code internally. Display names are queried
/// from the OS on demand via `display_name()`, not stored in the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(u32);

impl KeyCode {
    /// Create a KeyCode from a raw platform-native code
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u32 {
        self.0
    }

    /// Get human-readable display name from the OS
    pub fn display_name(&self) -> String {
        platform::get_key_name(self.0)
    }

    /// Parse a key specifier from config
    ///
    /// Accepts:
    /// - Hex literals: "0x74", "0X74"
    /// - Decimal numbers: "116"
    /// - Key names: "power", "KEY_POWER", "volumedown"
    pub fn from_config_str(s: &str) -> Option<Self> {
        parse_key_specifier(s)
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A key transition received from the platform
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    /// The key that was pressed/released
    pub code: KeyCode,
    /// Whether this is a key-down (true) or key-up (false) transition
    pub down: bool,
    /// Policy flags carried alongside the event (wake behavior, injected marker)
    pub policy_flags: u32,
}

impl KeyEvent {
    pub fn new(code: KeyCode, down: bool, policy_flags: u32) -> Self {
        Self {
            code,
            down,
            policy_flags,
        }
    }

    /// Whether this event was synthesized by the daemon itself
    pub fn injected(&self) -> bool {
        self.policy_flags & FLAG_INJECTED != 0
    }
}

/// Role a key plays within the current gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Primary,
    Secondary,
}

/// Bookkeeping for one live key of the current gesture.
///
/// Exactly two of these can be live at a time (primary + optional secondary).
/// Mutated only by the gesture engine, never shared beyond it.
#[derive(Debug, Clone, Copy)]
pub struct KeyIdentity {
    pub code: KeyCode,
    pub role: KeyRole,
    pub is_down: bool,
    /// Accumulated hardware auto-repeat count for the current down-stroke
    pub repeat_count: u32,
    pub policy_flags: u32,
}

impl KeyIdentity {
    pub fn primary(code: KeyCode, policy_flags: u32) -> Self {
        Self {
            code,
            role: KeyRole::Primary,
            is_down: true,
            repeat_count: 0,
            policy_flags,
        }
    }

    pub fn secondary(code: KeyCode, policy_flags: u32) -> Self {
        Self {
            code,
            role: KeyRole::Secondary,
            is_down: true,
            repeat_count: 0,
            policy_flags,
        }
    }
}

/// A key combination identifying a binding: either a lone key or primary plus
/// secondary. Rendered as `"p:s"`, with `"p:0"` for a lone key, which is the
/// form bindings are keyed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComboKey {
    pub primary: KeyCode,
    pub secondary: Option<KeyCode>,
}

impl ComboKey {
    pub fn single(primary: KeyCode) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn combo(primary: KeyCode, secondary: KeyCode) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    /// Parse a combo specifier from config: `"power"` or `"power+volumedown"`.
    /// Each part accepts anything `KeyCode::from_config_str` does.
    pub fn from_config_str(s: &str) -> Option<Self> {
        let mut parts = s.split('+');
        let primary = KeyCode::from_config_str(parts.next()?.trim())?;
        let secondary = match parts.next() {
            Some(part) => Some(KeyCode::from_config_str(part.trim())?),
            None => None,
        };
        if parts.next().is_some() {
            // More than two keys is not a combo we track
            return None;
        }
        Some(Self { primary, secondary })
    }
}

impl std::fmt::Display for ComboKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.secondary {
            Some(sec) => write!(f, "{}:{}", self.primary.code(), sec.code()),
            None => write!(f, "{}:0", self.primary.code()),
        }
    }
}

/// Parse a key specifier: hex literal, decimal number, or key name lookup
fn parse_key_specifier(s: &str) -> Option<KeyCode> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
        && let Ok(code) = u32::from_str_radix(hex, 16)
    {
        return Some(KeyCode(code));
    }

    if s.chars().all(|c| c.is_ascii_digit())
        && let Ok(code) = s.parse::<u32>()
    {
        return Some(KeyCode(code));
    }

    platform_key_from_name(s)
}

/// Lazy-initialized reverse lookup map
static NAME_TO_CODE: OnceLock<HashMap<String, u32>> = OnceLock::new();

fn platform_key_from_name(name: &str) -> Option<KeyCode> {
    let map = NAME_TO_CODE.get_or_init(platform::build_key_name_map);
    let normalized = name.to_lowercase();
    map.get(&normalized).copied().map(KeyCode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn test_parse_hex_and_decimal() {
        let key = parse_key_specifier("0x74").unwrap();
        assert!(key.0 == 116);

        let key = parse_key_specifier("116").unwrap();
        assert!(key.0 == 116);
    }

    #[test]
    fn test_parse_name_does_not_panic() {
        // Name resolution varies by platform; just verify the lookup path
        let _ = parse_key_specifier("power");
        let _ = parse_key_specifier("KEY_POWER");
    }

    #[test]
    fn test_combo_key_rendering() {
        let single = ComboKey::single(KeyCode::new(116));
        assert!(single.to_string() == "116:0");

        let pair = ComboKey::combo(KeyCode::new(116), KeyCode::new(114));
        assert!(pair.to_string() == "116:114");
    }

    #[test]
    fn test_combo_parse_numeric() {
        let combo = ComboKey::from_config_str("116+114").unwrap();
        assert!(combo.primary == KeyCode::new(116));
        assert!(combo.secondary == Some(KeyCode::new(114)));

        assert!(ComboKey::from_config_str("1+2+3").is_none());
    }

    #[test]
    fn test_injected_marker() {
        let event = KeyEvent::new(KeyCode::new(116), true, FLAG_INJECTED);
        assert!(event.injected());

        let plain = KeyEvent::new(KeyCode::new(116), true, 0);
        assert!(!plain.injected());
    }
}
