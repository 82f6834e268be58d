//! Configuration type definitions

use serde::Deserialize;
use std::ops::Range;

/// Byte span in the source file
pub type Span = Range<usize>;

/// The six gesture slots configurable for one combo under one condition.
///
/// Every field is optional; an absent slot means default behavior for that
/// gesture. The string `"disabled"` suppresses the default without mapping
/// an action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GestureSlots {
    pub click: Option<String>,
    pub tap: Option<String>,
    pub press: Option<String>,
    pub double_press: Option<String>,
    pub triple_tap: Option<String>,
    pub triple_press: Option<String>,
}

impl GestureSlots {
    pub fn is_empty(&self) -> bool {
        self.click.is_none()
            && self.tap.is_none()
            && self.press.is_none()
            && self.double_press.is_none()
            && self.triple_tap.is_none()
            && self.triple_press.is_none()
    }

    /// Flatten into the fixed slot order the engine indexes by:
    /// click, tap, press, double-press, triple-tap, triple-press
    pub fn into_slot_vec(self) -> Vec<Option<String>> {
        vec![
            self.click,
            self.tap,
            self.press,
            self.double_press,
            self.triple_tap,
            self.triple_press,
        ]
    }
}

/// The `[timeouts]` section; values in milliseconds
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timeouts {
    pub double_tap_ms: Option<u64>,
    pub long_press_ms: Option<u64>,
}
