//! Configuration loading, parsing, and validation
//!
//! Handles:
//! - Loading the binding store from TOML files
//! - Parsing with span preservation for error reporting
//! - Validating combo specifiers, slots, and timeouts
//! - Building the runtime store behind [`ConfigPort`]
//!
//! Layout:
//!
//! ```toml
//! extended = true
//!
//! [timeouts]
//! double_tap_ms = 300
//! long_press_ms = 500
//!
//! [combos.power.on]
//! click = "screenshot.sh"
//! press = "disabled"
//!
//! [combos."power+volumedown"."com.example.*"]
//! click = "torch-toggle.sh"
//! ```
//!
//! Each combo maps condition keys (`on`, `off`, `keyguard`, or a per-app
//! glob pattern) to gesture slot tables.

mod error;
mod types;

pub use error::{ConfigError, ConfigIssue, ConfigValidationError};
pub use types::{GestureSlots, Timeouts};

use crate::key::ComboKey;
use crate::ports::{ConfigPort, Timeout};
use serde::Deserialize;
use serde::de::IntoDeserializer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toml::de::{DeTable, DeValue};
use tracing::warn;

/// Default config location: `$XDG_CONFIG_HOME/gestured/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gestured").join("config.toml"))
}

/// Runtime binding store with resolved combo keys for fast lookup during
/// event processing. Built once at startup; a reload builds a fresh one.
pub struct RuntimeConfig {
    extended: bool,
    double_tap_ms: Option<u64>,
    long_press_ms: Option<u64>,
    /// Condition entries per combo, in declaration order. Exact condition
    /// names win over glob patterns at lookup time.
    bindings: HashMap<ComboKey, Vec<(String, Vec<Option<String>>)>>,
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("extended", &self.extended)
            .field("combos", &self.bindings.len())
            .finish()
    }
}

impl ConfigPort for RuntimeConfig {
    fn action_slots(&self, combo: &ComboKey, condition: &str) -> Option<Vec<Option<String>>> {
        let entries = self.bindings.get(combo)?;

        // Exact condition name wins over glob patterns
        if let Some((_, slots)) = entries.iter().find(|(c, _)| c.as_str() == condition) {
            return Some(slots.clone());
        }
        entries
            .iter()
            .find(|(pattern, _)| glob_match::glob_match(pattern, condition))
            .map(|(_, slots)| slots.clone())
    }

    fn timeout_ms(&self, name: Timeout) -> Option<u64> {
        match name {
            Timeout::DoubleTap => self.double_tap_ms,
            Timeout::LongPress => self.long_press_ms,
        }
    }

    fn extended_mode(&self) -> bool {
        self.extended
    }
}

/// Load and validate configuration from a file.
///
/// Returns the runtime store, or a detailed error with source locations for
/// all validation issues found.
pub fn load(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let path = path.as_ref();
    let source_name = path.display().to_string();

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(&source_name, e))?;

    load_from_str(&source_name, content)
}

/// Load and validate configuration from a string.
///
/// Useful for testing and when config content is already in memory.
pub fn load_from_str(source_name: &str, content: String) -> Result<RuntimeConfig, ConfigError> {
    let mut loader = ConfigLoader::new(source_name.to_string(), content);
    loader.parse_and_build()
}

/// Internal loader that tracks parsing state and validation issues
struct ConfigLoader {
    source_name: String,
    source_content: String,
    issues: Vec<ConfigIssue>,
}

impl ConfigLoader {
    fn new(source_name: String, source_content: String) -> Self {
        Self {
            source_name,
            source_content,
            issues: Vec::new(),
        }
    }

    fn parse_and_build(&mut self) -> Result<RuntimeConfig, ConfigError> {
        // Parse into a spanned table for location tracking. The content is
        // cloned because DeTable borrows the source while we mutate self.
        let content_for_parse = self.source_content.clone();
        let table = DeTable::parse(&content_for_parse)
            .map_err(|e| ConfigError::parse(&self.source_name, self.source_content.clone(), e))?;

        let runtime = self.build_runtime(table.into_inner());

        if self.issues.is_empty() {
            Ok(runtime)
        } else {
            Err(ConfigValidationError::new(
                self.source_name.clone(),
                self.source_content.clone(),
                std::mem::take(&mut self.issues),
            )
            .into())
        }
    }

    fn build_runtime(&mut self, table: DeTable) -> RuntimeConfig {
        let mut extended = false;
        let mut timeouts = Timeouts::default();
        let mut bindings = HashMap::new();

        for (key, value) in table {
            let key_str = key.get_ref().as_ref();
            let value_span = value.span();

            match key_str {
                "extended" => match bool::deserialize(value.into_deserializer()) {
                    Ok(flag) => extended = flag,
                    Err(e) => {
                        self.issues.push(ConfigIssue {
                            span: value_span,
                            message: format!("'extended' must be a boolean: {e}"),
                            label: "expected true or false".to_string(),
                            help: None,
                        });
                    }
                },
                "timeouts" => {
                    timeouts = self.parse_timeouts(value);
                }
                "combos" => {
                    bindings = self.parse_combos(value);
                }
                _ => {
                    // Unknown top-level key; tolerated for forward compat
                }
            }
        }

        RuntimeConfig {
            extended,
            double_tap_ms: timeouts.double_tap_ms,
            long_press_ms: timeouts.long_press_ms,
            bindings,
        }
    }

    fn parse_timeouts(&mut self, value: toml::Spanned<DeValue>) -> Timeouts {
        let span = value.span();
        match Timeouts::deserialize(value.into_deserializer()) {
            Ok(timeouts) => {
                for (name, ms) in [
                    ("double_tap_ms", timeouts.double_tap_ms),
                    ("long_press_ms", timeouts.long_press_ms),
                ] {
                    if ms == Some(0) {
                        self.issues
                            .push(ConfigIssue::bad_timeout(span.clone(), format!("{name} is 0")));
                    }
                }
                timeouts
            }
            Err(e) => {
                self.issues.push(ConfigIssue::bad_timeout(span, e));
                Timeouts::default()
            }
        }
    }

    /// Parse the \[combos\] section into resolved combo keys
    fn parse_combos(
        &mut self,
        value: toml::Spanned<DeValue>,
    ) -> HashMap<ComboKey, Vec<(String, Vec<Option<String>>)>> {
        let mut result = HashMap::new();

        let combos_span = value.span();
        let DeValue::Table(table) = value.into_inner() else {
            self.issues.push(ConfigIssue {
                span: combos_span,
                message: "'combos' must be a table".to_string(),
                label: "expected table".to_string(),
                help: Some("example: [combos.power.on]\nclick = \"screenshot.sh\"".to_string()),
            });
            return result;
        };

        // Track first span per resolved combo so a duplicate can point back
        let mut seen: HashMap<ComboKey, types::Span> = HashMap::new();

        for (combo_spanned, conditions_spanned) in table {
            let combo_spec = combo_spanned.get_ref().to_string();
            let combo_span = combo_spanned.span();

            let Some(combo) = ComboKey::from_config_str(&combo_spec) else {
                self.issues
                    .push(ConfigIssue::unknown_combo(combo_span, &combo_spec));
                continue;
            };

            if let Some(original_span) = seen.get(&combo) {
                self.issues.push(ConfigIssue::duplicate_combo(
                    combo_span,
                    &combo_spec,
                    original_span.clone(),
                    &self.source_content,
                ));
                continue;
            }
            seen.insert(combo, combo_span);

            let conditions = self.parse_conditions(&combo_spec, conditions_spanned);
            if !conditions.is_empty() {
                result.insert(combo, conditions);
            }
        }

        result
    }

    /// Parse one combo's condition tables, preserving declaration order so
    /// glob patterns match deterministically
    fn parse_conditions(
        &mut self,
        combo_spec: &str,
        value: toml::Spanned<DeValue>,
    ) -> Vec<(String, Vec<Option<String>>)> {
        let span = value.span();
        let DeValue::Table(table) = value.into_inner() else {
            self.issues.push(ConfigIssue {
                span,
                message: format!("combo '{combo_spec}' must map conditions to slot tables"),
                label: "expected table".to_string(),
                help: Some(
                    "example: [combos.power.on]\nclick = \"screenshot.sh\"".to_string(),
                ),
            });
            return Vec::new();
        };

        let mut conditions = Vec::new();
        for (condition_spanned, slots_spanned) in table {
            let condition = condition_spanned.get_ref().to_string();
            let slots_span = slots_spanned.span();

            match GestureSlots::deserialize(slots_spanned.into_deserializer()) {
                Ok(slots) => {
                    if slots.is_empty() {
                        warn!(
                            combo = combo_spec,
                            condition = %condition,
                            "empty gesture slot table; entry has no effect"
                        );
                    }
                    conditions.push((condition, slots.into_slot_vec()));
                }
                Err(e) => {
                    self.issues
                        .push(ConfigIssue::invalid_slots(slots_span, &condition, e));
                }
            }
        }
        conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyCode;
    use assert2::assert;

    fn power() -> ComboKey {
        ComboKey::single(KeyCode::new(116))
    }

    #[test]
    fn test_full_config_parses() {
        let toml = r#"
            extended = true

            [timeouts]
            double_tap_ms = 250
            long_press_ms = 700

            [combos.0x74.on]
            click = "screenshot.sh"
            tap = "torch.sh"
            press = "disabled"

            [combos."0x74+0x72".keyguard]
            click = "sos.sh"
        "#;
        let runtime = load_from_str("test.toml", toml.to_string()).unwrap();

        assert!(runtime.extended_mode());
        assert!(runtime.timeout_ms(Timeout::DoubleTap) == Some(250));
        assert!(runtime.timeout_ms(Timeout::LongPress) == Some(700));

        let slots = runtime.action_slots(&power(), "on").unwrap();
        assert!(slots[0] == Some("screenshot.sh".to_string()));
        assert!(slots[1] == Some("torch.sh".to_string()));
        assert!(slots[2] == Some("disabled".to_string()));
        assert!(slots[3].is_none());

        let pair = ComboKey::combo(KeyCode::new(116), KeyCode::new(114));
        assert!(runtime.action_slots(&pair, "keyguard").is_some());
        assert!(runtime.action_slots(&pair, "on").is_none());
    }

    #[test]
    fn test_missing_sections_are_fine() {
        let runtime = load_from_str("test.toml", String::new()).unwrap();
        assert!(!runtime.extended_mode());
        assert!(runtime.timeout_ms(Timeout::DoubleTap).is_none());
        assert!(runtime.action_slots(&power(), "on").is_none());
    }

    #[test]
    fn test_glob_condition_matches_app_id() {
        let toml = r#"
            [combos.0x74."com.example.*"]
            click = "in-app.sh"
        "#;
        let runtime = load_from_str("test.toml", toml.to_string()).unwrap();

        let slots = runtime.action_slots(&power(), "com.example.camera").unwrap();
        assert!(slots[0] == Some("in-app.sh".to_string()));
        assert!(runtime.action_slots(&power(), "org.other.app").is_none());
    }

    #[test]
    fn test_exact_condition_wins_over_glob() {
        let toml = r#"
            [combos.0x74]
            "com.*" = { click = "glob.sh" }
            "com.example.app" = { click = "exact.sh" }
        "#;
        let runtime = load_from_str("test.toml", toml.to_string()).unwrap();

        let slots = runtime.action_slots(&power(), "com.example.app").unwrap();
        assert!(slots[0] == Some("exact.sh".to_string()));
    }

    #[test]
    fn test_unknown_combo_key_error() {
        let toml = r#"
            [combos.notakey.on]
            click = "x.sh"
        "#;
        let result = load_from_str("test.toml", toml.to_string());
        assert!(result.is_err());
        let msg = format!("{:?}", result.unwrap_err());
        assert!(msg.contains("notakey"));
    }

    #[test]
    fn test_three_key_combo_rejected() {
        let toml = r#"
            [combos."116+114+115".on]
            click = "x.sh"
        "#;
        let result = load_from_str("test.toml", toml.to_string());
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_combo_error() {
        // Hex and decimal spell the same key
        let toml = r#"
            [combos.0x74.on]
            click = "a.sh"

            [combos.116.off]
            click = "b.sh"
        "#;
        let result = load_from_str("test.toml", toml.to_string());
        assert!(result.is_err());
        let msg = format!("{:?}", result.unwrap_err());
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn test_invalid_slot_name_error() {
        let toml = r#"
            [combos.0x74.on]
            clck = "typo.sh"
        "#;
        let result = load_from_str("test.toml", toml.to_string());
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_error() {
        let toml = r#"
            [timeouts]
            double_tap_ms = 0
        "#;
        let result = load_from_str("test.toml", toml.to_string());
        assert!(result.is_err());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let toml = r#"
            [timeouts]
            long_press_ms = 0

            [combos.notakey.on]
            click = "x.sh"
        "#;
        let result = load_from_str("test.toml", toml.to_string());
        let Err(ConfigError::Validation(v)) = result else {
            panic!("expected validation error");
        };
        let msg = format!("{v:?}");
        assert!(msg.contains("notakey"));
        assert!(msg.contains("long_press_ms"));
    }
}
