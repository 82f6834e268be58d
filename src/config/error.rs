//! Configuration error types with source location tracking
//!
//! Rich diagnostic output via miette for configuration validation errors.

use super::types::Span;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Convert byte offset to 1-based line number
pub fn byte_offset_to_line(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())]
        .chars()
        .filter(|&c| c == '\n')
        .count()
        + 1
}

/// A single validation issue with location information
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    /// Byte span in source
    pub span: Span,
    /// Primary error message
    pub message: String,
    /// Label shown at the span location
    pub label: String,
    /// Optional help text with suggestions
    pub help: Option<String>,
}

impl ConfigIssue {
    /// A combo specifier that does not parse to one or two known keys
    pub fn unknown_combo(span: Span, spec: &str) -> Self {
        Self {
            span,
            message: format!("unknown key combination '{spec}'"),
            label: "not a valid key or key pair".to_string(),
            help: Some(
                "use a key name, hex, or decimal code, optionally joined by '+': \
                 power, 0x74, 116, power+volumedown"
                    .to_string(),
            ),
        }
    }

    /// A combo that resolves to the same key pair as an earlier entry
    pub fn duplicate_combo(
        span: Span,
        combo_display: &str,
        original_span: Span,
        source_content: &str,
    ) -> Self {
        let original_line = byte_offset_to_line(source_content, original_span.start);
        Self {
            span,
            message: format!("duplicate combo entry for '{combo_display}'"),
            label: "duplicate".to_string(),
            help: Some(format!("first defined at line {original_line}")),
        }
    }

    /// A gesture slot table that failed to deserialize
    pub fn invalid_slots(span: Span, condition: &str, err: impl std::fmt::Display) -> Self {
        Self {
            span,
            message: format!("invalid gesture slots for condition '{condition}': {err}"),
            label: "invalid slots".to_string(),
            help: Some(
                "valid slots: click, tap, press, double_press, triple_tap, triple_press; \
                 each a command string or \"disabled\""
                    .to_string(),
            ),
        }
    }

    /// A timeout value that is unusable
    pub fn bad_timeout(span: Span, detail: impl std::fmt::Display) -> Self {
        Self {
            span,
            message: format!("invalid timeouts: {detail}"),
            label: "bad timeout".to_string(),
            help: Some("timeouts are positive integers in milliseconds".to_string()),
        }
    }
}

/// Individual validation issue wrapped for miette's `#[related]` attribute
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct ConfigIssueDiagnostic {
    message: String,
    #[label("{label}")]
    span: SourceSpan,
    label: String,
    #[help]
    help: Option<String>,
}

/// Collection of configuration validation errors.
///
/// The main diagnostic type returned when validation fails: the source file
/// plus every issue found, sorted by position.
#[derive(Debug, Error, Diagnostic)]
#[error(
    "configuration has {count} error{s}",
    count = self.issues.len(),
    s = if self.issues.len() == 1 { "" } else { "s" }
)]
#[diagnostic(code(gestured::config::validation))]
pub struct ConfigValidationError {
    #[source_code]
    src: NamedSource<String>,

    #[related]
    issues: Vec<ConfigIssueDiagnostic>,
}

impl ConfigValidationError {
    /// Issues are sorted by source position for deterministic output
    pub fn new(
        source_name: impl Into<String>,
        source_content: String,
        mut issues: Vec<ConfigIssue>,
    ) -> Self {
        issues.sort_by_key(|i| i.span.start);

        let diagnostics = issues
            .into_iter()
            .map(|issue| ConfigIssueDiagnostic {
                message: issue.message,
                span: (issue.span.start, issue.span.len()).into(),
                label: issue.label,
                help: issue.help,
            })
            .collect();

        let name: String = source_name.into();
        Self {
            src: NamedSource::new(name, source_content),
            issues: diagnostics,
        }
    }
}

/// Top-level configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(code(gestured::config::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    #[diagnostic(code(gestured::config::parse))]
    Parse {
        #[source_code]
        src: NamedSource<String>,
        #[label("parse error")]
        span: Option<SourceSpan>,
        msg: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ConfigValidationError),
}

impl ConfigError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(
        source_name: impl Into<String>,
        source_content: String,
        err: toml::de::Error,
    ) -> Self {
        let name: String = source_name.into();
        Self::Parse {
            src: NamedSource::new(name, source_content),
            span: err.span().map(|r| (r.start, r.len()).into()),
            msg: err.message().to_string(),
        }
    }
}
