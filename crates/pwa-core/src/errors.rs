//! Structured error types shared across the PWA crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`PwaError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, sizes, dataset names).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the fit engine.
///
/// Every family except [`PwaError::Interrupted`] is fatal for the run: the
/// engine never switches to a partial or best-effort mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum PwaError {
    /// Fit recipe, rule and parameter definition errors.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Filesystem and per-event file errors.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Amplitude table and kernel errors.
    #[error("amplitude error: {0}")]
    Amplitude(ErrorInfo),
    /// Normalization integral and scale factor errors.
    #[error("normalization error: {0}")]
    Normalization(ErrorInfo),
    /// Objective evaluation errors.
    #[error("likelihood error: {0}")]
    Likelihood(ErrorInfo),
    /// Master/worker message exchange errors.
    #[error("protocol error: {0}")]
    Protocol(ErrorInfo),
    /// Minimizer and iteration driver errors.
    #[error("fit error: {0}")]
    Fit(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// The user interrupted the run.
    #[error("interrupted: {0}")]
    Interrupted(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl PwaError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            PwaError::Config(info)
            | PwaError::Io(info)
            | PwaError::Amplitude(info)
            | PwaError::Normalization(info)
            | PwaError::Likelihood(info)
            | PwaError::Protocol(info)
            | PwaError::Fit(info)
            | PwaError::Serde(info)
            | PwaError::Interrupted(info) => info,
        }
    }

    /// Returns `true` when the error was raised by a user interrupt.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, PwaError::Interrupted(_))
    }

    /// Builds an [`PwaError::Io`] error carrying the offending path.
    pub fn io(code: &str, path: &std::path::Path, err: impl ToString) -> Self {
        PwaError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_hint() {
        let err = PwaError::Config(
            ErrorInfo::new("no-rule", "no rule matches file")
                .with_context("file", "wave=a:.amps")
                .with_hint("add a rule"),
        );
        let text = err.to_string();
        assert!(text.starts_with("config error: no rule matches file (code: no-rule)"));
        assert!(text.contains("file=wave=a:.amps"));
        assert!(text.ends_with("hint: add a rule"));
    }

    #[test]
    fn serde_tags_family() {
        let err = PwaError::Protocol(ErrorInfo::new("unexpected", "bad message"));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"family\":\"Protocol\""));
        let back: PwaError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
