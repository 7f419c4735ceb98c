//! Error types for the adaptive learning core
//!
//! This module defines all error types used throughout the engine and its
//! learning modules. We use `thiserror` for ergonomic error definitions with
//! automatic Display/Error implementations.
//!
//! Module-level errors never cross the engine façade: the engine converts them
//! into per-module outcomes. Only malformed experiences and configuration
//! problems surface to callers.

use crate::learning::types::Paradigm;
use thiserror::Error;

/// Result type alias for learning operations
pub type Result<T> = std::result::Result<T, LearningError>;

/// Main error type for learning operations
#[derive(Error, Debug)]
pub enum LearningError {
    /// A module needs a field the experience does not carry
    #[error("{paradigm} learning requires `{field}`")]
    MissingRequiredField {
        paradigm: Paradigm,
        field: &'static str,
    },

    /// A field is present but unusable
    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A module failed internally or is not active
    #[error("{paradigm} module unavailable: {reason}")]
    ModuleUnavailable { paradigm: Paradigm, reason: String },

    /// Engine-level rejection of a malformed experience
    #[error("Invalid experience: {0}")]
    InvalidExperience(String),

    /// Configuration out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<LearningError>,
    },
}

impl LearningError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error is a rejection of the input rather than a failure
    /// of the module itself.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::MissingRequiredField { .. } | Self::InvalidField { .. } => true,
            Self::WithContext { source, .. } => source.is_rejection(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = LearningError::MissingRequiredField {
            paradigm: Paradigm::Supervised,
            field: "expected_output",
        };
        let err = err.context("Failed to learn experience");

        assert!(err.to_string().contains("Failed to learn experience"));
        assert!(err.to_string().contains("expected_output"));
    }

    #[test]
    fn test_rejection_classification() {
        let missing = LearningError::MissingRequiredField {
            paradigm: Paradigm::Reinforcement,
            field: "feedback",
        };
        assert!(missing.is_rejection());
        assert!(missing.context("wrapped").is_rejection());

        let unavailable = LearningError::ModuleUnavailable {
            paradigm: Paradigm::Meta,
            reason: "inactive".to_string(),
        };
        assert!(!unavailable.is_rejection());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(LearningError::InvalidConfig("epsilon".to_string()));
        let result = result.with_context(|| "Loading engine config".to_string());

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Loading engine config"));
    }
}
