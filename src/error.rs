//! Error handling for the sorting machine
//!
//! This module defines the crate-level error type and a Result alias for use
//! throughout the library. Blocking-call outcomes and run-time routing defects
//! live in [`crate::pipeline::error`] and are wrapped here.

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for machine setup and runs
#[derive(Error, Debug)]
pub enum SortError {
    /// Malformed or inconsistent topology. Raised before any thread starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario text that could not be parsed
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Fatal defect raised by a running component
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A worker thread panicked
    #[error("Thread {0} panicked")]
    ThreadPanicked(String),

    /// A machine is single-use
    #[error("Machine has already been run")]
    AlreadyRun,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SortError>,
    },
}

impl SortError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SortError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        SortError::Config(message.into())
    }

    /// Whether this error, or the error it wraps, is a configuration problem
    pub fn is_config(&self) -> bool {
        match self {
            SortError::Config(_) | SortError::Parse { .. } => true,
            SortError::WithContext { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

/// Result type alias for sorting machine operations
pub type Result<T> = std::result::Result<T, SortError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::RouterId;

    #[test]
    fn test_error_display() {
        let err = SortError::config("Hopper 1 overfilled");
        assert_eq!(err.to_string(), "Configuration error: Hopper 1 overfilled");
        assert!(err.is_config());
    }

    #[test]
    fn test_error_with_context() {
        let err: Result<()> = Err(SortError::Parse {
            line: 4,
            message: "expected integer".to_string(),
        });
        let with_ctx = err.context("Failed to load scenario").unwrap_err();
        assert!(with_ctx.to_string().contains("Failed to load scenario"));
        assert!(with_ctx.is_config());
    }

    #[test]
    fn test_pipeline_error_conversion() {
        let err: SortError = PipelineError::UnresolvableTag {
            router: RouterId::from("B"),
            tag: "9-12".to_string(),
            item_id: 1,
        }
        .into();
        assert!(matches!(err, SortError::Pipeline(_)));
        assert!(!err.is_config());
    }
}
