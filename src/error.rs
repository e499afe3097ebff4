//! Error types for ax3-flux

use thiserror::Error;

/// Errors that can occur while building or running a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("{node} expects {expected} input(s), got {actual}")]
    Arity {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("{node} cannot process {actual} signals (expected {expected})")]
    UnsupportedSignal {
        node: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Index is not strictly increasing: {0}")]
    UnsortedIndex(String),

    #[error("Observer of {node} failed: {message}")]
    Observer { node: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    Parse(String),
}

impl PipelineError {
    /// True for errors that indicate a wiring or construction defect
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::Arity { .. }
        )
    }

    /// True for errors caused by the shape or layout of the data
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            PipelineError::Shape(_)
                | PipelineError::UnsupportedSignal { .. }
                | PipelineError::MissingColumn(_)
                | PipelineError::UnsortedIndex(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
