//! # Pipeline Error Types
//!
//! This module defines the error types that cross the pipeline boundary.
//! Per-variant and per-adapter failures are absorbed and logged inside their
//! components; only the conditions below are visible to callers.

use std::fmt;

/// Errors surfaced by the OCR fusion pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No preprocessing variant could be produced from the input image
    UnreadableImage(String),
    /// Every recognition call across all engines and variants failed
    RecognitionUnavailable(String),
    /// The pipeline completed but no text line survived filtering and
    /// reconstruction. Distinguishes "no text found" from a hard failure.
    EmptyResult,
    /// Configuration validation errors
    Config(String),
    /// The run's cancellation token fired before the pipeline finished
    Cancelled,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::UnreadableImage(msg) => {
                write!(
                    f,
                    "[UNREADABLE_IMAGE] No usable image variant could be produced: {}",
                    msg
                )
            }
            PipelineError::RecognitionUnavailable(msg) => {
                write!(f, "[RECOGNITION_UNAVAILABLE] All recognition calls failed: {}", msg)
            }
            PipelineError::EmptyResult => {
                write!(f, "[EMPTY_RESULT] Pipeline completed but no text lines survived")
            }
            PipelineError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            PipelineError::Cancelled => write!(f, "[CANCELLED] Pipeline run was cancelled"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Result type alias for convenience
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_tag_and_detail() {
        let err = PipelineError::UnreadableImage("zero-sized image".to_string());
        let rendered = err.to_string();
        assert!(rendered.contains("[UNREADABLE_IMAGE]"));
        assert!(rendered.contains("zero-sized image"));

        assert!(PipelineError::EmptyResult.to_string().contains("[EMPTY_RESULT]"));
        assert!(PipelineError::Cancelled.to_string().contains("[CANCELLED]"));
    }

    #[test]
    fn test_error_kinds_are_distinguishable() {
        let unreadable = PipelineError::UnreadableImage("x".to_string());
        let unavailable = PipelineError::RecognitionUnavailable("x".to_string());
        assert_ne!(unreadable, unavailable);
        assert_ne!(unavailable, PipelineError::EmptyResult);
    }
}
