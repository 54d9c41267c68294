//! Error types for the deferred lighting pipeline

use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Deferred lighting pipeline errors
///
/// `MissingResource` and `InvalidConfig` are session-fatal: the pipeline
/// disables itself and composites pass-through from then on. Everything
/// else is local to the frame it happened in.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A shading resource required at startup is unavailable
    #[error("Missing shading resource: {0}")]
    MissingResource(String),

    /// Configuration value outside its domain
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Stage invoked out of order
    #[error("Stage order violation: expected {expected:?}, pipeline is in {found:?}")]
    StageOrder {
        expected: PipelineStage,
        found: PipelineStage,
    },

    /// G-buffer attachments do not match the internal lighting resolution
    #[error("G-buffer is {found:?}, internal resolution is {expected:?}")]
    GBufferSizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    /// Render size exceeds the configured maximum resolution
    #[error("Render size {width}x{height} exceeds supported maximum {max_width}x{max_height}")]
    ResolutionExceedsLimit {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    /// Stage invoked before `begin_frame`
    #[error("No frame in progress")]
    FrameNotStarted,

    /// Pipeline was disabled at startup
    #[error("Deferred lighting pipeline is disabled")]
    Disabled,
}

impl PipelineError {
    /// Check if the error disables the pipeline for the whole session
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingResource(_)
                | PipelineError::InvalidConfig(_)
                | PipelineError::Disabled
        )
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
