//! Error types for the stencil dataflow scheduler

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
///
/// Semantic errors describe a defect in the stencil program or its
/// configuration. Internal errors describe a violated assumption inside the
/// compiler itself and should never be reported as the user's fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Semantic error: {message}")]
    SemanticError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl CompileError {
    pub fn semantic(msg: impl Into<String>) -> Self {
        CompileError::SemanticError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::InternalError { message: msg.into() }
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self, CompileError::SemanticError { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::InternalError { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::SemanticError { message } | CompileError::InternalError { message } => {
                message
            }
        }
    }
}
