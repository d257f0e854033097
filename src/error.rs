//! Plan-level error type.
//!
//! Per-cell arity/type failures never surface here — they become
//! [`crate::value::Value::Invalid`] and propagate through the formula layer.
//! `EngineError` is reserved for schema errors, streaming errors, mutation
//! errors, and configuration errors: the boundary-crossing failures a
//! caller must be told about explicitly.

use thiserror::Error;

/// Result alias used throughout the crate for fallible plan-level operations.
pub type Fallible<T> = Result<T, EngineError>;

/// Errors surfaced at the plan/stream/mutation boundary.
///
/// Kept deliberately flat (message-carrying variants): human-readable
/// messages are enough for the boundary this type guards; structured
/// variants can be added if a caller needs to match on failure kind.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A mutation or projection referenced a column that does not exist.
    #[error("schema error: {0}")]
    Schema(String),

    /// A stream source failed to produce a batch (source exhausted
    /// abnormally, or a collaborator I/O failure).
    #[error("stream error: {0}")]
    Stream(String),

    /// A mutation was rejected (read-only target, unknown key, etc).
    #[error("mutation error: {0}")]
    Mutation(String),

    /// An operation has no implementation in the requested mode and no
    /// fallback is possible (see raster/stream bridge).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A resource limit configured on the `Job` was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
}

impl EngineError {
    pub fn schema(msg: impl Into<String>) -> Self {
        EngineError::Schema(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        EngineError::Stream(msg.into())
    }

    pub fn mutation(msg: impl Into<String>) -> Self {
        EngineError::Mutation(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        EngineError::Unsupported(msg.into())
    }
}
