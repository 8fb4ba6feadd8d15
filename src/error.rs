// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Errors

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the Nexus engine.
///
/// Missing optional upstream fields never produce an error; only structurally
/// invalid required shapes do.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NexusError {
    #[error("invalid input `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("resource probe failed: {0}")]
    ResourceProbe(String),
    #[error("engine has been stopped")]
    Stopped,
}

impl NexusError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput { field: field.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, NexusError>;
