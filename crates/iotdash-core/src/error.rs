//! Error types for the iotdash core.

/// Core error type for iotdash infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for iotdash core operations.
pub type DashboardResult<T> = Result<T, DashboardError>;
