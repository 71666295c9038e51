//! Error types for lp-genealogy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Trace exceeded node budget of {limit} nodes")]
    ResourceExceeded { limit: usize },

    #[error("Trace deadline exceeded: {0}")]
    Timeout(String),

    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TraceError {
    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            TraceError::NotFound(_) => "not_found",
            TraceError::InvalidArgument(_) => "invalid_argument",
            TraceError::ResourceExceeded { .. } => "resource_exceeded",
            TraceError::Timeout(_) => "timeout",
            TraceError::DataAccess(_) => "data_access",
            TraceError::Config(_) => "config",
            TraceError::Io(_) => "io",
            TraceError::Json(_) => "json",
            TraceError::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for TraceError {
    fn from(e: rusqlite::Error) -> Self {
        TraceError::DataAccess(e.to_string())
    }
}
