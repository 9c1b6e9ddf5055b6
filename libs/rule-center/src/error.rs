//! Rule Center Error Types

use thiserror::Error;

/// Result type for rule operations
pub type Result<T> = std::result::Result<T, RuleCenterError>;

/// Rule center errors
#[derive(Debug, Error)]
pub enum RuleCenterError {
    /// Rule, version or template not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate name conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input (missing field, bad format, value/type mismatch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Condition rows do not form a well-formed forest
    #[error("Malformed condition tree: {0}")]
    MalformedTree(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RuleCenterError {
    /// True for input-rejection errors, including malformed trees
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RuleCenterError::Validation(_) | RuleCenterError::MalformedTree(_)
        )
    }
}

impl From<sqlx::Error> for RuleCenterError {
    fn from(err: sqlx::Error) -> Self {
        RuleCenterError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RuleCenterError {
    fn from(err: serde_json::Error) -> Self {
        RuleCenterError::Serialization(err.to_string())
    }
}
