//! Error types for pool operations

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised while acquiring or using a pooled client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No resource was registered under this name. Caller error, never retried.
    #[error("Model '{0}' not registered in resource pool")]
    NotRegistered(String),

    /// The client could not be built on first use
    #[error("Failed to construct client for '{resource}': {reason}")]
    Construction { resource: String, reason: String },

    /// The backend rejected or failed the call
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend answered with something we could not read
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The resource declaration itself is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Whether a later attempt might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Construction { .. } | PoolError::Backend(_))
    }

    /// Stable code suitable for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            PoolError::NotRegistered(_) => "RESOURCE_NOT_REGISTERED",
            PoolError::Construction { .. } => "CONSTRUCTION_FAILED",
            PoolError::Backend(_) => "BACKEND_ERROR",
            PoolError::InvalidResponse(_) => "INVALID_RESPONSE",
            PoolError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

impl From<reqwest::Error> for PoolError {
    fn from(err: reqwest::Error) -> Self {
        PoolError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_registered_is_not_retryable() {
        let err = PoolError::NotRegistered("gpt-4".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "RESOURCE_NOT_REGISTERED");
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_construction_is_retryable() {
        let err = PoolError::Construction {
            resource: "gpt-4".to_string(),
            reason: "bad endpoint".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Failed to construct client for 'gpt-4': bad endpoint"
        );
    }
}
