//! Error types for bus operations

use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Reasons an identifier string is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdValidationError {
    /// The ID string is empty
    #[error("ID cannot be empty")]
    Empty,
    /// The ID contains only whitespace
    #[error("ID cannot be whitespace-only")]
    WhitespaceOnly,
    /// The ID has leading or trailing whitespace
    #[error("ID cannot have leading or trailing whitespace")]
    LeadingTrailingWhitespace,
    /// The ID is longer than [`crate::types::MAX_ID_LEN`]
    #[error("ID cannot exceed {max} characters (got {len})")]
    TooLong { len: usize, max: usize },
    /// The ID contains invalid characters
    #[error("ID can only contain alphanumeric characters, hyphens, underscores, and dots")]
    InvalidCharacters,
}

/// Errors surfaced by the bus
///
/// Sending never fails: an unknown recipient is a silent drop, not an error.
/// The only fallible surface is identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An identifier failed validation
    #[error("Invalid agent id '{id}': {source}")]
    InvalidId {
        id: String,
        #[source]
        source: IdValidationError,
    },
}

impl BusError {
    /// Stable code suitable for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            BusError::InvalidId { .. } => "INVALID_ID",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_id_display_carries_cause() {
        let err = BusError::InvalidId {
            id: "a b".to_string(),
            source: IdValidationError::InvalidCharacters,
        };
        let text = err.to_string();
        assert!(text.contains("a b"));
        assert!(text.contains("alphanumeric"));
        assert_eq!(err.error_code(), "INVALID_ID");
    }
}
