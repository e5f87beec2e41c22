//! Error types for the runtime and orchestrator

use std::any::Any;
use thiserror::Error;
use troupe_bus::{AgentId, BusError};
use troupe_pool::PoolError;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned to callers of the orchestrator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// No constructor is registered for this role
    #[error("Agent role '{0}' not found")]
    RoleNotFound(String),

    /// The declared external target is unknown
    #[error("Target server '{0}' not found")]
    TargetNotFound(String),

    /// An agent is already supervised under this identifier
    #[error("Agent '{0}' is already supervised")]
    AlreadySupervised(AgentId),

    /// The agent was removed but its stop faulted
    #[error("Agent '{agent_id}' faulted during teardown: {reason}")]
    Teardown { agent_id: AgentId, reason: String },

    /// A caller-supplied identifier failed validation
    #[error(transparent)]
    InvalidId(#[from] BusError),
}

impl OrchestratorError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OrchestratorError::RoleNotFound(_) => "ROLE_NOT_FOUND",
            OrchestratorError::TargetNotFound(_) => "TARGET_NOT_FOUND",
            OrchestratorError::AlreadySupervised(_) => "ALREADY_SUPERVISED",
            OrchestratorError::Teardown { .. } => "TEARDOWN_FAULT",
            OrchestratorError::InvalidId(_) => "INVALID_ID",
        }
    }

    /// Whether the caller passed something unusable
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, OrchestratorError::Teardown { .. })
    }
}

/// A fault raised inside an agent's loop body
///
/// Contained to the agent: it is recorded as the descriptor's last error
/// and never propagated to the orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AgentFault(String);

impl AgentFault {
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }

    /// Fault for a panic caught at the loop boundary
    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self(format!("panicked: {detail}"))
    }

    pub fn cause(&self) -> &str {
        &self.0
    }
}

impl From<PoolError> for AgentFault {
    fn from(err: PoolError) -> Self {
        Self(err.to_string())
    }
}

impl From<BusError> for AgentFault {
    fn from(err: BusError) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for AgentFault {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("serialization failed: {err}"))
    }
}

impl From<String> for AgentFault {
    fn from(cause: String) -> Self {
        Self(cause)
    }
}

impl From<&str> for AgentFault {
    fn from(cause: &str) -> Self {
        Self(cause.to_string())
    }
}

/// Errors raised while assembling an [`AppContext`](crate::AppContext)
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to register model resource: {0}")]
    Pool(#[from] PoolError),

    #[error("Failed to install orchestrator agent: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_errors_carry_cause() {
        let err = OrchestratorError::RoleNotFound("wizard".to_string());
        assert_eq!(err.to_string(), "Agent role 'wizard' not found");
        assert_eq!(err.error_code(), "ROLE_NOT_FOUND");
        assert!(err.is_caller_error());

        let err = OrchestratorError::TargetNotFound("nowhere".to_string());
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_panic_payloads_become_readable_faults() {
        let fault = AgentFault::from_panic(Box::new("boom"));
        assert_eq!(fault.cause(), "panicked: boom");

        let fault = AgentFault::from_panic(Box::new(String::from("kaboom")));
        assert_eq!(fault.to_string(), "panicked: kaboom");

        let fault = AgentFault::from_panic(Box::new(42_u8));
        assert_eq!(fault.cause(), "panicked: unknown panic payload");
    }

    #[test]
    fn test_pool_errors_convert_to_faults() {
        let fault: AgentFault = PoolError::NotRegistered("gpt-4".to_string()).into();
        assert!(fault.cause().contains("gpt-4"));
    }
}
