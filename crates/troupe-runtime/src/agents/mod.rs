//! Built-in agent roles

pub mod coordinator;
pub mod echo;
pub mod llm;

pub use coordinator::{Action, CoordinatorHandler, DEFAULT_SESSION, ORCHESTRATOR_AGENT_ID};
pub use echo::EchoHandler;
pub use llm::LlmHandler;
