//! # Troupe Runtime
//!
//! Agent supervision for Troupe: the per-agent lifecycle state machine,
//! the orchestrator registry with session-scoped teardown, and the
//! built-in roles.
//!
//! ## Lifecycle
//!
//! Every agent runs its [`AgentHandler`] inside an [`AgentRuntime`]:
//!
//! ```text
//! SPAWNING -> RUNNING -> STOPPING -> STOPPED
//!                  \          \
//!                   +----------+--> FAILED
//! ```
//!
//! Faults (errors or panics) inside any hook are contained to the agent and
//! visible only through its [`AgentDescriptor`].
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use troupe_bus::{AgentId, payload};
//! use troupe_runtime::{AgentConfig, AppContext, RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = AppContext::bootstrap(RuntimeConfig::default()).await?;
//!
//! let agent = app
//!     .orchestrator()
//!     .spawn(AgentConfig::new("greeter", "echo", "echo").with_session("demo"))
//!     .await?;
//!
//! let inbox = app.client_mailbox("client")?;
//! app.orchestrator().dispatch(
//!     inbox.id().clone(),
//!     Some(agent.id().clone()),
//!     payload(json!({"content": "hello"})),
//! );
//! let reply = inbox.recv().await.expect("mailbox open");
//! assert_eq!(reply.text("echo"), Some("greeter heard hello"));
//!
//! app.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agents;
pub mod catalog;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod targets;

pub use agent::{AgentRuntime, DEFAULT_IDLE_TIMEOUT};
pub use agents::{
    Action, CoordinatorHandler, DEFAULT_SESSION, EchoHandler, LlmHandler, ORCHESTRATOR_AGENT_ID,
};
pub use catalog::{RoleCatalog, RoleFactory};
pub use config::{BackendKind, RuntimeConfig, RuntimeConfigBuilder};
pub use context::{AppContext, BUSY_RESPONSE, ChatReply};
pub use descriptor::{AgentConfig, AgentDescriptor, AgentState, AgentView, SESSION_KEY};
pub use error::{AgentFault, BootstrapError, ConfigError, OrchestratorError, OrchestratorResult};
pub use handler::{AgentContext, AgentHandler};
pub use orchestrator::{Orchestrator, TeardownReport};
pub use targets::{TargetRegistry, TargetServer};
