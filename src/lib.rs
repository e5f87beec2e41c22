//! # Troupe
//!
//! Troupe runs many small agents inside one process. Each agent owns a
//! mailbox on a shared bus, moves through a supervised lifecycle, and
//! borrows rate-limited model clients from a shared pool.
//!
//! ## Core Components
//!
//! - **[MessageBus]**: per-agent FIFO mailboxes with direct and broadcast delivery
//! - **[AgentRuntime]**: lifecycle state machine that contains handler faults
//! - **[Orchestrator]**: registry of live agents with session-scoped teardown
//! - **[ResourcePool]**: concurrency-capped, lazily built shared clients
//! - **[AppContext]**: composition root wiring the above together
//!
//! ## Quick Start
//!
//! ```rust
//! use troupe::{AppContext, RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = AppContext::bootstrap(RuntimeConfig::default()).await?;
//! let reply = app.chat("list agents", Some("docs".into())).await?;
//! assert_eq!(reply.action.as_deref(), Some("list_agents"));
//! app.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub use troupe_bus as bus;
pub use troupe_pool as pool;
pub use troupe_runtime as runtime;

pub use troupe_bus::{AgentId, BusError, Delivery, Mailbox, Message, MessageBus, Payload, payload};
pub use troupe_pool::{
    ModelBackend, ModelClient, PoolError, PoolGuard, ResourceConfig, ResourcePool,
};
pub use troupe_runtime::{
    AgentConfig, AgentContext, AgentDescriptor, AgentHandler, AgentRuntime, AgentState, AgentView,
    AppContext, ChatReply, Orchestrator, OrchestratorError, RoleCatalog, RuntimeConfig,
    TeardownReport,
};
