//! Authoritative registry of supervised agents
//!
//! The [`Orchestrator`] is the only place agents are created, looked up,
//! and torn down. Its registry lock covers map mutations only; starting and
//! stopping always happen outside it so one slow agent cannot stall
//! unrelated registry operations.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use troupe_bus::{AgentId, Message, MessageBus, Payload};
use troupe_pool::ResourcePool;
use uuid::Uuid;

use crate::agent::{AgentRuntime, DEFAULT_IDLE_TIMEOUT};
use crate::catalog::RoleCatalog;
use crate::descriptor::{AgentConfig, AgentDescriptor};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::handler::AgentHandler;
use crate::targets::{TargetRegistry, TargetServer};

/// Outcome of a bulk teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Agents that stopped cleanly
    pub stopped: Vec<AgentId>,
    /// Agents whose stop faulted, with the cause
    pub faulted: Vec<(AgentId, String)>,
}

impl TeardownReport {
    /// Agents removed from the registry
    pub fn len(&self) -> usize {
        self.stopped.len() + self.faulted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_clean(&self) -> bool {
        self.faulted.is_empty()
    }
}

/// Creates, tracks, and tears down agents
pub struct Orchestrator {
    bus: Arc<MessageBus>,
    pool: Arc<ResourcePool>,
    catalog: RoleCatalog,
    targets: TargetRegistry,
    idle_timeout: Duration,
    registry: Mutex<HashMap<AgentId, Arc<AgentRuntime>>>,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<MessageBus>,
        pool: Arc<ResourcePool>,
        catalog: RoleCatalog,
        targets: TargetRegistry,
    ) -> Self {
        Self {
            bus,
            pool,
            catalog,
            targets,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Idle timeout handed to every runtime this orchestrator builds
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    pub fn resolve_target(&self, name: &str) -> Option<&TargetServer> {
        self.targets.get(name)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<AgentId, Arc<AgentRuntime>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Provision and start an agent
    ///
    /// Role and target are both validated before anything is registered, so
    /// a rejected spawn leaves no trace. A spawned agent may already be
    /// FAILED if its startup hook faulted.
    ///
    /// # Errors
    ///
    /// `RoleNotFound` or `TargetNotFound`.
    pub async fn spawn(&self, config: AgentConfig) -> OrchestratorResult<Arc<AgentDescriptor>> {
        let factory = self
            .catalog
            .get(&config.role)
            .ok_or_else(|| OrchestratorError::RoleNotFound(config.role.clone()))?;
        if !self.targets.contains(&config.target) {
            return Err(OrchestratorError::TargetNotFound(config.target.clone()));
        }

        let handler = factory.construct(&config, &self.pool);
        self.supervise(AgentId::generate(), config, handler).await
    }

    /// Supervise a pre-built handler under a caller-chosen identifier
    ///
    /// Used for well-known agents such as `orchestrator`. Skips the catalog
    /// and target checks.
    ///
    /// # Errors
    ///
    /// `AlreadySupervised` when `id` is taken.
    pub async fn install(
        &self,
        id: AgentId,
        config: AgentConfig,
        handler: Box<dyn AgentHandler>,
    ) -> OrchestratorResult<Arc<AgentDescriptor>> {
        if self.registry().contains_key(&id) {
            return Err(OrchestratorError::AlreadySupervised(id));
        }
        self.supervise(id, config, handler).await
    }

    async fn supervise(
        &self,
        id: AgentId,
        config: AgentConfig,
        handler: Box<dyn AgentHandler>,
    ) -> OrchestratorResult<Arc<AgentDescriptor>> {
        let descriptor = Arc::new(AgentDescriptor::new(id.clone(), config));
        let runtime = Arc::new(
            AgentRuntime::new(Arc::clone(&descriptor), Arc::clone(&self.bus), handler)
                .with_idle_timeout(self.idle_timeout),
        );

        {
            let mut registry = self.registry();
            if registry.contains_key(&id) {
                return Err(OrchestratorError::AlreadySupervised(id));
            }
            registry.insert(id.clone(), Arc::clone(&runtime));
        }

        let state = runtime.start().await;
        info!(
            agent_id = %id,
            name = %descriptor.name(),
            role = %descriptor.role(),
            session_id = descriptor.session_id().unwrap_or(""),
            state = %state,
            "Spawned agent"
        );
        Ok(descriptor)
    }

    /// Remove `id` and stop it
    ///
    /// Returns `Ok(false)` for an unknown id. The entry is gone from the
    /// registry before the stop begins, even when the stop faults.
    ///
    /// # Errors
    ///
    /// `Teardown` when the agent's stop faulted.
    pub async fn terminate(&self, id: &AgentId) -> OrchestratorResult<bool> {
        let Some(runtime) = self.registry().remove(id) else {
            debug!(agent_id = %id, "Terminate for unknown agent");
            return Ok(false);
        };

        runtime
            .stop()
            .await
            .map_err(|fault| OrchestratorError::Teardown {
                agent_id: id.clone(),
                reason: fault.to_string(),
            })?;
        info!(agent_id = %id, "Terminated agent");
        Ok(true)
    }

    /// Drain the registry and stop every agent concurrently
    pub async fn terminate_all(&self) -> TeardownReport {
        let drained: Vec<_> = self.registry().drain().collect();
        let report = stop_all(drained).await;
        info!(
            stopped = report.stopped.len(),
            faulted = report.faulted.len(),
            "Terminated all agents"
        );
        report
    }

    /// Remove and stop every agent tagged with `session_id`
    pub async fn terminate_session(&self, session_id: &str) -> TeardownReport {
        let removed: Vec<_> = {
            let mut registry = self.registry();
            let ids: Vec<AgentId> = registry
                .iter()
                .filter(|(_, runtime)| runtime.descriptor().session_id() == Some(session_id))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| registry.remove(&id).map(|runtime| (id, runtime)))
                .collect()
        };

        let report = stop_all(removed).await;
        info!(
            session_id = %session_id,
            stopped = report.stopped.len(),
            faulted = report.faulted.len(),
            "Terminated session"
        );
        report
    }

    /// Live descriptors of every supervised agent
    pub fn list(&self) -> Vec<Arc<AgentDescriptor>> {
        self.registry()
            .values()
            .map(|runtime| Arc::clone(runtime.descriptor()))
            .collect()
    }

    pub fn list_by_session(&self, session_id: &str) -> Vec<Arc<AgentDescriptor>> {
        self.registry()
            .values()
            .filter(|runtime| runtime.descriptor().session_id() == Some(session_id))
            .map(|runtime| Arc::clone(runtime.descriptor()))
            .collect()
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<AgentDescriptor>> {
        self.registry()
            .get(id)
            .map(|runtime| Arc::clone(runtime.descriptor()))
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.registry().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    /// Route a message through the bus
    ///
    /// `sender` need not be a supervised agent; `None` recipient broadcasts.
    pub fn dispatch(&self, sender: AgentId, recipient: Option<AgentId>, payload: Payload) -> Uuid {
        let message = Message::new(sender, recipient, payload);
        let id = message.id;
        self.bus.send(message);
        id
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.len())
            .field("roles", &self.catalog.roles())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// Stop runtimes concurrently; one fault never aborts the rest
async fn stop_all(runtimes: Vec<(AgentId, Arc<AgentRuntime>)>) -> TeardownReport {
    let outcomes = join_all(runtimes.into_iter().map(|(id, runtime)| async move {
        let outcome = runtime.stop().await;
        (id, outcome)
    }))
    .await;

    let mut report = TeardownReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(()) => report.stopped.push(id),
            Err(fault) => {
                warn!(agent_id = %id, error = %fault, "Agent faulted during teardown");
                report.faulted.push((id, fault.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(MessageBus::new()),
            Arc::new(ResourcePool::new()),
            RoleCatalog::builtin(),
            TargetRegistry::with_defaults(),
        )
        .with_idle_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_unknown_target_rejected_before_registration() {
        let orch = orchestrator();
        let err = orch
            .spawn(AgentConfig::new("a", "echo", "filesystem"))
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::TargetNotFound("filesystem".into()));
        assert!(orch.is_empty());
        assert!(orch.bus().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_unknown_is_not_an_error() {
        let orch = orchestrator();
        let id = AgentId::parse("ghost").unwrap();
        assert!(!orch.terminate(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_spawn_then_terminate_removes_entry() {
        let orch = orchestrator();
        let descriptor = orch
            .spawn(AgentConfig::new("a", "echo", "echo"))
            .await
            .unwrap();
        let id = descriptor.id().clone();
        assert!(orch.get(&id).is_some());
        assert!(orch.bus().is_registered(&id));

        assert!(orch.terminate(&id).await.unwrap());
        assert!(orch.get(&id).is_none());
        assert!(!orch.bus().is_registered(&id));
        assert!(!orch.terminate(&id).await.unwrap());
    }

    #[test]
    fn test_teardown_report_counts() {
        let report = TeardownReport {
            stopped: vec![AgentId::parse("a").unwrap()],
            faulted: vec![(AgentId::parse("b").unwrap(), "boom".into())],
        };
        assert_eq!(report.len(), 2);
        assert!(!report.is_clean());
        assert!(TeardownReport::default().is_empty());
    }
}
