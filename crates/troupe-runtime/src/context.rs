//! Application context: the composition root
//!
//! Everything that would otherwise be a process-wide singleton (bus, pool,
//! orchestrator) is built once here and reached through the context.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use troupe_bus::{AgentId, Mailbox, Message, MessageBus, payload};
use troupe_pool::{ResourceConfig, ResourcePool};
use uuid::Uuid;

use crate::agents::{CoordinatorHandler, ORCHESTRATOR_AGENT_ID};
use crate::catalog::RoleCatalog;
use crate::config::RuntimeConfig;
use crate::descriptor::{AgentConfig, AgentView};
use crate::error::{BootstrapError, OrchestratorResult};
use crate::orchestrator::{Orchestrator, TeardownReport};
use crate::targets::TargetRegistry;

/// Response when the coordinator does not answer in time
pub const BUSY_RESPONSE: &str = "Request timed out. The orchestrator agent may be busy.";

/// Response when the coordinator's reply carries no text
pub const EMPTY_RESPONSE: &str = "No response";

/// Result of one chat round-trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub action: Option<String>,
    pub details: Option<Value>,
    pub session_id: String,
}

impl ChatReply {
    fn busy(session_id: String) -> Self {
        Self {
            response: BUSY_RESPONSE.to_string(),
            action: None,
            details: None,
            session_id,
        }
    }

    fn from_message(message: &Message, session_id: String) -> Self {
        let response = message
            .text("error")
            .or_else(|| message.text("response"))
            .unwrap_or(EMPTY_RESPONSE)
            .to_string();
        Self {
            response,
            action: message.text("action").map(str::to_string),
            details: message
                .payload
                .get("details")
                .filter(|d| !d.is_null())
                .cloned(),
            session_id,
        }
    }
}

/// Shared services for one running system
pub struct AppContext {
    config: RuntimeConfig,
    bus: Arc<MessageBus>,
    pool: Arc<ResourcePool>,
    orchestrator: Arc<Orchestrator>,
    coordinator_id: AgentId,
}

impl AppContext {
    /// Build the system with the built-in roles and default targets
    ///
    /// # Errors
    ///
    /// Fails if the model resource cannot be registered or the
    /// `orchestrator` agent cannot be installed.
    pub async fn bootstrap(config: RuntimeConfig) -> Result<Self, BootstrapError> {
        let catalog = RoleCatalog::builtin();
        Self::bootstrap_with(config, catalog, TargetRegistry::with_defaults()).await
    }

    /// Build the system with a custom catalog and target registry
    ///
    /// # Errors
    ///
    /// See [`AppContext::bootstrap`].
    pub async fn bootstrap_with(
        config: RuntimeConfig,
        catalog: RoleCatalog,
        targets: TargetRegistry,
    ) -> Result<Self, BootstrapError> {
        let bus = Arc::new(MessageBus::new());
        let pool = Arc::new(ResourcePool::new());
        pool.register(
            config.model_name.clone(),
            ResourceConfig::from_backend(
                config.model_backend.clone(),
                config.model_max_concurrent,
            ),
        )?;

        let orchestrator = Arc::new(
            Orchestrator::new(Arc::clone(&bus), Arc::clone(&pool), catalog, targets)
                .with_idle_timeout(config.idle_timeout),
        );

        let coordinator_id = AgentId::parse(ORCHESTRATOR_AGENT_ID)
            .map_err(|e| BootstrapError::Orchestrator(e.into()))?;
        let coordinator_config =
            AgentConfig::new(ORCHESTRATOR_AGENT_ID, ORCHESTRATOR_AGENT_ID, "echo")
                .with_metadata("model", config.model_name.clone());
        orchestrator
            .install(
                coordinator_id.clone(),
                coordinator_config,
                Box::new(CoordinatorHandler::new(&orchestrator, config.model_name.clone())),
            )
            .await?;

        info!(
            environment = %config.environment,
            model = %config.model_name,
            backend = config.model_backend.label(),
            max_concurrent = config.model_max_concurrent,
            "Application context ready"
        );

        Ok(Self {
            config,
            bus,
            pool,
            orchestrator,
            coordinator_id,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Boundary view of every agent, optionally filtered by session
    pub fn agents(&self, session_id: Option<&str>) -> Vec<AgentView> {
        let descriptors = match session_id {
            Some(session) => self.orchestrator.list_by_session(session),
            None => self.orchestrator.list(),
        };
        descriptors.iter().map(|d| d.snapshot()).collect()
    }

    /// Open a private mailbox for talking to agents from outside
    ///
    /// # Errors
    ///
    /// Only if the generated identifier fails validation.
    pub fn client_mailbox(&self, prefix: &str) -> OrchestratorResult<Mailbox> {
        let id = AgentId::generate_with_prefix(prefix)?;
        Ok(self.bus.open(id))
    }

    /// Send a natural-language request to the `orchestrator` agent and wait
    /// for its correlated reply
    ///
    /// A missing `session_id` gets a fresh one. Running out of time is not
    /// an error: the reply says the orchestrator is busy.
    ///
    /// # Errors
    ///
    /// Only if the private client identifier fails validation.
    pub async fn chat(
        &self,
        message: &str,
        session_id: Option<String>,
    ) -> OrchestratorResult<ChatReply> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let inbox = self.client_mailbox("chat-client")?;
        let correlation_id = Uuid::new_v4().to_string();

        self.bus.send(
            Message::direct(
                inbox.id().clone(),
                self.coordinator_id.clone(),
                payload(json!({ "content": message, "session_id": session_id })),
            )
            .with_correlation_id(correlation_id.clone()),
        );

        let reply = tokio::time::timeout(self.config.chat_timeout, async {
            // Uncorrelated traffic (e.g. broadcasts) is skipped.
            while let Some(message) = inbox.recv().await {
                if message.correlation_id.as_deref() == Some(correlation_id.as_str()) {
                    return Some(message);
                }
            }
            None
        })
        .await;

        Ok(match reply {
            Ok(Some(message)) => ChatReply::from_message(&message, session_id),
            Ok(None) | Err(_) => {
                warn!(session_id = %session_id, "Chat request got no reply in time");
                ChatReply::busy(session_id)
            }
        })
    }

    /// Terminate every agent, the `orchestrator` agent included
    pub async fn shutdown(&self) -> TeardownReport {
        let report = self.orchestrator.terminate_all().await;
        info!(
            stopped = report.stopped.len(),
            faulted = report.faulted.len(),
            "Application context shut down"
        );
        report
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(body: Value) -> Message {
        Message::direct(
            AgentId::parse("orchestrator").unwrap(),
            AgentId::parse("chat-client-1").unwrap(),
            payload(body),
        )
    }

    #[test]
    fn test_reply_fields_map_to_chat_reply() {
        let chat = ChatReply::from_message(
            &reply(json!({"response": "ok", "action": "list_agents", "details": {"agents": []}})),
            "s1".to_string(),
        );
        assert_eq!(chat.response, "ok");
        assert_eq!(chat.action.as_deref(), Some("list_agents"));
        assert_eq!(chat.details, Some(json!({"agents": []})));
        assert_eq!(chat.session_id, "s1");
    }

    #[test]
    fn test_error_reply_becomes_response_text() {
        let chat = ChatReply::from_message(&reply(json!({"error": "nope"})), "s1".into());
        assert_eq!(chat.response, "nope");
        assert_eq!(chat.action, None);
    }

    #[test]
    fn test_missing_response_text() {
        let chat = ChatReply::from_message(&reply(json!({"details": null})), "s1".into());
        assert_eq!(chat.response, EMPTY_RESPONSE);
        assert_eq!(chat.details, None);
    }
}
