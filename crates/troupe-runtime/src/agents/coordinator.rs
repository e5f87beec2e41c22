//! The `orchestrator` agent: natural-language control over the orchestrator
//!
//! Requests arrive as `{"content", "session_id"}`. The pooled model is asked
//! for a JSON action; when its answer does not parse, keyword heuristics
//! decide. Replies carry `{"response", "action", "details"}`, or `{"error"}`.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use troupe_bus::{AgentId, Message, payload};
use troupe_pool::CompletionRequest;

use crate::descriptor::AgentConfig;
use crate::error::{AgentFault, OrchestratorError};
use crate::handler::{AgentContext, AgentHandler};
use crate::orchestrator::Orchestrator;

/// Well-known identifier of the coordinator agent
pub const ORCHESTRATOR_AGENT_ID: &str = "orchestrator";

/// Session used when a request names none
pub const DEFAULT_SESSION: &str = "default";

pub const UNKNOWN_REQUEST_REPLY: &str =
    "I didn't understand that request. Try asking me to create, list, or terminate agents.";

const INSTRUCTIONS: &str = r#"You are an orchestrator agent that manages other AI agents.
Users can ask you to:
- Create new agents (specify role: llm or echo)
- List active agents
- Terminate agents
- Send a message to an agent

Respond with JSON in this format:
{
  "type": "create_agent" | "list_agents" | "terminate_agent" | "send_message" | "unknown",
  "params": {
    "role": "llm|echo",      // for create_agent
    "name": "...",           // optional for create_agent
    "model": "gpt-4",        // optional for create_agent
    "agent_id": "...",       // for terminate_agent or send_message
    "message": "..."         // for send_message
  }
}"#;

/// What a request asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateAgent {
        role: Option<String>,
        name: Option<String>,
        model: Option<String>,
    },
    ListAgents,
    TerminateAgent {
        agent_id: Option<String>,
    },
    SendMessage {
        agent_id: Option<String>,
        message: Option<String>,
    },
    Unknown,
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::CreateAgent { .. } => "create_agent",
            Action::ListAgents => "list_agents",
            Action::TerminateAgent { .. } => "terminate_agent",
            Action::SendMessage { .. } => "send_message",
            Action::Unknown => "unknown",
        }
    }

    /// Parse the model's `{"type", "params"}` answer
    pub fn from_json(value: &Value) -> Option<Self> {
        let params = value.get("params");
        let param = |key: &str| {
            params
                .and_then(|p| p.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let action = match value.get("type")?.as_str()? {
            "create_agent" => Action::CreateAgent {
                role: param("role"),
                name: param("name"),
                model: param("model"),
            },
            "list_agents" => Action::ListAgents,
            "terminate_agent" => Action::TerminateAgent {
                agent_id: param("agent_id"),
            },
            "send_message" => Action::SendMessage {
                agent_id: param("agent_id"),
                message: param("message"),
            },
            _ => Action::Unknown,
        };
        Some(action)
    }

    /// Parse a model answer, unwrapping a fenced code block if present
    pub fn from_model_output(content: &str) -> Option<Self> {
        let body = fenced_block(content).unwrap_or(content).trim();
        let value: Value = serde_json::from_str(body).ok()?;
        Self::from_json(&value)
    }

    /// Keyword fallback over the raw request
    pub fn from_keywords(request: &str) -> Self {
        let lower = request.to_lowercase();
        if lower.contains("create") || lower.contains("spawn") {
            let role = if lower.contains("llm") { "llm" } else { "echo" };
            Action::CreateAgent {
                role: Some(role.to_string()),
                name: None,
                model: None,
            }
        } else if lower.contains("list") {
            Action::ListAgents
        } else if lower.contains("terminate") || lower.contains("delete") {
            Action::TerminateAgent { agent_id: None }
        } else {
            Action::Unknown
        }
    }
}

fn fenced_block(content: &str) -> Option<&str> {
    let (_, rest) = content
        .split_once("```json")
        .or_else(|| content.split_once("```"))?;
    rest.split_once("```").map(|(block, _)| block)
}

struct Outcome {
    message: String,
    details: Value,
}

impl Outcome {
    fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }
}

/// Handler for the `orchestrator` agent
///
/// Holds the orchestrator weakly: the orchestrator's registry owns this
/// agent's runtime.
pub struct CoordinatorHandler {
    orchestrator: Weak<Orchestrator>,
    model: String,
}

impl CoordinatorHandler {
    pub fn new(orchestrator: &Arc<Orchestrator>, model: impl Into<String>) -> Self {
        Self {
            orchestrator: Arc::downgrade(orchestrator),
            model: model.into(),
        }
    }

    fn orchestrator(&self) -> Result<Arc<Orchestrator>, AgentFault> {
        self.orchestrator
            .upgrade()
            .ok_or_else(|| AgentFault::new("orchestrator has shut down"))
    }

    async fn interpret(&self, orch: &Orchestrator, request: &str) -> Result<Action, AgentFault> {
        let client = orch.pool().acquire(&self.model).await?;
        let answer = client
            .complete(
                CompletionRequest::new(self.model.clone(), request)
                    .with_system_prompt(INSTRUCTIONS)
                    .with_temperature(0.3),
            )
            .await?;

        Ok(match Action::from_model_output(&answer.content) {
            Some(action) => action,
            None => {
                debug!(model = %self.model, "Model answer was not an action, using keywords");
                Action::from_keywords(request)
            }
        })
    }

    async fn execute(
        &self,
        ctx: &AgentContext,
        orch: &Orchestrator,
        action: Action,
        session_id: &str,
    ) -> Result<Outcome, OrchestratorError> {
        match action {
            Action::CreateAgent { role, name, model } => {
                let role = role.unwrap_or_else(|| "llm".to_string());
                let name = name.unwrap_or_else(|| format!("agent-{}", orch.len() + 1));
                let model = model.unwrap_or_else(|| self.model.clone());
                let config = AgentConfig::new(name, role.clone(), "echo")
                    .with_session(session_id)
                    .with_metadata("model", model);

                let descriptor = orch.spawn(config).await?;
                info!(
                    agent_id = %descriptor.id(),
                    role = %role,
                    session_id = %session_id,
                    "Created agent on request"
                );
                Ok(Outcome::new(
                    format!("Created {role} agent: {}", descriptor.id()),
                    json!({
                        "agent_id": descriptor.id(),
                        "name": descriptor.name(),
                        "role": role,
                    }),
                ))
            }
            Action::ListAgents => {
                let agents: Vec<_> = orch
                    .list_by_session(session_id)
                    .iter()
                    .map(|d| d.snapshot())
                    .collect();
                Ok(Outcome::new(
                    format!("Found {} active agents in this session", agents.len()),
                    json!({ "agents": agents }),
                ))
            }
            Action::TerminateAgent { agent_id } => {
                let Some(raw) = agent_id else {
                    return Ok(Outcome::new("No agent_id provided", json!({})));
                };
                let id = AgentId::parse(&raw)?;
                if &id == ctx.id() {
                    return Ok(Outcome::new(
                        "The orchestrator agent cannot terminate itself",
                        json!({}),
                    ));
                }
                let message = if orch.terminate(&id).await? {
                    format!("Terminated agent {id}")
                } else {
                    format!("No agent {id} is running")
                };
                Ok(Outcome::new(message, json!({ "agent_id": id })))
            }
            Action::SendMessage { agent_id, message } => {
                let (Some(raw), Some(text)) = (agent_id, message) else {
                    return Ok(Outcome::new("Both agent_id and message are required", json!({})));
                };
                let id = AgentId::parse(&raw)?;
                let message_id = orch.dispatch(
                    ctx.id().clone(),
                    Some(id.clone()),
                    payload(json!({ "content": text })),
                );
                Ok(Outcome::new(
                    format!("Sent message to agent {id}"),
                    json!({ "agent_id": id, "message_id": message_id }),
                ))
            }
            Action::Unknown => Ok(Outcome::new(UNKNOWN_REQUEST_REPLY, json!({}))),
        }
    }

    async fn respond(
        &self,
        ctx: &AgentContext,
        request: &str,
        session_id: &str,
    ) -> Result<Value, AgentFault> {
        let orch = self.orchestrator()?;
        let action = self.interpret(&orch, request).await?;
        let kind = action.kind();
        let outcome = self
            .execute(ctx, &orch, action, session_id)
            .await
            .map_err(|e| AgentFault::new(e.to_string()))?;
        Ok(json!({
            "response": outcome.message,
            "action": kind,
            "details": outcome.details,
        }))
    }
}

#[async_trait]
impl AgentHandler for CoordinatorHandler {
    async fn handle_message(
        &mut self,
        ctx: &AgentContext,
        message: Message,
    ) -> Result<(), AgentFault> {
        let Some(request) = message.text("content").filter(|c| !c.is_empty()) else {
            return Ok(());
        };
        let session_id = message.text("session_id").unwrap_or(DEFAULT_SESSION);

        // Failures go back to the requester; they never fail this agent.
        let body = match self.respond(ctx, request, session_id).await {
            Ok(body) => body,
            Err(fault) => json!({ "error": fault.to_string() }),
        };
        ctx.reply(&message, payload(body));
        Ok(())
    }
}

impl std::fmt::Debug for CoordinatorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandler")
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json_answer() {
        let answer = "Sure!\n```json\n{\"type\": \"create_agent\", \"params\": {\"role\": \"echo\"}}\n```";
        assert_eq!(
            Action::from_model_output(answer),
            Some(Action::CreateAgent {
                role: Some("echo".into()),
                name: None,
                model: None,
            })
        );
    }

    #[test]
    fn test_parses_bare_json_without_params() {
        assert_eq!(
            Action::from_model_output(r#"{"type": "list_agents"}"#),
            Some(Action::ListAgents)
        );
        assert_eq!(
            Action::from_model_output(r#"{"type": "dance"}"#),
            Some(Action::Unknown)
        );
    }

    #[test]
    fn test_prose_is_not_an_action() {
        assert_eq!(
            Action::from_model_output("Mock response from gpt-4: I received 'hi'"),
            None
        );
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(
            Action::from_keywords("Please spawn an LLM helper"),
            Action::CreateAgent {
                role: Some("llm".into()),
                name: None,
                model: None,
            }
        );
        assert_eq!(
            Action::from_keywords("create something"),
            Action::CreateAgent {
                role: Some("echo".into()),
                name: None,
                model: None,
            }
        );
        assert_eq!(Action::from_keywords("list my agents"), Action::ListAgents);
        assert_eq!(
            Action::from_keywords("delete agent-1"),
            Action::TerminateAgent { agent_id: None }
        );
        assert_eq!(Action::from_keywords("what time is it"), Action::Unknown);
    }
}
