use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;
use troupe_bus::{Message, payload};
use troupe_pool::{CompletionRequest, PoolResult, ResourcePool};

use crate::descriptor::AgentConfig;
use crate::error::AgentFault;
use crate::handler::{AgentContext, AgentHandler};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant agent in a multi-agent system.";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Answers prompts with a pooled model client
///
/// Reads `model`, `system_prompt`, and `temperature` from metadata. Model
/// failures are reported back to the sender, not raised as faults.
#[derive(Debug)]
pub struct LlmHandler {
    name: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    pool: Arc<ResourcePool>,
}

impl LlmHandler {
    pub fn from_config(config: &AgentConfig, pool: Arc<ResourcePool>) -> Self {
        Self {
            name: config.name.clone(),
            model: config
                .metadata_str("model")
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            system_prompt: config
                .metadata_str("system_prompt")
                .unwrap_or(DEFAULT_SYSTEM_PROMPT)
                .to_string(),
            temperature: config
                .metadata
                .get("temperature")
                .and_then(Value::as_f64)
                .map_or(DEFAULT_TEMPERATURE, |t| t as f32),
            pool,
        }
    }

    async fn complete(&self, prompt: &str) -> PoolResult<String> {
        let client = self.pool.acquire(&self.model).await?;
        let request = CompletionRequest::new(self.model.clone(), prompt)
            .with_system_prompt(self.system_prompt.clone())
            .with_temperature(self.temperature);
        Ok(client.complete(request).await?.content)
    }
}

#[async_trait]
impl AgentHandler for LlmHandler {
    async fn handle_message(
        &mut self,
        ctx: &AgentContext,
        message: Message,
    ) -> Result<(), AgentFault> {
        let Some(prompt) = message.text("prompt").or_else(|| message.text("content")) else {
            return Ok(());
        };

        let body = match self.complete(prompt).await {
            Ok(response) => json!({
                "response": response,
                "model": self.model,
                "agent_name": self.name,
            }),
            Err(e) => {
                warn!(agent_id = %ctx.id(), model = %self.model, error = %e, "Completion failed");
                json!({ "error": e.to_string(), "agent_name": self.name })
            }
        };
        ctx.reply(&message, payload(body));
        Ok(())
    }
}
