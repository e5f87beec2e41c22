use async_trait::async_trait;
use serde_json::{Value, json};
use std::ops::RangeInclusive;
use std::time::Duration;
use troupe_bus::{Message, payload};

use crate::descriptor::AgentConfig;
use crate::error::AgentFault;
use crate::handler::{AgentContext, AgentHandler};

/// Default simulated work per message, in milliseconds
pub const DEFAULT_ECHO_DELAY_MS: RangeInclusive<u64> = 50..=200;

/// Replies `{"echo": "<name> heard <content>"}` to whoever wrote
///
/// The work delay can be pinned through the `work_delay_ms` metadata key.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    name: String,
    delay_ms: RangeInclusive<u64>,
}

impl EchoHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay_ms: DEFAULT_ECHO_DELAY_MS,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let handler = Self::new(config.name.clone());
        match config.metadata.get("work_delay_ms").and_then(Value::as_u64) {
            Some(ms) => handler.with_delay_ms(ms..=ms),
            None => handler,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: RangeInclusive<u64>) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    fn work_delay(&self) -> Duration {
        if self.delay_ms.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(self.delay_ms.clone()))
    }
}

#[async_trait]
impl AgentHandler for EchoHandler {
    async fn handle_message(
        &mut self,
        ctx: &AgentContext,
        message: Message,
    ) -> Result<(), AgentFault> {
        let content = match message.payload.get("content") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let delay = self.work_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        ctx.reply(
            &message,
            payload(json!({ "echo": format!("{} heard {content}", self.name) })),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_pins_delay() {
        let config = AgentConfig::new("e", "echo", "echo").with_metadata("work_delay_ms", 0);
        let handler = EchoHandler::from_config(&config);
        assert_eq!(handler.work_delay(), Duration::ZERO);
    }

    #[test]
    fn test_default_delay_in_range() {
        let handler = EchoHandler::new("e");
        let delay = handler.work_delay();
        assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(200));
    }
}
