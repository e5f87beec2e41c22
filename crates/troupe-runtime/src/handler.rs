//! The capability set every agent kind implements

use async_trait::async_trait;
use std::sync::Arc;
use troupe_bus::{AgentId, Message, MessageBus, Payload};

use crate::descriptor::{AgentConfig, AgentDescriptor};
use crate::error::AgentFault;

/// Role-specific behaviour driven by an [`AgentRuntime`](crate::AgentRuntime)
///
/// The runtime owns the receive loop; implementors only react. Calls are
/// serialized: at most one hook or handler runs at a time for a given agent.
/// Returning an error (or panicking) from any method marks the agent FAILED.
#[async_trait]
pub trait AgentHandler: Send {
    /// Handle one inbound message
    async fn handle_message(
        &mut self,
        ctx: &AgentContext,
        message: Message,
    ) -> Result<(), AgentFault>;

    /// Runs after RUNNING, before the first receive
    async fn on_start(&mut self, _ctx: &AgentContext) -> Result<(), AgentFault> {
        Ok(())
    }

    /// Runs once per idle timeout with nothing received
    async fn on_idle(&mut self, _ctx: &AgentContext) -> Result<(), AgentFault> {
        Ok(())
    }

    /// Runs exactly once when the loop exits, after success or failure
    async fn on_stop(&mut self, _ctx: &AgentContext) -> Result<(), AgentFault> {
        Ok(())
    }
}

/// What a handler can see and do while running
#[derive(Clone)]
pub struct AgentContext {
    descriptor: Arc<AgentDescriptor>,
    bus: Arc<MessageBus>,
}

impl AgentContext {
    pub(crate) fn new(descriptor: Arc<AgentDescriptor>, bus: Arc<MessageBus>) -> Self {
        Self { descriptor, bus }
    }

    pub fn id(&self) -> &AgentId {
        self.descriptor.id()
    }

    pub fn config(&self) -> &AgentConfig {
        self.descriptor.config()
    }

    pub fn descriptor(&self) -> &Arc<AgentDescriptor> {
        &self.descriptor
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Send `payload` to `recipient`
    pub fn send(&self, recipient: AgentId, payload: Payload) {
        self.bus
            .send(Message::direct(self.id().clone(), recipient, payload));
    }

    /// Send `payload` to every other mailbox
    pub fn broadcast(&self, payload: Payload) {
        self.bus.send(Message::broadcast(self.id().clone(), payload));
    }

    /// Answer `message`'s sender, keeping its correlation id
    pub fn reply(&self, message: &Message, payload: Payload) {
        self.bus.send(message.reply_to(self.id().clone(), payload));
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("id", self.id())
            .finish()
    }
}
