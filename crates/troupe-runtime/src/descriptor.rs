//! Agent configuration, lifecycle states, and the live descriptor record

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::debug;
use troupe_bus::AgentId;

/// Metadata key that tags an agent with a session
pub const SESSION_KEY: &str = "session_id";

/// Immutable description of an agent to provision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Human-readable name
    pub name: String,
    /// Catalog role the handler is built from
    pub role: String,
    /// Declared external target server
    pub target: String,
    /// Free-form tags; `session_id` groups agents for bulk teardown
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AgentConfig {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            target: target.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tag the agent with a session
    pub fn with_session(self, session_id: impl Into<String>) -> Self {
        self.with_metadata(SESSION_KEY, session_id.into())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.metadata_str(SESSION_KEY)
    }

    /// String-valued metadata entry
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Lifecycle state of one agent
///
/// ```text
/// SPAWNING -> RUNNING -> STOPPING -> STOPPED
///     |          |          |
///     +----------+----------+--> FAILED
/// ```
///
/// There is no shortcut from SPAWNING to STOPPING: a stop always waits for
/// the agent to become ready first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Spawning,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl AgentState {
    /// Whether the machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Spawning, Running)
                | (Spawning, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Stopped | AgentState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Spawning => "spawning",
            AgentState::Running => "running",
            AgentState::Stopping => "stopping",
            AgentState::Stopped => "stopped",
            AgentState::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live record of one supervised agent
///
/// Shared between the registry, the agent's own loop, and any caller that
/// looked it up. State changes are validated against
/// [`AgentState::can_transition_to`]; illegal writes are ignored.
pub struct AgentDescriptor {
    id: AgentId,
    config: AgentConfig,
    state: watch::Sender<AgentState>,
    task_count: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl AgentDescriptor {
    /// New descriptor in SPAWNING
    pub fn new(id: AgentId, config: AgentConfig) -> Self {
        Self {
            id,
            config,
            state: watch::Sender::new(AgentState::Spawning),
            task_count: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn role(&self) -> &str {
        &self.config.role
    }

    pub fn session_id(&self) -> Option<&str> {
        self.config.session_id()
    }

    /// Current state as of this call
    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Messages handled so far
    pub fn task_count(&self) -> u64 {
        self.task_count.load(Ordering::Relaxed)
    }

    /// Cause of the most recent fault, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Wait until the state satisfies `predicate`, returning that state
    pub async fn wait_for(&self, mut predicate: impl FnMut(AgentState) -> bool) -> AgentState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| predicate(*state)).await {
            Ok(state) => *state,
            // The sender lives as long as `self`, so this is unreachable.
            Err(_) => self.state(),
        }
    }

    /// Apply a transition if the machine allows it
    pub(crate) fn transition(&self, next: AgentState) -> bool {
        let applied = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if applied {
            debug!(agent_id = %self.id, state = %next, "State changed");
        }
        applied
    }

    /// Record `cause` and move to FAILED
    ///
    /// A later fault on an already FAILED agent is appended, so the first
    /// cause is never lost.
    pub(crate) fn fail(&self, cause: impl Into<String>) {
        let cause = cause.into();
        {
            let mut last_error = self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match last_error.as_mut() {
                Some(first) if self.state() == AgentState::Failed => {
                    first.push_str("; then ");
                    first.push_str(&cause);
                }
                _ => *last_error = Some(cause),
            }
        }
        self.transition(AgentState::Failed);
    }

    pub(crate) fn record_task(&self) {
        self.task_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Serializable point-in-time view
    pub fn snapshot(&self) -> AgentView {
        AgentView {
            id: self.id.clone(),
            name: self.config.name.clone(),
            role: self.config.role.clone(),
            state: self.state(),
            task_count: self.task_count(),
            last_error: self.last_error(),
        }
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("role", &self.config.role)
            .field("state", &self.state())
            .field("task_count", &self.task_count())
            .finish()
    }
}

/// Boundary shape of an agent: `{id, name, role, state, task_count, last_error}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    pub state: AgentState,
    pub task_count: u64,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use AgentState::*;

    fn descriptor() -> AgentDescriptor {
        AgentDescriptor::new(
            AgentId::parse("agent-1").unwrap(),
            AgentConfig::new("worker", "echo", "echo").with_session("s1"),
        )
    }

    #[rstest]
    #[case(Spawning, Running, true)]
    #[case(Spawning, Stopping, false)]
    #[case(Spawning, Failed, true)]
    #[case(Spawning, Stopped, false)]
    #[case(Running, Stopping, true)]
    #[case(Running, Failed, true)]
    #[case(Running, Stopped, false)]
    #[case(Running, Spawning, false)]
    #[case(Stopping, Stopped, true)]
    #[case(Stopping, Failed, true)]
    #[case(Stopping, Running, false)]
    #[case(Stopped, Running, false)]
    #[case(Stopped, Failed, false)]
    #[case(Failed, Stopping, false)]
    #[case(Failed, Stopped, false)]
    fn test_transition_table(
        #[case] from: AgentState,
        #[case] to: AgentState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_new_descriptor_is_spawning() {
        let d = descriptor();
        assert_eq!(d.state(), Spawning);
        assert_eq!(d.task_count(), 0);
        assert_eq!(d.last_error(), None);
        assert_eq!(d.session_id(), Some("s1"));
    }

    #[test]
    fn test_illegal_write_is_ignored() {
        let d = descriptor();
        assert!(d.transition(Running));
        d.fail("handler exploded");
        assert_eq!(d.state(), Failed);

        // STOPPING never overwrites FAILED.
        assert!(!d.transition(Stopping));
        assert_eq!(d.state(), Failed);
        assert_eq!(d.last_error().as_deref(), Some("handler exploded"));
    }

    #[test]
    fn test_second_fault_keeps_first_cause() {
        let d = descriptor();
        d.transition(Running);
        d.fail("handler exploded");
        d.fail("could not flush");

        assert_eq!(d.state(), Failed);
        assert_eq!(
            d.last_error().as_deref(),
            Some("handler exploded; then could not flush")
        );
    }

    #[test]
    fn test_snapshot_serializes_boundary_shape() {
        let d = descriptor();
        d.transition(Running);
        d.record_task();
        let view = serde_json::to_value(d.snapshot()).unwrap();
        assert_eq!(
            view,
            json!({
                "id": "agent-1",
                "name": "worker",
                "role": "echo",
                "state": "running",
                "task_count": 1,
                "last_error": null,
            })
        );
    }

    #[tokio::test]
    async fn test_wait_for_sees_later_transition() {
        let d = std::sync::Arc::new(descriptor());
        let waiter = {
            let d = d.clone();
            tokio::spawn(async move { d.wait_for(|s| s != Spawning).await })
        };
        tokio::task::yield_now().await;
        d.transition(Running);
        assert_eq!(waiter.await.unwrap(), Running);
    }
}
