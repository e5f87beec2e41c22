//! Lifecycle driver for a single agent
//!
//! [`AgentRuntime`] owns the receive loop. It opens the agent's mailbox,
//! walks the descriptor through the state machine, and turns any error or
//! panic escaping a hook into a contained fault.
//!
//! Readiness is a separate signal from the state: the loop publishes it once
//! `on_start` has finished (RUNNING) or faulted (FAILED). `start()` returns
//! that value, and `stop()` waits for it before writing STOPPING.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use troupe_bus::{Delivery, Mailbox, MessageBus};

use crate::descriptor::{AgentDescriptor, AgentState};
use crate::error::AgentFault;
use crate::handler::{AgentContext, AgentHandler};

/// Default wait for a message before the idle hook runs
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// State published when the loop became ready, `None` until then
type Readiness = watch::Sender<Option<AgentState>>;

enum Phase {
    /// Built, loop not launched yet
    Ready(Box<dyn AgentHandler>),
    /// Loop task is (or was) running
    Launched {
        stop: watch::Sender<bool>,
        task: JoinHandle<Result<(), AgentFault>>,
    },
    /// Joined
    Finished,
}

/// Drives one agent's handler on its own task
///
/// Single-use: once the loop has exited the runtime cannot be restarted.
pub struct AgentRuntime {
    descriptor: Arc<AgentDescriptor>,
    bus: Arc<MessageBus>,
    idle_timeout: Duration,
    ready: Arc<Readiness>,
    phase: Mutex<Phase>,
}

impl AgentRuntime {
    pub fn new(
        descriptor: Arc<AgentDescriptor>,
        bus: Arc<MessageBus>,
        handler: Box<dyn AgentHandler>,
    ) -> Self {
        Self {
            descriptor,
            bus,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            ready: Arc::new(watch::Sender::new(None)),
            phase: Mutex::new(Phase::Ready(handler)),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn descriptor(&self) -> &Arc<AgentDescriptor> {
        &self.descriptor
    }

    pub fn state(&self) -> AgentState {
        self.descriptor.state()
    }

    /// Launch the loop and wait until it is ready
    ///
    /// Idempotent. Concurrent callers all wait on the same readiness
    /// signal. Returns RUNNING or FAILED: the state the agent reached when
    /// it became ready, even if a concurrent `stop()` has moved it on since.
    pub async fn start(&self) -> AgentState {
        {
            let mut phase = self.phase.lock().await;
            *phase = match std::mem::replace(&mut *phase, Phase::Finished) {
                Phase::Ready(handler) => {
                    let (stop, task) = self.launch(handler);
                    Phase::Launched { stop, task }
                }
                other => other,
            };
        }
        self.readiness().await
    }

    /// Wait for readiness, then signal the loop to exit and join it
    ///
    /// Idempotent. A runtime that was never started is launched first, so
    /// its lifecycle still runs through RUNNING (or FAILED) and `on_stop`.
    /// Returns the fault raised by `on_stop` or by a crashed loop task, if
    /// any; faults raised while running are only recorded on the descriptor.
    pub async fn stop(&self) -> Result<(), AgentFault> {
        let mut phase = self.phase.lock().await;
        let (stop, task) = match std::mem::replace(&mut *phase, Phase::Finished) {
            Phase::Ready(handler) => {
                debug!(agent_id = %self.descriptor.id(), "Stop before start, launching first");
                self.launch(handler)
            }
            Phase::Launched { stop, task } => (stop, task),
            Phase::Finished => return Ok(()),
        };

        // The phase lock stays held through the join so concurrent stop()
        // calls also wait for it.
        self.readiness().await;
        self.descriptor.transition(AgentState::Stopping);
        // Ignored if the loop already exited on its own.
        let _ = stop.send(true);

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let fault = if join_error.is_panic() {
                    AgentFault::from_panic(join_error.into_panic())
                } else {
                    AgentFault::new("agent task cancelled")
                };
                self.descriptor.fail(fault.cause());
                error!(agent_id = %self.descriptor.id(), error = %fault, "Agent task crashed");
                Err(fault)
            }
        }
    }

    fn launch(
        &self,
        handler: Box<dyn AgentHandler>,
    ) -> (watch::Sender<bool>, JoinHandle<Result<(), AgentFault>>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(drive(
            Arc::clone(&self.descriptor),
            Arc::clone(&self.bus),
            Arc::clone(&self.ready),
            self.idle_timeout,
            handler,
            stop_rx,
        ));
        info!(
            agent_id = %self.descriptor.id(),
            role = %self.descriptor.role(),
            "Agent loop launched"
        );
        (stop_tx, task)
    }

    /// State published by the loop once it became ready
    async fn readiness(&self) -> AgentState {
        let mut rx = self.ready.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = rx.wait_for(Option::is_some).await;
        let published = *rx.borrow();
        published.unwrap_or_else(|| self.descriptor.state())
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("descriptor", &self.descriptor)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// Publishes readiness at most once; FAILED if dropped before publishing
struct ReadyGuard(Arc<Readiness>);

impl ReadyGuard {
    fn publish(&self, state: AgentState) {
        self.0.send_if_modified(|published| {
            if published.is_none() {
                *published = Some(state);
                true
            } else {
                false
            }
        });
    }
}

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        self.publish(AgentState::Failed);
    }
}

/// Run a hook, converting a panic into a fault
async fn guarded<F>(call: F) -> Result<(), AgentFault>
where
    F: Future<Output = Result<(), AgentFault>>,
{
    AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(AgentFault::from_panic(panic)))
}

async fn drive(
    descriptor: Arc<AgentDescriptor>,
    bus: Arc<MessageBus>,
    ready: Arc<Readiness>,
    idle_timeout: Duration,
    mut handler: Box<dyn AgentHandler>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), AgentFault> {
    let ready = ReadyGuard(ready);
    let mailbox = bus.open(descriptor.id().clone());
    descriptor.transition(AgentState::Running);
    info!(agent_id = %descriptor.id(), role = %descriptor.role(), "Agent running");

    let ctx = AgentContext::new(Arc::clone(&descriptor), Arc::clone(&bus));
    let outcome = match guarded(handler.on_start(&ctx)).await {
        Ok(()) => {
            ready.publish(AgentState::Running);
            receive(
                handler.as_mut(),
                &ctx,
                &descriptor,
                &mailbox,
                idle_timeout,
                &mut stop,
            )
            .await
        }
        Err(fault) => Err(fault),
    };

    if let Err(fault) = &outcome {
        warn!(agent_id = %descriptor.id(), error = %fault, "Agent faulted");
        descriptor.fail(fault.cause());
    }
    // Releases start() after a startup fault; no-op once RUNNING was published.
    ready.publish(AgentState::Failed);

    let teardown = guarded(handler.on_stop(&ctx)).await;
    drop(mailbox);

    match teardown {
        Ok(()) => {
            if outcome.is_ok() {
                // Covers a loop that exited without an explicit stop request.
                descriptor.transition(AgentState::Stopping);
                descriptor.transition(AgentState::Stopped);
            }
            info!(
                agent_id = %descriptor.id(),
                state = %descriptor.state(),
                tasks = descriptor.task_count(),
                "Agent loop exited"
            );
            Ok(())
        }
        Err(fault) => {
            error!(agent_id = %descriptor.id(), error = %fault, "on_stop faulted");
            descriptor.fail(fault.cause());
            Err(fault)
        }
    }
}

/// Resolves once a stop is signalled or the runtime is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await.map(|_| ());
}

async fn receive(
    handler: &mut dyn AgentHandler,
    ctx: &AgentContext,
    descriptor: &AgentDescriptor,
    mailbox: &Mailbox,
    idle_timeout: Duration,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), AgentFault> {
    loop {
        tokio::select! {
            biased;
            _ = stop_requested(stop) => break,
            delivery = mailbox.recv_timeout(idle_timeout) => match delivery {
                Delivery::Message(message) => {
                    debug!(
                        agent_id = %descriptor.id(),
                        sender_id = %message.sender_id,
                        "Handling message"
                    );
                    guarded(handler.handle_message(ctx, message)).await?;
                    descriptor.record_task();
                }
                Delivery::Idle => guarded(handler.on_idle(ctx)).await?,
                Delivery::Closed => return Err(AgentFault::new("mailbox closed")),
            },
        }
    }

    Ok(())
}
