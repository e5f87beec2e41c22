//! Mailbox table and message routing
//!
//! Every registered participant owns one unbounded FIFO mailbox. Sends never
//! block and never fail; a message for an unknown recipient is dropped.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

use crate::{message::Message, types::AgentId};

/// Receiving half of a mailbox, shared between the table and open guards
struct Inbox {
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    /// Set once the row is unregistered; nothing is delivered after that
    closed: AtomicBool,
}

impl Inbox {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Close `rx` and drop whatever is still queued, returning how many were dropped
fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> usize {
    rx.close();
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

/// One row of the mailbox table
///
/// Dropping the row drops the only sender, which closes the inbox for any
/// guard still holding it.
struct Registration {
    tx: mpsc::UnboundedSender<Message>,
    inbox: Arc<Inbox>,
}

impl Registration {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            inbox: Arc::new(Inbox {
                rx: Mutex::new(rx),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Mark the inbox closed and throw away whatever is still queued
    ///
    /// When a receiver holds the lock mid-`recv`, it sees the flag and
    /// drains the queue itself before reporting closure.
    fn close(&self) -> usize {
        self.inbox.closed.store(true, Ordering::Release);
        match self.inbox.rx.try_lock() {
            Ok(mut rx) => drain(&mut rx),
            Err(_) => 0,
        }
    }
}

/// In-process message bus
///
/// The mailbox table is only mutated under its own (sharded) lock. Broadcast
/// walks the table as it is at send time; registrations racing with the
/// walk may or may not receive the message.
#[derive(Default)]
pub struct MessageBus {
    mailboxes: DashMap<AgentId, Registration>,
}

impl MessageBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a mailbox exists for `id`. Idempotent.
    pub fn register(&self, id: &AgentId) {
        self.mailboxes.entry(id.clone()).or_insert_with(|| {
            debug!(agent_id = %id, "Registered mailbox");
            Registration::new()
        });
    }

    /// Remove the mailbox for `id`, discarding anything still queued
    pub fn unregister(&self, id: &AgentId) {
        if let Some((_, registration)) = self.mailboxes.remove(id) {
            let discarded = registration.close();
            debug!(agent_id = %id, discarded, "Unregistered mailbox");
        }
    }

    /// Route a message
    ///
    /// With a recipient, enqueue onto that mailbox if it exists. Without one,
    /// enqueue a copy onto every mailbox except the sender's.
    pub fn send(&self, message: Message) {
        match message.recipient_id.clone() {
            Some(recipient) => match self.mailboxes.get(&recipient) {
                Some(registration) => {
                    trace!(
                        from = %message.sender_id,
                        to = %recipient,
                        message_id = %message.id,
                        "Enqueued message"
                    );
                    // A closed receiver means the row is being torn down.
                    let _ = registration.tx.send(message);
                }
                None => {
                    debug!(
                        from = %message.sender_id,
                        to = %recipient,
                        "Dropped message for unknown recipient"
                    );
                }
            },
            None => {
                let mut delivered = 0usize;
                for entry in self.mailboxes.iter() {
                    if *entry.key() == message.sender_id {
                        continue;
                    }
                    if entry.value().tx.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                debug!(from = %message.sender_id, delivered, "Broadcast message");
            }
        }
    }

    /// Register `id` and hand back a guard for receiving
    ///
    /// The mailbox is unregistered when the guard drops, whether the holder
    /// returns, errors, panics, or is cancelled.
    pub fn open(self: &Arc<Self>, id: AgentId) -> Mailbox {
        let inbox = {
            let registration = self.mailboxes.entry(id.clone()).or_insert_with(|| {
                debug!(agent_id = %id, "Registered mailbox");
                Registration::new()
            });
            Arc::clone(&registration.inbox)
        };
        Mailbox {
            id,
            bus: Arc::clone(self),
            inbox,
        }
    }

    /// Whether `id` currently owns a mailbox
    pub fn is_registered(&self, id: &AgentId) -> bool {
        self.mailboxes.contains_key(id)
    }

    /// Identifiers that currently own a mailbox
    pub fn registered(&self) -> Vec<AgentId> {
        self.mailboxes.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered mailboxes
    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    /// Whether no mailbox is registered
    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }

    /// Remove `id` only if its row still holds `inbox`
    fn release(&self, id: &AgentId, inbox: &Arc<Inbox>) {
        let removed = self
            .mailboxes
            .remove_if(id, |_, registration| Arc::ptr_eq(&registration.inbox, inbox));
        if removed.is_some() {
            debug!(agent_id = %id, "Released mailbox");
        }
    }
}

/// Outcome of a bounded receive
#[derive(Debug)]
pub enum Delivery {
    /// A message arrived
    Message(Message),
    /// Nothing arrived before the deadline
    Idle,
    /// The registration was removed and the queue is drained
    Closed,
}

/// Scoped access to one mailbox
///
/// Created by [`MessageBus::open`]. Dropping it unregisters the mailbox it
/// opened; a newer registration under the same id is left untouched.
pub struct Mailbox {
    id: AgentId,
    bus: Arc<MessageBus>,
    inbox: Arc<Inbox>,
}

impl Mailbox {
    /// Owner of this mailbox
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Wait for the next message; `None` once the mailbox is unregistered
    ///
    /// Messages still queued at unregistration are discarded, never
    /// delivered.
    pub async fn recv(&self) -> Option<Message> {
        let mut rx = self.inbox.rx.lock().await;
        if self.inbox.is_closed() {
            drain(&mut rx);
            return None;
        }
        let message = rx.recv().await;
        if self.inbox.is_closed() {
            let discarded = drain(&mut rx) + usize::from(message.is_some());
            trace!(agent_id = %self.id, discarded, "Discarded mail after unregister");
            return None;
        }
        message
    }

    /// Wait for the next message for at most `timeout`
    pub async fn recv_timeout(&self, timeout: Duration) -> Delivery {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(message)) => Delivery::Message(message),
            Ok(None) => Delivery::Closed,
            Err(_) => Delivery::Idle,
        }
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.bus.release(&self.id, &self.inbox);
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("id", &self.id).finish()
    }
}
