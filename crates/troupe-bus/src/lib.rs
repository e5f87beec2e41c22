//! # Troupe Bus
//!
//! In-process mailbox bus for Troupe agents.
//!
//! Each participant owns one unbounded FIFO mailbox keyed by its
//! [`AgentId`]. Messages are delivered point-to-point when they name a
//! recipient and fanned out to every other mailbox when they don't.
//!
//! ## Delivery semantics
//!
//! - **Ordering**: strict FIFO per mailbox; nothing across mailboxes.
//! - **Unknown recipients**: silently dropped. Confirmation is the caller's
//!   job, typically through a correlated reply.
//! - **Broadcast**: best-effort fan-out over the registrations present at
//!   send time, not an atomic snapshot.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use troupe_bus::{AgentId, Message, MessageBus, payload};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(MessageBus::new());
//! let me = AgentId::parse("client")?;
//! let inbox = bus.open(me.clone());
//!
//! bus.send(Message::direct(
//!     AgentId::parse("peer")?,
//!     me,
//!     payload(serde_json::json!({"content": "hello"})),
//! ));
//!
//! let received = inbox.recv().await.expect("mailbox open");
//! assert_eq!(received.text("content"), Some("hello"));
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod error;
pub mod message;
pub mod types;

pub use bus::{Delivery, Mailbox, MessageBus};
pub use error::{BusError, BusResult, IdValidationError};
pub use message::{Message, Payload, payload};
pub use types::{AgentId, MAX_ID_LEN};
