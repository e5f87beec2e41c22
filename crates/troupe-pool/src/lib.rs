//! # Troupe Pool
//!
//! Shared, concurrency-limited model clients for Troupe agents.
//!
//! A [`ResourcePool`] maps a resource name (usually a model name) to a
//! semaphore with a fixed number of slots and a lazily built
//! [`ModelClient`]. Agents call [`ResourcePool::acquire`] and use the
//! returned [`PoolGuard`]; the slot goes back when the guard drops.
//!
//! ```rust
//! use troupe_pool::{CompletionRequest, ResourceConfig, ResourcePool};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ResourcePool::new();
//! pool.register("gpt-4", ResourceConfig::stub(4))?;
//!
//! let client = pool.acquire("gpt-4").await?;
//! let reply = client.complete(CompletionRequest::new("gpt-4", "hi")).await?;
//! assert!(reply.content.contains("hi"));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod pool;

pub use backend::{
    ClientFactory, DEFAULT_STUB_LATENCY, HttpBackendConfig, HttpFactory, ModelBackend, StubFactory,
};
pub use client::{
    CompletionRequest, CompletionResponse, HttpModelClient, ModelClient, StubModelClient,
};
pub use error::{PoolError, PoolResult};
pub use pool::{MAX_CONCURRENT_LIMIT, PoolGuard, ResourceConfig, ResourcePool};
