//! Concurrency-limited access to shared model clients
//!
//! Each registered resource gets its own semaphore sized to its holder cap.
//! The semaphore is the only arbiter of concurrent use; no lock is held
//! while a caller uses a client.

use dashmap::DashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::backend::{ClientFactory, HttpBackendConfig, ModelBackend};
use crate::client::ModelClient;
use crate::error::{PoolError, PoolResult};

/// Largest holder cap a resource may declare
pub const MAX_CONCURRENT_LIMIT: usize = Semaphore::MAX_PERMITS;

/// Declaration of one pooled resource
#[derive(Clone)]
pub struct ResourceConfig {
    /// Maximum simultaneous holders
    pub max_concurrent: usize,
    /// How to build the client on first use
    pub factory: Arc<dyn ClientFactory>,
}

impl ResourceConfig {
    pub fn new(max_concurrent: usize, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            max_concurrent,
            factory,
        }
    }

    /// Stand-in backend with default latency
    pub fn stub(max_concurrent: usize) -> Self {
        Self::from_backend(ModelBackend::default(), max_concurrent)
    }

    /// Real HTTP backend
    pub fn http(config: HttpBackendConfig, max_concurrent: usize) -> Self {
        Self::from_backend(ModelBackend::Http(config), max_concurrent)
    }

    pub fn from_backend(backend: ModelBackend, max_concurrent: usize) -> Self {
        Self::new(max_concurrent, backend.into_factory())
    }
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("max_concurrent", &self.max_concurrent)
            .field("backend", &self.factory.backend())
            .finish()
    }
}

struct PoolEntry {
    limiter: Arc<Semaphore>,
    max_concurrent: usize,
    factory: Arc<dyn ClientFactory>,
    client: OnceCell<Arc<dyn ModelClient>>,
}

/// Pool of lazily built, concurrency-capped model clients
#[derive(Default)]
pub struct ResourcePool {
    entries: DashMap<String, Arc<PoolEntry>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource, replacing any earlier declaration under `name`
    ///
    /// Holders of the replaced entry keep their client and slot until they
    /// release; new acquirers see only the new entry.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `max_concurrent` is zero or above
    /// [`MAX_CONCURRENT_LIMIT`].
    pub fn register(&self, name: impl Into<String>, config: ResourceConfig) -> PoolResult<()> {
        let name = name.into();
        if config.max_concurrent == 0 {
            return Err(PoolError::InvalidConfig(format!(
                "max_concurrent for '{name}' must be greater than 0"
            )));
        }
        if config.max_concurrent > MAX_CONCURRENT_LIMIT {
            return Err(PoolError::InvalidConfig(format!(
                "max_concurrent for '{name}' must be at most {MAX_CONCURRENT_LIMIT}"
            )));
        }
        let entry = Arc::new(PoolEntry {
            limiter: Arc::new(Semaphore::new(config.max_concurrent)),
            max_concurrent: config.max_concurrent,
            factory: config.factory,
            client: OnceCell::new(),
        });
        info!(
            resource = %name,
            max_concurrent = entry.max_concurrent,
            backend = entry.factory.backend(),
            "Registered pooled resource"
        );
        if self.entries.insert(name.clone(), entry).is_some() {
            debug!(resource = %name, "Replaced earlier registration");
        }
        Ok(())
    }

    /// Wait for a slot on `name` and hand out its client
    ///
    /// Fails immediately with `NotRegistered` for unknown names. Otherwise
    /// waits (never fails) for a free slot, builds the client if this is the
    /// first successful use, and returns a guard that frees the slot when
    /// dropped, including on cancellation.
    ///
    /// # Errors
    ///
    /// `NotRegistered`, or `Construction` when building the client fails.
    /// A failed build is not remembered; the next acquirer tries again.
    pub async fn acquire(&self, name: &str) -> PoolResult<PoolGuard> {
        let entry = self
            .entries
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| PoolError::NotRegistered(name.to_string()))?;

        // The limiter is never closed, so acquisition only ever waits.
        let permit = Arc::clone(&entry.limiter)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Backend(format!("limiter for '{name}' closed")))?;

        let client = entry
            .client
            .get_or_try_init(|| async {
                debug!(resource = %name, backend = entry.factory.backend(), "Constructing client");
                entry.factory.build(name).await
            })
            .await
            .map_err(|e| {
                warn!(resource = %name, error = %e, "Client construction failed");
                e
            })?;

        Ok(PoolGuard {
            resource: name.to_string(),
            client: Arc::clone(client),
            _permit: permit,
        })
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Free slots right now, `None` for unknown names
    pub fn available_slots(&self, name: &str) -> Option<usize> {
        self.entries
            .get(name)
            .map(|e| e.value().limiter.available_permits())
    }

    /// Holder cap, `None` for unknown names
    pub fn max_concurrent(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|e| e.value().max_concurrent)
    }

    /// Whether the client behind `name` has been built
    pub fn is_initialized(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.value().client.initialized())
    }

    /// Registered resource names
    pub fn resources(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("resources", &self.resources())
            .finish()
    }
}

/// A held slot on one pooled resource
///
/// Derefs to the client. The slot is returned when the guard drops.
pub struct PoolGuard {
    resource: String,
    client: Arc<dyn ModelClient>,
    _permit: OwnedSemaphorePermit,
}

impl PoolGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }
}

impl Deref for PoolGuard {
    type Target = dyn ModelClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl fmt::Debug for PoolGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolGuard")
            .field("resource", &self.resource)
            .field("backend", &self.client.backend())
            .finish()
    }
}
