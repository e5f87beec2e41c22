//! Backend selection and client construction recipes
//!
//! Whether a resource talks to a real endpoint or to the stand-in is decided
//! once, when the resource is registered. Nothing is checked at runtime and
//! nothing silently downgrades.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{HttpModelClient, ModelClient, StubModelClient};
use crate::error::{PoolError, PoolResult};

/// Default latency of the stand-in client
pub const DEFAULT_STUB_LATENCY: Duration = Duration::from_millis(100);

/// Connection settings for an OpenAI-compatible deployment
#[derive(Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: "2024-02-15-preview".to_string(),
            deployment: "gpt-4".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = deployment.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// Keep the key out of logs.
impl fmt::Debug for HttpBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackendConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Which kind of client a resource is backed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    /// In-process stand-in
    Stub { latency: Duration },
    /// Real endpoint
    Http(HttpBackendConfig),
}

impl Default for ModelBackend {
    fn default() -> Self {
        ModelBackend::Stub {
            latency: DEFAULT_STUB_LATENCY,
        }
    }
}

impl ModelBackend {
    /// Construction recipe for this backend
    pub fn into_factory(self) -> Arc<dyn ClientFactory> {
        match self {
            ModelBackend::Stub { latency } => Arc::new(StubFactory { latency }),
            ModelBackend::Http(config) => Arc::new(HttpFactory { config }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelBackend::Stub { .. } => "stub",
            ModelBackend::Http(_) => "http",
        }
    }
}

/// Deferred construction of a pooled client
///
/// Called at most once per successful registration; a failed build is
/// retried by the next acquirer.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, resource: &str) -> PoolResult<Arc<dyn ModelClient>>;

    /// Short label for logs
    fn backend(&self) -> &'static str;
}

/// Builds [`StubModelClient`]s
#[derive(Debug, Clone)]
pub struct StubFactory {
    pub latency: Duration,
}

#[async_trait]
impl ClientFactory for StubFactory {
    async fn build(&self, resource: &str) -> PoolResult<Arc<dyn ModelClient>> {
        Ok(Arc::new(StubModelClient::new(resource, self.latency)))
    }

    fn backend(&self) -> &'static str {
        "stub"
    }
}

/// Builds [`HttpModelClient`]s
#[derive(Debug, Clone)]
pub struct HttpFactory {
    pub config: HttpBackendConfig,
}

#[async_trait]
impl ClientFactory for HttpFactory {
    async fn build(&self, resource: &str) -> PoolResult<Arc<dyn ModelClient>> {
        let client = HttpModelClient::new(&self.config).map_err(|e| PoolError::Construction {
            resource: resource.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(client))
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = HttpBackendConfig::new("https://example.com", "super-secret");
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_http_factory_reports_construction_failure() {
        let factory = ModelBackend::Http(HttpBackendConfig::new("::nope::", "k")).into_factory();
        match factory.build("gpt-4").await {
            Err(PoolError::Construction { resource, .. }) => assert_eq!(resource, "gpt-4"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("construction should fail"),
        }
    }

    #[tokio::test]
    async fn test_stub_factory_builds_stub() {
        let factory = ModelBackend::default().into_factory();
        let client = factory.build("gpt-4").await.unwrap();
        assert_eq!(client.backend(), "stub");
        assert_eq!(factory.backend(), "stub");
    }
}
