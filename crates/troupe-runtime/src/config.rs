//! # Environment-Based Configuration
//!
//! Runtime settings are resolved once at startup and handed to
//! [`AppContext::bootstrap`](crate::AppContext::bootstrap).
//!
//! ## Environment Variables
//!
//! ### Runtime
//! - `TROUPE_IDLE_TIMEOUT_MS` - Receive-loop idle timeout in milliseconds (default: 500)
//! - `TROUPE_CHAT_TIMEOUT_SECS` - Chat reply timeout in seconds (default: 30)
//! - `TROUPE_ENVIRONMENT` - Deployment environment label (default: development)
//!
//! ### Model backend
//! - `TROUPE_MODEL_BACKEND` - `stub` or `http` (default: stub)
//! - `TROUPE_MODEL_NAME` - Resource name registered in the pool (default: gpt-4)
//! - `TROUPE_MODEL_MAX_CONCURRENT` - Concurrent holders of the model (default: 50, at most the semaphore limit)
//! - `TROUPE_MODEL_ENDPOINT` - Base URL of the deployment (required for http)
//! - `TROUPE_MODEL_API_KEY` - API key (required for http)
//! - `TROUPE_MODEL_API_VERSION` - API version (default: 2024-02-15-preview)
//! - `TROUPE_MODEL_DEPLOYMENT` - Deployment name (default: gpt-4)

use std::{env, time::Duration};
use troupe_pool::{DEFAULT_STUB_LATENCY, HttpBackendConfig, MAX_CONCURRENT_LIMIT, ModelBackend};

use crate::error::ConfigError;

/// Which model backend to register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Http,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stub" | "mock" => Ok(BackendKind::Stub),
            "http" | "azure" | "openai" => Ok(BackendKind::Http),
            other => Err(format!("unknown backend '{other}', expected stub or http")),
        }
    }
}

/// Resolved runtime settings
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub idle_timeout: Duration,
    pub chat_timeout: Duration,
    pub environment: String,
    pub model_name: String,
    pub model_max_concurrent: usize,
    pub model_backend: ModelBackend,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(500),
            chat_timeout: Duration::from_secs(30),
            environment: "development".to_string(),
            model_name: "gpt-4".to_string(),
            model_max_concurrent: 50,
            model_backend: ModelBackend::default(),
        }
    }
}

/// Builder for [`RuntimeConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct RuntimeConfigBuilder {
    idle_timeout_ms: u64,
    chat_timeout_secs: u64,
    environment: String,
    model_name: String,
    model_max_concurrent: usize,
    backend: BackendKind,
    stub_latency: Duration,
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    deployment: Option<String>,
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 500,
            chat_timeout_secs: 30,
            environment: "development".to_string(),
            model_name: "gpt-4".to_string(),
            model_max_concurrent: 50,
            backend: BackendKind::Stub,
            stub_latency: DEFAULT_STUB_LATENCY,
            endpoint: None,
            api_key: None,
            api_version: None,
            deployment: None,
        }
    }
}

impl RuntimeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(ms) = get_env_u64("TROUPE_IDLE_TIMEOUT_MS")? {
            builder = builder.idle_timeout_ms(ms);
        }
        if let Some(secs) = get_env_u64("TROUPE_CHAT_TIMEOUT_SECS")? {
            builder = builder.chat_timeout_secs(secs);
        }
        if let Some(environment) = get_env_string("TROUPE_ENVIRONMENT") {
            builder = builder.environment(environment);
        }

        if let Some(raw) = get_env_string("TROUPE_MODEL_BACKEND") {
            let kind = raw
                .parse::<BackendKind>()
                .map_err(|message| ConfigError::InvalidEnvVar {
                    key: "TROUPE_MODEL_BACKEND".to_string(),
                    message,
                })?;
            builder = builder.backend(kind);
        }
        if let Some(name) = get_env_string("TROUPE_MODEL_NAME") {
            builder = builder.model_name(name);
        }
        if let Some(max) = get_env_usize("TROUPE_MODEL_MAX_CONCURRENT")? {
            builder = builder.model_max_concurrent(max);
        }
        builder.endpoint = get_env_string("TROUPE_MODEL_ENDPOINT");
        builder.api_key = get_env_string("TROUPE_MODEL_API_KEY");
        builder.api_version = get_env_string("TROUPE_MODEL_API_VERSION");
        builder.deployment = get_env_string("TROUPE_MODEL_DEPLOYMENT");

        Ok(builder)
    }

    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    pub fn chat_timeout_secs(mut self, secs: u64) -> Self {
        self.chat_timeout_secs = secs;
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn model_max_concurrent(mut self, max: usize) -> Self {
        self.model_max_concurrent = max;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Simulated latency of the stub backend
    pub fn stub_latency(mut self, latency: Duration) -> Self {
        self.stub_latency = latency;
        self
    }

    /// Real endpoint settings; also selects the http backend
    pub fn http_endpoint(mut self, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.backend = BackendKind::Http;
        self.endpoint = Some(endpoint.into());
        self.api_key = Some(api_key.into());
        self
    }

    pub fn deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Validate configuration and build `RuntimeConfig`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.validate()?;

        let model_backend = match self.backend {
            BackendKind::Stub => ModelBackend::Stub {
                latency: self.stub_latency,
            },
            BackendKind::Http => {
                let (Some(endpoint), Some(api_key)) = (self.endpoint, self.api_key) else {
                    return Err(ConfigError::ValidationError(
                        "http backend requires TROUPE_MODEL_ENDPOINT and TROUPE_MODEL_API_KEY"
                            .to_string(),
                    ));
                };
                let mut http = HttpBackendConfig::new(endpoint, api_key);
                if let Some(version) = self.api_version {
                    http = http.with_api_version(version);
                }
                if let Some(deployment) = self.deployment {
                    http = http.with_deployment(deployment);
                }
                ModelBackend::Http(http)
            }
        };

        Ok(RuntimeConfig {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            chat_timeout: Duration::from_secs(self.chat_timeout_secs),
            environment: self.environment,
            model_name: self.model_name,
            model_max_concurrent: self.model_max_concurrent,
            model_backend,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "idle_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.chat_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "chat_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.chat_timeout_secs > 300 {
            return Err(ConfigError::ValidationError(
                "chat_timeout_secs must be <= 300 (5 minutes)".to_string(),
            ));
        }
        if self.model_max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "model_max_concurrent must be greater than 0".to_string(),
            ));
        }
        if self.model_max_concurrent > MAX_CONCURRENT_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "model_max_concurrent must be <= {MAX_CONCURRENT_LIMIT}"
            )));
        }
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "model_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Environment variable helper functions

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
