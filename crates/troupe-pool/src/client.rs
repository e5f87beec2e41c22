//! Model clients handed out by the pool
//!
//! [`ModelClient`] is the only capability agents see. Two implementations
//! ship here: a deterministic stand-in and an HTTP client for
//! OpenAI-compatible chat-completions deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::backend::HttpBackendConfig;
use crate::error::{PoolError, PoolResult};

/// A single-turn completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model (or deployment) name
    pub model: String,
    /// Optional system instruction
    pub system_prompt: Option<String>,
    /// User turn
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            prompt: prompt.into(),
            temperature: 0.7,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Assistant reply to a [`CompletionRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
}

/// Shared handle to an external, rate-limited model endpoint
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion
    async fn complete(&self, request: CompletionRequest) -> PoolResult<CompletionResponse>;

    /// Short backend label for logs
    fn backend(&self) -> &'static str;
}

/// Stand-in client that answers without leaving the process
#[derive(Debug, Clone)]
pub struct StubModelClient {
    model: String,
    latency: Duration,
}

impl StubModelClient {
    pub fn new(model: impl Into<String>, latency: Duration) -> Self {
        Self {
            model: model.into(),
            latency,
        }
    }
}

#[async_trait]
impl ModelClient for StubModelClient {
    async fn complete(&self, request: CompletionRequest) -> PoolResult<CompletionResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(CompletionResponse {
            content: format!(
                "Mock response from {}: I received '{}'",
                self.model, request.prompt
            ),
            model: self.model.clone(),
        })
    }

    fn backend(&self) -> &'static str {
        "stub"
    }
}

/// Client for an OpenAI-compatible chat-completions deployment
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    http: reqwest::Client,
    url: reqwest::Url,
    api_key: String,
}

impl HttpModelClient {
    /// Build the client; fails on an unusable endpoint
    pub fn new(config: &HttpBackendConfig) -> PoolResult<Self> {
        let base = reqwest::Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| PoolError::InvalidConfig(format!("endpoint '{}': {e}", config.endpoint)))?;
        let mut url = base
            .join(&format!(
                "{}/openai/deployments/{}/chat/completions",
                base.path().trim_end_matches('/'),
                config.deployment
            ))
            .map_err(|e| PoolError::InvalidConfig(format!("deployment path: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", &config.api_version);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PoolError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            http,
            url,
            api_key: config.api_key.clone(),
        })
    }

    fn body(request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: CompletionRequest) -> PoolResult<CompletionResponse> {
        debug!(model = %request.model, url = %self.url, "Sending completion request");

        let response = self
            .http
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&Self::body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PoolError::Backend(format!("HTTP {status}: {text}")));
        }

        let body: Value = response.json().await?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PoolError::InvalidResponse("missing choices[0].message.content".to_string())
            })?;
        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&request.model);

        Ok(CompletionResponse {
            content: content.to_string(),
            model: model.to_string(),
        })
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_echoes_prompt() {
        let client = StubModelClient::new("gpt-4", Duration::ZERO);
        let reply = client
            .complete(CompletionRequest::new("gpt-4", "hello"))
            .await
            .unwrap();
        assert_eq!(reply.content, "Mock response from gpt-4: I received 'hello'");
        assert_eq!(reply.model, "gpt-4");
        assert_eq!(client.backend(), "stub");
    }

    #[test]
    fn test_http_body_includes_system_prompt_first() {
        let request = CompletionRequest::new("gpt-4", "hi")
            .with_system_prompt("be brief")
            .with_temperature(0.3);
        let body = HttpModelClient::body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_http_url_layout() {
        let config = HttpBackendConfig::new("https://example.openai.azure.com/", "secret")
            .with_deployment("prod-gpt")
            .with_api_version("2024-02-15-preview");
        let client = HttpModelClient::new(&config).unwrap();
        assert_eq!(
            client.url.as_str(),
            "https://example.openai.azure.com/openai/deployments/prod-gpt/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn test_http_rejects_bad_endpoint() {
        let config = HttpBackendConfig::new("not a url", "secret");
        assert!(matches!(
            HttpModelClient::new(&config),
            Err(PoolError::InvalidConfig(_))
        ));
    }
}
