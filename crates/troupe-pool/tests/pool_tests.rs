//! Concurrency and construction tests for the resource pool

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready_ok};
use troupe_pool::{
    ClientFactory, CompletionRequest, HttpBackendConfig, ModelClient, PoolError, PoolResult,
    ResourceConfig, ResourcePool, StubModelClient,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fails the first `failures` builds, then succeeds; counts every attempt
struct FlakyFactory {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyFactory {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicUsize::new(0),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for FlakyFactory {
    async fn build(&self, resource: &str) -> PoolResult<Arc<dyn ModelClient>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(PoolError::Construction {
                resource: resource.to_string(),
                reason: format!("attempt {attempt} refused"),
            });
        }
        Ok(Arc::new(StubModelClient::new(resource, Duration::ZERO)))
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_never_more_than_max_holders() {
    let pool = Arc::new(ResourcePool::new());
    pool.register("gpt-4", ResourceConfig::stub(3)).unwrap();

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let _guard = pool.acquire("gpt-4").await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let peak = peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak holders was {peak}");
    assert_eq!(pool.available_slots("gpt-4"), Some(3));
}

#[tokio::test]
async fn test_acquire_waits_for_a_free_slot() {
    let pool = ResourcePool::new();
    pool.register("gpt-4", ResourceConfig::stub(1)).unwrap();

    let held = pool.acquire("gpt-4").await.unwrap();

    let mut waiting = tokio_test::task::spawn(pool.acquire("gpt-4"));
    assert_pending!(waiting.poll());

    drop(held);
    assert!(waiting.is_woken());
    let guard = assert_ready_ok!(waiting.poll());
    assert_eq!(guard.resource(), "gpt-4");
}

#[tokio::test]
async fn test_cancelled_waiter_does_not_leak_a_slot() {
    let pool = ResourcePool::new();
    pool.register("gpt-4", ResourceConfig::stub(1)).unwrap();

    let held = pool.acquire("gpt-4").await.unwrap();
    let timed_out = tokio::time::timeout(Duration::from_millis(20), pool.acquire("gpt-4")).await;
    assert!(timed_out.is_err());

    drop(held);
    assert_eq!(pool.available_slots("gpt-4"), Some(1));
    let _again = pool.acquire("gpt-4").await.unwrap();
}

#[tokio::test]
async fn test_unknown_name_fails_without_waiting() {
    let pool = ResourcePool::new();
    pool.register("gpt-4", ResourceConfig::stub(1)).unwrap();
    let _held = pool.acquire("gpt-4").await.unwrap();

    let mut attempt = tokio_test::task::spawn(pool.acquire("claude"));
    match attempt.poll() {
        std::task::Poll::Ready(Err(PoolError::NotRegistered(name))) => assert_eq!(name, "claude"),
        other => panic!("expected immediate NotRegistered, got {:?}", other.map(|r| r.err())),
    }
}

#[tokio::test]
async fn test_failed_construction_is_retried_by_next_acquirer() {
    let factory = FlakyFactory::new(1);
    let pool = ResourcePool::new();
    pool.register("gpt-4", ResourceConfig::new(2, factory.clone()))
        .unwrap();

    let first = pool.acquire("gpt-4").await;
    assert!(matches!(first, Err(PoolError::Construction { .. })));
    assert!(!pool.is_initialized("gpt-4"));
    // The failed attempt gave its slot back.
    assert_eq!(pool.available_slots("gpt-4"), Some(2));

    let second = pool.acquire("gpt-4").await.unwrap();
    assert_eq!(second.backend(), "stub");
    assert!(pool.is_initialized("gpt-4"));
    assert_eq!(factory.attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_is_constructed_once_under_contention() {
    let factory = FlakyFactory::new(0);
    let pool = Arc::new(ResourcePool::new());
    pool.register("gpt-4", ResourceConfig::new(8, factory.clone()))
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("gpt-4").await.map(|_| ()) })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(factory.attempts(), 1);
}

#[tokio::test]
async fn test_http_backend_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-4/chat/completions"))
        .and(query_param("api-version", "2024-02-15-preview"))
        .and(header("api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4-0613",
            "choices": [{"message": {"role": "assistant", "content": "Hello there"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pool = ResourcePool::new();
    pool.register(
        "gpt-4",
        ResourceConfig::http(HttpBackendConfig::new(server.uri(), "secret"), 2),
    )
    .unwrap();

    let client = pool.acquire("gpt-4").await.unwrap();
    assert_eq!(client.backend(), "http");
    let reply = client
        .complete(CompletionRequest::new("gpt-4", "hi").with_system_prompt("be nice"))
        .await
        .unwrap();
    assert_eq!(reply.content, "Hello there");
    assert_eq!(reply.model, "gpt-4-0613");
}

#[tokio::test]
async fn test_http_backend_surfaces_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let pool = ResourcePool::new();
    pool.register(
        "gpt-4",
        ResourceConfig::http(HttpBackendConfig::new(server.uri(), "secret"), 1),
    )
    .unwrap();

    let client = pool.acquire("gpt-4").await.unwrap();
    let err = client
        .complete(CompletionRequest::new("gpt-4", "hi"))
        .await
        .unwrap_err();
    match err {
        PoolError::Backend(msg) => {
            assert!(msg.contains("429"));
            assert!(msg.contains("slow down"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(PoolError::Backend(String::new()).is_retryable());
}

#[tokio::test]
async fn test_http_backend_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let pool = ResourcePool::new();
    pool.register(
        "gpt-4",
        ResourceConfig::http(HttpBackendConfig::new(server.uri(), "secret"), 1),
    )
    .unwrap();

    let client = pool.acquire("gpt-4").await.unwrap();
    let err = client
        .complete(CompletionRequest::new("gpt-4", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidResponse(_)));
}
