//! End-to-end behavior of the cache-first request path

use assistant_gateway::cache::{CacheOptions, ResponseCache, fingerprint};
use assistant_gateway::client::{ClientOptions, RateLimitedClient};
use assistant_gateway::clock::{ManualClock, Sleeper};
use assistant_gateway::models::{GenerateRequest, QuestionResponse};
use assistant_gateway::state::AppState;
use assistant_gateway::{BackendError, GenerationBackend, GenerationError, Orchestrator, RateLimiterState};
use assistant_gateway::{console, handlers};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KEY: &str = "sk-test-0123456789abcdefghij";

#[derive(Default)]
struct SpyBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl SpyBackend {
    fn answering(outcomes: Vec<Result<String, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for SpyBackend {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(format!("answer to {}", request.prompt)))
    }
}

#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

struct Harness {
    orchestrator: Orchestrator,
    backend: Arc<SpyBackend>,
    sleeper: Arc<RecordingSleeper>,
    clock: Arc<ManualClock>,
}

fn harness(backend: Arc<SpyBackend>, api_key: Option<&str>, rate_limit: u32) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = ResponseCache::open_in_memory(
        CacheOptions {
            max_size: 100,
            expiration: Duration::from_secs(3600),
        },
        clock.clone(),
    )
    .unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = RateLimitedClient::new(
        api_key.map(String::from),
        backend.clone(),
        ClientOptions {
            rate_limit,
            timeout: Duration::from_secs(5),
            workers: 2,
        },
        sleeper.clone(),
    );
    Harness {
        orchestrator: Orchestrator::new(Arc::new(cache), client, "gpt-test"),
        backend,
        sleeper,
        clock,
    }
}

#[tokio::test]
async fn miss_then_hit_for_identical_prompt() {
    let h = harness(SpyBackend::answering(vec![Ok("4".into())]), Some(KEY), 10);

    assert_eq!(h.orchestrator.generate_response("What is 2+2?").await, Ok("4".into()));
    assert_eq!(
        h.orchestrator.cache().get(&fingerprint("What is 2+2?")).unwrap().as_deref(),
        Some("4")
    );

    assert_eq!(h.orchestrator.generate_response("What is 2+2?").await, Ok("4".into()));
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn cache_hit_bypasses_the_limiter() {
    let h = harness(SpyBackend::answering(vec![]), Some(KEY), 1);
    h.orchestrator
        .cache()
        .set(&fingerprint("cached question"), "cached answer")
        .unwrap();

    for _ in 0..5 {
        assert_eq!(
            h.orchestrator.generate_response("cached question").await,
            Ok("cached answer".into())
        );
    }
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.orchestrator.client().limiter_state(), RateLimiterState::default());
    assert!(h.sleeper.waits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failures_are_not_cached() {
    let h = harness(
        SpyBackend::answering(vec![Err(BackendError::Remote("overloaded".into())), Ok("fine".into())]),
        Some(KEY),
        10,
    );

    assert_eq!(
        h.orchestrator.generate_response("hello").await,
        Err(GenerationError::RemoteError("overloaded".into()))
    );
    assert!(h.orchestrator.cache().is_empty().unwrap());

    // The retry goes back to the remote API and is cached this time.
    assert_eq!(h.orchestrator.generate_response("hello").await, Ok("fine".into()));
    assert_eq!(h.orchestrator.cache().len().unwrap(), 1);
    assert_eq!(h.backend.calls(), 2);
}

#[tokio::test]
async fn failures_become_apologies() {
    let h = harness(
        SpyBackend::answering(vec![Err(BackendError::Timeout)]),
        Some(KEY),
        10,
    );
    let reply = h.orchestrator.respond("hello").await;
    assert_eq!(reply, GenerationError::Timeout.user_message());
    assert!(h.orchestrator.cache().is_empty().unwrap());
}

#[tokio::test]
async fn missing_credential_touches_nothing() {
    let h = harness(SpyBackend::answering(vec![]), None, 10);

    assert_eq!(
        h.orchestrator.generate_response("hello").await,
        Err(GenerationError::InvalidCredential)
    );
    assert_eq!(h.backend.calls(), 0);
    assert!(h.orchestrator.cache().is_empty().unwrap());
    assert_eq!(h.orchestrator.client().limiter_state(), RateLimiterState::default());
}

#[tokio::test]
async fn only_misses_consume_the_window() {
    let h = harness(SpyBackend::answering(vec![]), Some(KEY), 2);

    h.orchestrator.generate_response("a").await.unwrap();
    h.orchestrator.generate_response("a").await.unwrap();
    h.orchestrator.generate_response("b").await.unwrap();
    assert!(h.sleeper.waits.lock().unwrap().is_empty());

    // Third distinct prompt finds the window full.
    h.orchestrator.generate_response("c").await.unwrap();
    assert_eq!(*h.sleeper.waits.lock().unwrap(), vec![Duration::from_secs(60)]);
    assert_eq!(h.backend.calls(), 3);
}

#[tokio::test]
async fn expired_entries_are_regenerated() {
    let h = harness(
        SpyBackend::answering(vec![Ok("old".into()), Ok("new".into())]),
        Some(KEY),
        10,
    );

    assert_eq!(h.orchestrator.generate_response("q").await, Ok("old".into()));
    h.clock.advance(Duration::from_secs(3599));
    assert_eq!(h.orchestrator.generate_response("q").await, Ok("old".into()));
    h.clock.advance(Duration::from_secs(2));
    assert_eq!(h.orchestrator.generate_response("q").await, Ok("new".into()));
    assert_eq!(h.backend.calls(), 2);
}

#[tokio::test]
async fn concurrent_requests_share_one_cache() {
    let h = Arc::new(harness(SpyBackend::answering(vec![]), Some(KEY), 100));
    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.orchestrator.generate_response(&format!("p{}", i % 5)).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(h.orchestrator.cache().len().unwrap(), 5);
}

#[tokio::test]
async fn console_session_answers_and_quits() {
    let h = harness(SpyBackend::answering(vec![Ok("4".into())]), Some(KEY), 10);
    let input: &[u8] = b"  What is 2+2?\nstop voice\nstop\nnever read\n";
    let mut output = Vec::new();

    console::run(&h.orchestrator, input, &mut output).await.unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("\n4\n"), "output was {text:?}");
    assert!(text.contains("Goodbye!"));
    assert_eq!(*h.backend.prompts.lock().unwrap(), vec!["what is 2+2?".to_string()]);
}

#[tokio::test]
async fn http_front_end_round_trip() {
    let h = harness(SpyBackend::answering(vec![Ok("4".into())]), Some(KEY), 10);
    let backend = Arc::clone(&h.backend);
    let app = handlers::router(AppState {
        orchestrator: Arc::new(h.orchestrator),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let http = reqwest::Client::new();
    for _ in 0..2 {
        let reply: QuestionResponse = http
            .post(format!("http://{addr}/api/generate"))
            .json(&serde_json::json!({"question": "What is 2+2?"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply.response, "4");
    }
    assert_eq!(backend.calls(), 1);

    let health: serde_json::Value = http
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let metrics = http
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("assistant_cache_hits_total"));
}
