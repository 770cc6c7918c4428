//! Cache-first request path: fingerprint, look up, call on miss, store.

use serde_json::Map;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{GenerationBackend, OpenAiBackend};
use crate::cache::{ResponseCache, fingerprint, key_prefix};
use crate::client::RateLimitedClient;
use crate::clock::{SystemClock, TokioSleeper};
use crate::config::GatewayConfig;
use crate::error::{Error, GenerationError, Result};
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE, GENERATION_ERRORS, REQUEST_LATENCY, REQUEST_TOTAL};

pub struct Orchestrator {
    cache: Arc<ResponseCache>,
    client: RateLimitedClient,
    model: String,
}

impl Orchestrator {
    pub fn new(cache: Arc<ResponseCache>, client: RateLimitedClient, model: impl Into<String>) -> Self {
        Self {
            cache,
            client,
            model: model.into(),
        }
    }

    /// Wire the production cache file, chat-completions backend and limiter.
    ///
    /// Must be called inside a tokio runtime (the worker pool is spawned here).
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.client.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        let backend: Arc<dyn GenerationBackend> = Arc::new(OpenAiBackend::new(
            http,
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
        ));
        let cache = Arc::new(ResponseCache::open(&config.cache_path, config.cache, Arc::new(SystemClock))?);
        let client = RateLimitedClient::new(config.api_key.clone(), backend, config.client, Arc::new(TokioSleeper));
        Ok(Self::new(cache, client, config.model.clone()))
    }

    /// Cached response for `prompt`, or a fresh one from the remote API.
    ///
    /// A hit never touches the rate limiter. Failures are returned as-is
    /// and never cached.
    pub async fn generate_response(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        REQUEST_TOTAL.inc();
        let start = Instant::now();
        let key = fingerprint(prompt);

        if let Some(cached) = self.lookup(&key).await {
            CACHE_HITS.inc();
            REQUEST_LATENCY.observe(start.elapsed().as_secs_f64());
            info!(key = %key_prefix(&key), "cache hit");
            return Ok(cached);
        }

        CACHE_MISSES.inc();
        info!(key = %key_prefix(&key), "cache miss, calling remote API");
        debug!(key = %key_prefix(&key), prompt, "prompt text");

        match self.client.generate(prompt, &self.model, &Map::new()).await {
            Ok(text) => {
                self.store(key, text.clone()).await;
                REQUEST_LATENCY.observe(start.elapsed().as_secs_f64());
                Ok(text)
            }
            Err(e) => {
                GENERATION_ERRORS.with_label_values(&[e.kind()]).inc();
                error!(
                    key = %key_prefix(&key),
                    kind = e.kind(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "generation failed"
                );
                Err(e)
            }
        }
    }

    /// Like `generate_response`, with failures turned into an apology
    pub async fn respond(&self, prompt: &str) -> String {
        match self.generate_response(prompt).await {
            Ok(text) => text,
            Err(e) => e.user_message().to_string(),
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn client(&self) -> &RateLimitedClient {
        &self.client
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    // Read errors degrade to a miss.
    async fn lookup(&self, key: &str) -> Option<String> {
        let cache = Arc::clone(&self.cache);
        let owned = key.to_string();
        let result = tokio::task::spawn_blocking(move || cache.get(&owned))
            .await
            .map_err(Error::from)
            .and_then(|r| r);
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key_prefix(key), error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    // Write errors leave the response uncached.
    async fn store(&self, key: String, value: String) {
        let cache = Arc::clone(&self.cache);
        let prefix = key_prefix(&key).to_string();
        let result = tokio::task::spawn_blocking(move || {
            cache.set(&key, &value)?;
            cache.len()
        })
        .await
        .map_err(Error::from)
        .and_then(|r| r);
        match result {
            Ok(len) => CACHE_SIZE.set(len as f64),
            Err(e) => warn!(key = %prefix, error = %e, "failed to store response in cache"),
        }
    }
}
