//! Rate-limited, timeout-bounded access to a generation backend

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::backend::GenerationBackend;
use crate::clock::Sleeper;
use crate::error::GenerationError;
use crate::models::GenerateRequest;
use crate::rate_limit::{RateLimiter, RateLimiterState};
use crate::worker::{DEFAULT_WORKERS, WorkerPool};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_RATE_LIMIT: u32 = 10;

/// Keys this short cannot be real; checked before any network traffic.
pub const MIN_API_KEY_LEN: usize = 21;

pub fn validate_api_key(api_key: Option<&str>) -> bool {
    api_key.is_some_and(|k| k.len() >= MIN_API_KEY_LEN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub rate_limit: u32,
    pub timeout: Duration,
    pub workers: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            rate_limit: DEFAULT_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            workers: DEFAULT_WORKERS,
        }
    }
}

pub struct RateLimitedClient {
    api_key: Option<String>,
    pool: WorkerPool,
    limiter: RateLimiter,
    timeout: Duration,
}

impl RateLimitedClient {
    /// Build a client and spawn its worker pool on the current runtime
    pub fn new(
        api_key: Option<String>,
        backend: Arc<dyn GenerationBackend>,
        options: ClientOptions,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            api_key,
            pool: WorkerPool::spawn(backend, options.workers),
            limiter: RateLimiter::new(options.rate_limit, sleeper),
            timeout: options.timeout,
        }
    }

    /// Generate text for `prompt`.
    ///
    /// A bad credential fails before the limiter is consulted. Otherwise the
    /// caller may first wait out an exhausted window, then the call runs on
    /// the worker pool under the timeout budget. Only successes count
    /// against the window.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &Map<String, Value>,
    ) -> Result<String, GenerationError> {
        if !validate_api_key(self.api_key.as_deref()) {
            warn!("refusing to call the remote API: key is missing or implausibly short");
            return Err(GenerationError::InvalidCredential);
        }

        if let Some(waited) = self.limiter.acquire().await {
            debug!(waited_secs = waited.as_secs(), "resumed after rate limit backoff");
        }

        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            options: options.clone(),
        };

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.pool.dispatch(request)).await {
            Ok(result) => result.map_err(GenerationError::from),
            // A call already running finishes and is discarded; a queued one is skipped.
            Err(_) => Err(GenerationError::Timeout),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(text) => {
                self.limiter.record_success();
                debug!(model, latency_ms, response_len = text.len(), "remote call succeeded");
            }
            Err(e) => {
                error!(model, latency_ms, kind = e.kind(), error = %e, "remote call failed");
            }
        }
        outcome
    }

    pub fn limiter_state(&self) -> RateLimiterState {
        self.limiter.snapshot()
    }

    pub fn rate_limit(&self) -> u32 {
        self.limiter.limit()
    }
}
