//! Response cache and rate-limited request orchestrator for a voice/text
//! assistant backed by a remote language-model API.
//!
//! A request is fingerprinted and looked up in a persistent [`ResponseCache`];
//! only misses reach the [`RateLimitedClient`], whose fixed-window limiter and
//! worker pool guard the remote call. [`Orchestrator`] ties the two together.

pub mod backend;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod state;
pub mod worker;

pub use backend::{GenerationBackend, OpenAiBackend};
pub use cache::{CacheOptions, ResponseCache, fingerprint};
pub use client::{ClientOptions, RateLimitedClient};
pub use config::GatewayConfig;
pub use error::{BackendError, Error, GenerationError, Result};
pub use orchestrator::Orchestrator;
pub use rate_limit::RateLimiterState;
