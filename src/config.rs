use clap::{Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::DEFAULT_BASE_URL;
use crate::cache::{CacheOptions, DEFAULT_EXPIRATION, DEFAULT_MAX_SIZE};
use crate::client::{ClientOptions, DEFAULT_RATE_LIMIT, DEFAULT_TIMEOUT};
use crate::worker::DEFAULT_WORKERS;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_CACHE_PATH: &str = "cache/responses.db";

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "assistant-gateway")]
#[command(about = "Caching, rate-limited front door to a language model API")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    // API key for the remote service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Model used for every request
    #[arg(short, long, env = "OPENAI_DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    // Chat-completions API root
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    // SQLite file backing the response cache (created if absent)
    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    // Maximum number of cached responses
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    pub cache_max_size: usize,

    // Cache TTL in seconds
    #[arg(short, long, default_value_t = DEFAULT_EXPIRATION.as_secs())]
    pub cache_ttl: u64,

    // Successful calls allowed before the limiter makes a caller wait
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT)]
    pub rate_limit: u32,

    // Seconds allowed per remote call
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    // Worker tasks running remote calls
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    // Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API
    Serve {
        // Port to run the server on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Interactive text session on stdin/stdout (default)
    Chat,
}

// Everything the orchestrator needs, resolved once at startup
#[derive(Clone)]
pub struct GatewayConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub cache_path: PathBuf,
    pub cache: CacheOptions,
    pub client: ClientOptions,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache: CacheOptions::default(),
            client: ClientOptions::default(),
        }
    }
}

impl From<&Args> for GatewayConfig {
    fn from(args: &Args) -> Self {
        Self {
            api_key: args.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: args.model.clone(),
            base_url: args.base_url.clone(),
            cache_path: args.cache_path.clone(),
            cache: CacheOptions {
                max_size: args.cache_max_size,
                expiration: Duration::from_secs(args.cache_ttl),
            },
            client: ClientOptions {
                rate_limit: args.rate_limit,
                timeout: Duration::from_secs(args.timeout),
                workers: args.workers,
            },
        }
    }
}

// Keeps the key out of logs
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("cache_path", &self.cache_path)
            .field("cache", &self.cache)
            .field("client", &self.client)
            .finish()
    }
}
