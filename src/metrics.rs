use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("assistant_requests_total", "Total number of generation requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("assistant_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("assistant_cache_misses_total", "Total cache misses").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "assistant_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("assistant_cache_size", "Current number of rows in the response cache").unwrap();
    pub static ref THROTTLE_WAITS: Counter =
        register_counter!("assistant_throttle_waits_total", "Times a caller waited out the rate limit").unwrap();
    pub static ref GENERATION_ERRORS: CounterVec = register_counter_vec!(
        "assistant_generation_errors_total",
        "Failed generation requests by kind",
        &["kind"]
    )
    .unwrap();
}

// Prometheus text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
