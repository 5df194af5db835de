use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Shared HTTP client for backend calls. `timeout_secs` bounds the whole
/// request; connecting is capped separately.
pub fn build_client(timeout_secs: u64) -> Client {
    let timeout_secs = if timeout_secs == 0 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    } else {
        timeout_secs
    };
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
}
