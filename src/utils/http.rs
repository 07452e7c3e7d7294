use reqwest::Client;
use std::time::Duration;

/// Build a `reqwest::Client` with a 10 s connect timeout and the given overall timeout.
///
/// Falls back to the default client if the builder fails.
pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Build a `reqwest::Client` with standard timeouts (10 s connect, 30 s overall).
pub fn default_http_client() -> Client {
    http_client(Duration::from_secs(30))
}

/// Exponential backoff in seconds: `base * 2^attempt`, capped at `max`.
pub fn exponential_backoff_delay(attempt: u32, base: u64, max: u64) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt)).min(max)
}
