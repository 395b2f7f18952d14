use std::env;
use std::time::Duration;

use anyhow::Result;

/// Application-wide defaults. These can be overridden by env vars but do not
/// require any user-authored config files.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    /// Soft cap on discovered message references per scan.
    pub result_cap: usize,
    /// Page size for the list endpoint.
    pub page_size: u32,
    /// Concurrent detail fetches per batch.
    pub batch_size: usize,
    /// Server-side search predicate approximating "has an unsubscribe signal".
    pub search_query: String,
    /// Per-request timeout on every remote call.
    pub request_timeout: Duration,
    /// Visible processing interval before an item settles as done.
    pub settle_delay: Duration,
    /// Pause between consecutive dispatch items.
    pub pacing_delay: Duration,
    /// How long finished groups stay visible after a dispatch run.
    pub cleanup_delay: Duration,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        Ok(Self {
            result_cap: env_parse("UNSUB_RESULT_CAP", 500),
            page_size: env_parse("UNSUB_PAGE_SIZE", 100),
            batch_size: env_parse("UNSUB_BATCH_SIZE", 20),
            search_query: env::var("UNSUB_SEARCH_QUERY")
                .unwrap_or_else(|_| "unsubscribe".to_string()),
            request_timeout: Duration::from_secs(env_parse("UNSUB_REQUEST_TIMEOUT_SECS", 30u64)),
            settle_delay: Duration::from_millis(env_parse("UNSUB_SETTLE_DELAY_MS", 500u64)),
            pacing_delay: Duration::from_millis(env_parse("UNSUB_PACING_DELAY_MS", 300u64)),
            cleanup_delay: Duration::from_millis(env_parse("UNSUB_CLEANUP_DELAY_MS", 2000u64)),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
