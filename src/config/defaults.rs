//! Default values for configuration

/// Default provider base URL
pub fn default_provider_url() -> String {
    std::env::var("COURTLOG_PROVIDER_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

/// Default source system name recorded in unit provenance
pub fn default_source_name() -> String {
    "stats-provider".to_string()
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!("courtlog/{} (pbp ingestion)", env!("CARGO_PKG_VERSION"))
}

/// Default rate limit (requests per second against the provider)
pub fn default_rate_limit() -> f64 {
    4.0
}

/// Default number of concurrent fetch workers
pub fn default_ingest_concurrency() -> usize {
    8
}

/// Default per-call fetch timeout in seconds
pub fn default_fetch_timeout() -> u64 {
    30
}

/// Default in-run retries for retryable fetch failures
pub fn default_max_retries() -> u32 {
    2
}

/// Default base backoff between retries (milliseconds, doubled per attempt)
pub fn default_retry_backoff_ms() -> u64 {
    500
}

/// Default regulation period length (12 minutes)
pub fn default_period_seconds() -> u32 {
    720
}

/// Default overtime period length (5 minutes)
pub fn default_overtime_seconds() -> u32 {
    300
}

/// Default number of regulation periods
pub fn default_regulation_periods() -> u32 {
    4
}

/// Default number of games normalized concurrently
pub fn default_normalize_concurrency() -> usize {
    8
}

/// Default tolerated difference between pbp made shots and shot-table rows
pub fn default_made_shot_tolerance() -> u32 {
    2
}

/// Default minimum coverage percentage for readiness
pub fn default_min_coverage() -> f64 {
    95.0
}

/// Default spot-check sample size
pub fn default_drift_sample_size() -> usize {
    5
}

/// Default discrepancy count above which drift is high severity
pub fn default_high_severity_threshold() -> usize {
    1
}

/// Default golden fixture file name (relative to the base directory)
pub fn default_golden_file() -> String {
    "golden.toml".to_string()
}
