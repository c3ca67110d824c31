//! Provider collaborators
//!
//! The pipeline never talks to the provider directly. It goes through
//! [`Fetcher`] for per-game records and [`ScheduleSource`] for the season
//! schedule, so authenticated or offline backends can be plugged in.

mod http;
mod rate_limit;

pub use http::HttpFetcher;
pub use rate_limit::ProviderRateLimiter;

use crate::config::{IngestConfig, SeasonSpec};
use crate::error::{Error, Result};
use crate::models::{Dataset, RawRecords, ScheduledGame};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Fetch primitive: raw records for one game, or an explicit failure
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `dataset` (`Pbp` or `Shots`) for `game_id`.
    ///
    /// Fails with `FetchFailure`, `RateLimited`, `NotFoundUpstream` or
    /// `Malformed`.
    async fn fetch(&self, game_id: &str, dataset: Dataset) -> Result<RawRecords>;

    /// Name recorded as `source_system` in unit provenance
    fn source_system(&self) -> &str;
}

/// Season schedule listing
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn schedule(&self, season: &SeasonSpec) -> Result<Vec<ScheduledGame>>;
}

/// Endpoint kind for a raw dataset
pub fn endpoint_kind(dataset: Dataset) -> Result<&'static str> {
    match dataset {
        Dataset::Pbp => Ok("pbp"),
        Dataset::Shots => Ok("shots"),
        other => Err(Error::Config(format!(
            "{} is derived locally and cannot be fetched",
            other
        ))),
    }
}

/// Fetch under the per-call timeout, retrying retryable failures with
/// exponential backoff.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    game_id: &str,
    dataset: Dataset,
    config: &IngestConfig,
) -> Result<RawRecords> {
    let timeout = Duration::from_secs(config.fetch_timeout_secs);
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(timeout, fetcher.fetch(game_id, dataset)).await {
            Ok(result) => result,
            Err(_) => Err(Error::FetchTimeout(config.fetch_timeout_secs)),
        };

        match result {
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let backoff = config
                    .retry_backoff_ms
                    .saturating_mul(1u64 << attempt.min(16));
                debug!(
                    game_id,
                    dataset = %dataset,
                    attempt = attempt + 1,
                    "Retrying after {}: waiting {}ms",
                    e,
                    backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
