//! Custom error types for courtlog

use thiserror::Error;

/// Main error type for courtlog operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    #[error("Fetch timed out after {0}s")]
    FetchTimeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Not found upstream: {0}")]
    NotFoundUpstream(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Identity mismatch on {field}: requested {expected}, payload carries {found}")]
    IdentityMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("Corrupted unit {path}: {reason}")]
    SkippedCorrupted { path: String, reason: String },

    #[error("Game {game_id} is claimed by more than one season: {seasons:?}")]
    CrossSeasonDuplicate {
        game_id: String,
        seasons: Vec<String>,
    },

    #[error("Invariant violation in {game_id}: {message}")]
    InvariantViolation { game_id: String, message: String },

    #[error("Season {season} is not ready: {}", .reasons.join("; "))]
    NotReady {
        season: String,
        reasons: Vec<String>,
    },

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Not initialized: run 'courtlog init' first")]
    NotInitialized,

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Stable label used in error logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::FetchFailure(_) | Error::FetchTimeout(_) | Error::RateLimited(_) => {
                "fetch_failure"
            }
            Error::Http(_) => "fetch_failure",
            Error::NotFoundUpstream(_) => "not_found_upstream",
            Error::Malformed(_) | Error::Json(_) => "malformed",
            Error::IdentityMismatch { .. } => "identity_mismatch",
            Error::SkippedCorrupted { .. } => "skipped_corrupted",
            Error::CrossSeasonDuplicate { .. } => "cross_season_duplicate",
            Error::InvariantViolation { .. } => "invariant_violation",
            Error::NotReady { .. } => "not_ready",
            Error::GameNotFound(_) => "game_not_found",
            Error::Cancelled => "cancelled",
            Error::Config(_) | Error::TomlParse(_) | Error::TomlSerialize(_) => "config",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::UrlParse(_) => "url",
            Error::NotInitialized => "not_initialized",
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FetchFailure(_) | Error::FetchTimeout(_) | Error::RateLimited(_) | Error::Http(_)
        )
    }
}

/// Result type alias for courtlog
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_errors_share_kind_and_retry() {
        for err in [
            Error::FetchFailure("connection reset".to_string()),
            Error::FetchTimeout(30),
            Error::RateLimited("429".to_string()),
        ] {
            assert_eq!(err.kind(), "fetch_failure");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_identity_errors_are_terminal() {
        let err = Error::IdentityMismatch {
            field: "game_id",
            expected: "0022300001".to_string(),
            found: "0022200001".to_string(),
        };
        assert_eq!(err.kind(), "identity_mismatch");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("0022200001"));
    }

    #[test]
    fn test_not_ready_lists_reasons() {
        let err = Error::NotReady {
            season: "2023-24".to_string(),
            reasons: vec![
                "pbp coverage 90% < 95%".to_string(),
                "1 validation error".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Season 2023-24 is not ready: pbp coverage 90% < 95%; 1 validation error"
        );
    }
}
