//! Configuration management for courtlog
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! Season definitions live here too so every run is reproducible from its
//! config and arguments alone.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Golden fixture file, relative to the base directory unless absolute
    #[serde(default = "default_golden_file")]
    pub golden_file: String,

    /// Data provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Normalization configuration
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Validator configuration
    #[serde(default)]
    pub validate: ValidateConfig,

    /// Readiness thresholds
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Drift spot-check configuration
    #[serde(default)]
    pub drift: DriftConfig,

    /// Known seasons
    #[serde(default, rename = "season")]
    pub seasons: Vec<SeasonSpec>,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Data provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider base URL
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Source system name recorded in provenance
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_sec: f64,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bounded worker pool size
    #[serde(default = "default_ingest_concurrency")]
    pub concurrency: usize,

    /// Per-call fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// In-run retries for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry backoff in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Regulation period length in seconds
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u32,

    /// Overtime period length in seconds
    #[serde(default = "default_overtime_seconds")]
    pub overtime_seconds: u32,

    /// Regulation periods before overtime starts
    #[serde(default = "default_regulation_periods")]
    pub regulation_periods: u32,

    /// Games normalized (and validated) concurrently
    #[serde(default = "default_normalize_concurrency")]
    pub concurrency: usize,
}

/// Validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateConfig {
    /// Made-shot count difference reported as a warning rather than an error
    #[serde(default = "default_made_shot_tolerance")]
    pub made_shot_tolerance: u32,
}

/// Readiness thresholds (percentages)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_min_coverage")]
    pub min_pbp_coverage: f64,

    #[serde(default = "default_min_coverage")]
    pub min_shots_coverage: f64,
}

/// Drift spot-check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Games sampled per spot-check
    #[serde(default = "default_drift_sample_size")]
    pub sample_size: usize,

    /// Discrepancy count above which the report is high severity
    #[serde(default = "default_high_severity_threshold")]
    pub high_severity_threshold: usize,
}

/// A season as known to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonSpec {
    /// Season label used for partitioning (e.g. "2023-24")
    pub label: String,

    /// Competition identifier (e.g. "nba-regular")
    pub competition: String,

    /// Provider-side season key, when it differs from the label
    #[serde(default)]
    pub provider_season: Option<String>,
}

impl SeasonSpec {
    /// Key sent to the schedule endpoint
    pub fn provider_key(&self) -> &str {
        self.provider_season.as_deref().unwrap_or(&self.label)
    }
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for courtlog data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite game index
    pub db_file: PathBuf,

    /// Root of raw/ and normalized/ partitions
    pub data_dir: PathBuf,

    /// Per-season readiness artifact
    pub readiness_file: PathBuf,

    /// Validation metrics time series
    pub metrics_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            golden_file: default_golden_file(),
            provider: ProviderConfig::default(),
            ingest: IngestConfig::default(),
            normalize: NormalizeConfig::default(),
            validate: ValidateConfig::default(),
            readiness: ReadinessConfig::default(),
            drift: DriftConfig::default(),
            seasons: Vec::new(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            source_name: default_source_name(),
            user_agent: default_user_agent(),
            rate_limit_per_sec: default_rate_limit(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_ingest_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            period_seconds: default_period_seconds(),
            overtime_seconds: default_overtime_seconds(),
            regulation_periods: default_regulation_periods(),
            concurrency: default_normalize_concurrency(),
        }
    }
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            made_shot_tolerance: default_made_shot_tolerance(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            min_pbp_coverage: default_min_coverage(),
            min_shots_coverage: default_min_coverage(),
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            sample_size: default_drift_sample_size(),
            high_severity_threshold: default_high_severity_threshold(),
        }
    }
}

/// Season labels and game ids end up as path segments
fn partition_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static regex"))
}

/// Whether a value is safe to embed as a `key=value` partition segment
pub fn is_valid_partition_value(value: &str) -> bool {
    partition_segment_re().is_match(value)
}

impl Config {
    /// Get the default base directory for courtlog (~/.courtlog)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".courtlog")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Default configuration rooted at `base_dir`
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let mut config = Config::default();
        config.init_paths(Some(base_dir));
        config
    }

    fn paths_for(base: PathBuf, config_file: PathBuf) -> PathsConfig {
        PathsConfig {
            config_file,
            db_file: base.join("index.db"),
            data_dir: base.join("data"),
            readiness_file: base.join("readiness.json"),
            metrics_file: base.join("metrics.jsonl"),
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = Self::paths_for(base.clone(), base.join("config.toml"));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if courtlog is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Look up a configured season by label
    pub fn season(&self, label: &str) -> Result<&SeasonSpec> {
        self.seasons
            .iter()
            .find(|s| s.label == label)
            .ok_or_else(|| Error::Config(format!("Season '{}' is not configured", label)))
    }

    /// Resolved golden fixture path
    pub fn golden_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.golden_file);
        if path.is_absolute() {
            path
        } else {
            self.paths.base_dir.join(path)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ingest.concurrency == 0 {
            return Err(Error::Config("ingest.concurrency must be >= 1".to_string()));
        }

        if self.ingest.fetch_timeout_secs == 0 {
            return Err(Error::Config(
                "ingest.fetch_timeout_secs must be positive".to_string(),
            ));
        }

        if self.normalize.concurrency == 0 {
            return Err(Error::Config(
                "normalize.concurrency must be >= 1".to_string(),
            ));
        }

        if self.normalize.period_seconds == 0 || self.normalize.overtime_seconds == 0 {
            return Err(Error::Config(
                "normalize period lengths must be positive".to_string(),
            ));
        }

        if self.provider.rate_limit_per_sec <= 0.0 {
            return Err(Error::Config(
                "provider.rate_limit_per_sec must be positive".to_string(),
            ));
        }

        for (name, value) in [
            ("readiness.min_pbp_coverage", self.readiness.min_pbp_coverage),
            ("readiness.min_shots_coverage", self.readiness.min_shots_coverage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!("{} must be between 0 and 100", name)));
            }
        }

        let mut labels = HashSet::new();
        for season in &self.seasons {
            if !is_valid_partition_value(&season.label) {
                return Err(Error::Config(format!(
                    "Season label '{}' is not a valid partition name",
                    season.label
                )));
            }
            if !labels.insert(season.label.as_str()) {
                return Err(Error::Config(format!(
                    "Season '{}' is configured more than once",
                    season.label
                )));
            }
        }

        Ok(())
    }
}
