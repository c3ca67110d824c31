//! Readiness gate
//!
//! Readiness is decided by the validator and persisted to `readiness.json`;
//! the gate only reads that artifact.

use crate::config::{Config, ReadinessConfig};
use crate::error::{Error, Result};
use crate::store::write_file_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Readiness of one season as of its last validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessEntry {
    pub season: String,
    pub ready: bool,
    pub pbp_coverage: f64,
    pub shots_coverage: f64,
    pub error_count: usize,
    pub warning_count: usize,
    pub reasons: Vec<String>,
    pub validated_at: String,
}

/// Contents of `readiness.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadinessArtifact {
    pub seasons: BTreeMap<String, ReadinessEntry>,
}

impl ReadinessArtifact {
    /// Load the artifact; a missing file means nothing has been validated
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the artifact atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        write_file_atomic(path, &bytes)?;
        debug!("Wrote readiness artifact {:?}", path);
        Ok(())
    }

    /// Replace the entry for one season
    pub fn record(path: &Path, entry: ReadinessEntry) -> Result<()> {
        let mut artifact = Self::load(path)?;
        artifact.seasons.insert(entry.season.clone(), entry);
        artifact.save(path)
    }
}

/// Percentage for display: whole numbers without decimals
pub fn format_pct(pct: f64) -> String {
    if pct.fract() == 0.0 {
        format!("{:.0}%", pct)
    } else {
        format!("{:.1}%", pct)
    }
}

/// Apply the readiness thresholds; returns the unmet criteria
pub fn evaluate_readiness(
    pbp_coverage: f64,
    shots_coverage: f64,
    error_count: usize,
    thresholds: &ReadinessConfig,
) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();

    for (name, pct, min) in [
        ("pbp", pbp_coverage, thresholds.min_pbp_coverage),
        ("shots", shots_coverage, thresholds.min_shots_coverage),
    ] {
        if pct < min {
            reasons.push(format!(
                "{} coverage {} < {}",
                name,
                format_pct(pct),
                format_pct(min)
            ));
        }
    }

    match error_count {
        0 => {}
        1 => reasons.push("1 validation error".to_string()),
        n => reasons.push(format!("{} validation errors", n)),
    }

    (reasons.is_empty(), reasons)
}

/// Readiness of a season as a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub season: String,
    pub ready: bool,
    pub reasons: Vec<String>,
    pub entry: Option<ReadinessEntry>,
}

/// Look up the persisted readiness of `season`
pub fn cmd_ready(config: &Config, season: &str) -> Result<ReadinessReport> {
    let artifact = ReadinessArtifact::load(&config.paths.readiness_file)?;
    let report = match artifact.seasons.get(season) {
        Some(entry) => ReadinessReport {
            season: season.to_string(),
            ready: entry.ready,
            reasons: entry.reasons.clone(),
            entry: Some(entry.clone()),
        },
        None => ReadinessReport {
            season: season.to_string(),
            ready: false,
            reasons: vec!["season has not been validated".to_string()],
            entry: None,
        },
    };
    Ok(report)
}

/// Whether `season` passed its last validation
pub fn is_ready(config: &Config, season: &str) -> Result<bool> {
    Ok(cmd_ready(config, season)?.ready)
}

/// Fail with the unmet criteria unless `season` is ready
pub fn require_ready(config: &Config, season: &str) -> Result<()> {
    let report = cmd_ready(config, season)?;
    if report.ready {
        Ok(())
    } else {
        Err(Error::NotReady {
            season: report.season,
            reasons: report.reasons,
        })
    }
}

/// Print readiness to console
pub fn print_readiness(report: &ReadinessReport) {
    if report.ready {
        println!("✓ Season {} is ready", report.season);
    } else {
        println!("✗ Season {} is not ready", report.season);
        for reason in &report.reasons {
            println!("  - {}", reason);
        }
    }

    if let Some(entry) = &report.entry {
        println!(
            "  Coverage: pbp {}, shots {}",
            format_pct(entry.pbp_coverage),
            format_pct(entry.shots_coverage)
        );
        println!(
            "  Findings: {} errors, {} warnings",
            entry.error_count, entry.warning_count
        );
        println!("  Validated: {}", entry.validated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(season: &str, pbp: f64, shots: f64, errors: usize) -> ReadinessEntry {
        let (ready, reasons) = evaluate_readiness(pbp, shots, errors, &ReadinessConfig::default());
        ReadinessEntry {
            season: season.to_string(),
            ready,
            pbp_coverage: pbp,
            shots_coverage: shots,
            error_count: errors,
            warning_count: 0,
            reasons,
            validated_at: "2024-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_threshold_boundaries() {
        let thresholds = ReadinessConfig::default();

        let (ready, reasons) = evaluate_readiness(95.0, 95.0, 0, &thresholds);
        assert!(ready);
        assert!(reasons.is_empty());

        let (ready, reasons) = evaluate_readiness(94.9, 100.0, 0, &thresholds);
        assert!(!ready);
        assert_eq!(reasons, vec!["pbp coverage 94.9% < 95%"]);

        let (ready, reasons) = evaluate_readiness(90.0, 100.0, 0, &thresholds);
        assert!(!ready);
        assert_eq!(reasons, vec!["pbp coverage 90% < 95%"]);
    }

    #[test]
    fn test_single_error_blocks_readiness() {
        let (ready, reasons) = evaluate_readiness(100.0, 100.0, 1, &ReadinessConfig::default());
        assert!(!ready);
        assert_eq!(reasons, vec!["1 validation error"]);

        let (_, reasons) = evaluate_readiness(50.0, 100.0, 3, &ReadinessConfig::default());
        assert_eq!(reasons, vec!["pbp coverage 50% < 95%", "3 validation errors"]);
    }

    #[test]
    fn test_gate_reads_persisted_artifact() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let path = &config.paths.readiness_file;

        match require_ready(&config, "2023-24") {
            Err(Error::NotReady { reasons, .. }) => {
                assert_eq!(reasons, vec!["season has not been validated"])
            }
            other => panic!("expected NotReady, got {:?}", other),
        }

        ReadinessArtifact::record(path, entry("2023-24", 100.0, 100.0, 0)).unwrap();
        ReadinessArtifact::record(path, entry("2022-23", 90.0, 100.0, 0)).unwrap();

        assert!(is_ready(&config, "2023-24").unwrap());
        tokio_test::assert_ok!(require_ready(&config, "2023-24"));
        assert!(!is_ready(&config, "2022-23").unwrap());
        let err = require_ready(&config, "2022-23").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Season 2022-23 is not ready: pbp coverage 90% < 95%"
        );

        // Re-validation replaces the entry
        ReadinessArtifact::record(path, entry("2023-24", 100.0, 100.0, 2)).unwrap();
        assert!(!is_ready(&config, "2023-24").unwrap());
        assert_eq!(ReadinessArtifact::load(path).unwrap().seasons.len(), 2);
    }
}
