//! Status and error log commands

use crate::commands::ready::{format_pct, ReadinessArtifact, ReadinessEntry};
use crate::config::Config;
use crate::error::Result;
use crate::index::{GameIndex, IngestErrorRecord, QuarantineEntry, RunRecord, SeasonSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Status of one season
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonStatus {
    pub season: String,
    pub configured: bool,
    pub summary: Option<SeasonSummary>,
    pub readiness: Option<ReadinessEntry>,
    pub latest_run: Option<RunRecord>,
    pub error_count: usize,
    pub quarantined: usize,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub data_dir: String,
    pub seasons: Vec<SeasonStatus>,
}

/// Get pipeline status for every configured or indexed season
pub async fn cmd_status(config: &Config, index: &GameIndex) -> Result<StatusInfo> {
    info!("Getting status");

    let summaries = index.season_summaries().await?;
    let readiness = ReadinessArtifact::load(&config.paths.readiness_file)?;
    let errors = index.list_errors(None).await?;
    let quarantine = index.list_quarantine(None).await?;

    let mut labels: BTreeSet<String> = config.seasons.iter().map(|s| s.label.clone()).collect();
    labels.extend(summaries.iter().map(|s| s.season.clone()));

    let mut seasons = Vec::with_capacity(labels.len());
    for label in labels {
        seasons.push(SeasonStatus {
            configured: config.seasons.iter().any(|s| s.label == label),
            summary: summaries.iter().find(|s| s.season == label).cloned(),
            readiness: readiness.seasons.get(&label).cloned(),
            latest_run: index.latest_run(&label).await?,
            error_count: errors.iter().filter(|e| e.season == label).count(),
            quarantined: quarantine.iter().filter(|q| q.season == label).count(),
            season: label,
        });
    }

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        data_dir: config.paths.data_dir.display().to_string(),
        seasons,
    })
}

/// Recorded failures and quarantined units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLog {
    pub season: Option<String>,
    pub errors: Vec<IngestErrorRecord>,
    pub quarantine: Vec<QuarantineEntry>,
}

/// List recorded failures, optionally for one season
pub async fn cmd_errors(index: &GameIndex, season: Option<&str>) -> Result<ErrorLog> {
    Ok(ErrorLog {
        season: season.map(str::to_string),
        errors: index.list_errors(season).await?,
        quarantine: index.list_quarantine(season).await?,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("courtlog Status");
    println!("===============\n");
    println!("Config: {}", status.config_path);
    println!("Game index: {}", status.db_path);
    println!("Data: {}\n", status.data_dir);

    if status.seasons.is_empty() {
        println!("No seasons configured or indexed.");
        return;
    }

    for season in &status.seasons {
        let ready = match &season.readiness {
            Some(entry) if entry.ready => "ready".to_string(),
            Some(entry) => format!("not ready ({})", entry.reasons.join("; ")),
            None => "not validated".to_string(),
        };
        let configured = if season.configured { "" } else { " [not configured]" };
        println!("Season {}{}: {}", season.season, configured, ready);

        if let Some(summary) = &season.summary {
            println!(
                "  Games: {} ({} final), pbp {}, shots {}, box scores {}",
                summary.games,
                summary.final_games,
                summary.with_pbp,
                summary.with_shots,
                summary.with_boxscore
            );
        }
        if let Some(entry) = &season.readiness {
            println!(
                "  Coverage: pbp {}, shots {} (validated {})",
                format_pct(entry.pbp_coverage),
                format_pct(entry.shots_coverage),
                entry.validated_at
            );
        }
        if let Some(run) = &season.latest_run {
            println!(
                "  Last run: {} {} at {} ({} ok, {} failed)",
                run.operation, run.status, run.started_at, run.succeeded, run.failed
            );
        }
        if season.error_count > 0 || season.quarantined > 0 {
            println!(
                "  Errors: {}, quarantined units: {}",
                season.error_count, season.quarantined
            );
        }
        println!();
    }
}

/// Print the error log to console
pub fn print_errors(log: &ErrorLog) {
    if log.errors.is_empty() && log.quarantine.is_empty() {
        println!("No recorded errors.");
        return;
    }

    if !log.errors.is_empty() {
        println!("Errors ({}):", log.errors.len());
        for e in &log.errors {
            println!(
                "  {} {} {} [{}] {}",
                e.occurred_at, e.season, e.game_id, e.error_kind, e.message
            );
        }
    }

    if !log.quarantine.is_empty() {
        println!("\nQuarantined ({}):", log.quarantine.len());
        for q in &log.quarantine {
            println!("  {}/{}/{}: {}", q.dataset, q.season, q.game_id, q.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeasonSpec;
    use crate::error::Error;
    use crate::index::GameRecord;
    use crate::models::{Dataset, GameStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_merges_config_and_index() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::with_base_dir(tmp.path().to_path_buf());
        config.seasons.push(SeasonSpec {
            label: "2024-25".to_string(),
            competition: "nba-regular".to_string(),
            provider_season: None,
        });
        let index = GameIndex::connect(&config).await.unwrap();
        index
            .upsert(&GameRecord::new(
                "G1".to_string(),
                "2023-24".to_string(),
                "nba-regular".to_string(),
                GameStatus::Final,
                "LAL".to_string(),
                "BOS".to_string(),
            ))
            .await
            .unwrap();
        index
            .record_error(None, "G1", "2023-24", Dataset::Pbp, &Error::FetchTimeout(30))
            .await
            .unwrap();

        let status = cmd_status(&config, &index).await.unwrap();
        let labels: Vec<_> = status.seasons.iter().map(|s| s.season.as_str()).collect();
        assert_eq!(labels, vec!["2023-24", "2024-25"]);
        assert!(!status.seasons[0].configured);
        assert_eq!(status.seasons[0].summary.as_ref().unwrap().final_games, 1);
        assert_eq!(status.seasons[0].error_count, 1);
        assert!(status.seasons[1].summary.is_none());

        let log = cmd_errors(&index, Some("2024-25")).await.unwrap();
        assert!(log.errors.is_empty());
        let log = cmd_errors(&index, None).await.unwrap();
        assert_eq!(log.errors[0].error_kind, "fetch_failure");
    }
}
