//! Normalize command implementation
//!
//! Re-derives player-game and team-game aggregates for a season from its
//! verified raw pbp units.

use crate::boxscore::{aggregate, PeriodClock};
use crate::commands::ingest::CancelFlag;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{GameIndex, RunOperation, RunStatus, RunTotals};
use crate::models::{Dataset, PbpEvent};
use crate::progress::{advance, finish, game_progress};
use crate::store::{StoredUnit, UnitKey, UnitStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// A unit that could not be normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitIssue {
    pub game_id: String,
    pub season: String,
    pub dataset: Dataset,
    pub error_kind: String,
    pub message: String,
}

impl UnitIssue {
    fn new(key: &UnitKey, err: &Error) -> Self {
        Self {
            game_id: key.game_id.clone(),
            season: key.season.clone(),
            dataset: key.dataset,
            error_kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result of a normalization pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub season: String,
    /// Units aggregated (written or already up to date)
    pub accepted: usize,
    /// Accepted units whose output was already on disk byte for byte
    pub unchanged: usize,
    pub player_rows: usize,
    pub team_rows: usize,
    pub skipped_corrupted: Vec<UnitIssue>,
    pub cross_season_duplicates: Vec<UnitIssue>,
    /// Accepted games with no date in any raw row
    pub missing_dates: Vec<String>,
    pub failed: Vec<UnitIssue>,
    /// Units not started because the pass was cancelled
    pub cancelled: usize,
}

/// Per-identifier season claims for one pass
#[derive(Debug, Default)]
pub struct ClaimMap {
    claims: Mutex<HashMap<String, String>>,
}

impl ClaimMap {
    /// Claim `game_id` for `season`.
    ///
    /// Returns the season already holding the claim when it differs.
    pub fn claim(&self, game_id: &str, season: &str) -> Option<String> {
        let mut claims = match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match claims.get(game_id) {
            Some(existing) if existing != season => Some(existing.clone()),
            Some(_) => None,
            None => {
                claims.insert(game_id.to_string(), season.to_string());
                None
            }
        }
    }
}

enum Outcome {
    Written {
        rewritten: bool,
        players: usize,
        teams: usize,
        has_date: bool,
    },
    Corrupted(UnitIssue),
    Duplicate(UnitIssue),
    Failed(UnitIssue),
    Cancelled,
}

/// Normalize every raw pbp unit of `season`
pub async fn cmd_normalize(
    config: &Config,
    index: &GameIndex,
    store: &UnitStore,
    season: &str,
    cancel: &CancelFlag,
) -> Result<NormalizationReport> {
    let run = index
        .start_run(RunOperation::Normalize, season, None)
        .await?;
    let keys = store.list_units(Dataset::Pbp, Some(season))?;
    info!("Normalizing {} pbp units for season {}", keys.len(), season);

    let clock = PeriodClock::from(&config.normalize);
    let claims = ClaimMap::default();
    let pb = game_progress(keys.len(), &format!("{} normalize", season));
    let progress = &pb;
    let claims_ref = &claims;
    let clock_ref = &clock;

    let outcomes: Vec<(String, Outcome)> = stream::iter(keys)
        .map(|key| async move {
            if cancel.is_cancelled() {
                return (key.game_id, Outcome::Cancelled);
            }
            let outcome = normalize_unit(index, store, claims_ref, clock_ref, &key).await;
            advance(progress);
            (key.game_id, outcome)
        })
        .buffer_unordered(config.normalize.concurrency)
        .collect()
        .await;
    finish(pb, "done");

    let mut report = NormalizationReport {
        season: season.to_string(),
        ..Default::default()
    };
    for (game_id, outcome) in outcomes {
        match outcome {
            Outcome::Written {
                rewritten,
                players,
                teams,
                has_date,
            } => {
                report.accepted += 1;
                if !rewritten {
                    report.unchanged += 1;
                }
                report.player_rows += players;
                report.team_rows += teams;
                if !has_date {
                    report.missing_dates.push(game_id);
                }
            }
            Outcome::Corrupted(issue) => report.skipped_corrupted.push(issue),
            Outcome::Duplicate(issue) => report.cross_season_duplicates.push(issue),
            Outcome::Failed(issue) => report.failed.push(issue),
            Outcome::Cancelled => report.cancelled += 1,
        }
    }
    report.missing_dates.sort();
    for issues in [
        &mut report.skipped_corrupted,
        &mut report.cross_season_duplicates,
        &mut report.failed,
    ] {
        issues.sort_by(|a, b| a.game_id.cmp(&b.game_id));
    }

    let rejected = report.skipped_corrupted.len()
        + report.cross_season_duplicates.len()
        + report.failed.len();
    let status = if report.cancelled > 0 {
        warn!(
            "Normalization of season {} cancelled: {} units not started",
            season, report.cancelled
        );
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    index
        .complete_run(
            &run.id,
            status,
            RunTotals {
                processed: (report.accepted + rejected) as i64,
                succeeded: report.accepted as i64,
                failed: rejected as i64,
                errors: report
                    .skipped_corrupted
                    .iter()
                    .chain(&report.cross_season_duplicates)
                    .chain(&report.failed)
                    .map(|i| format!("{}: {}", i.game_id, i.message))
                    .collect(),
            },
        )
        .await?;

    info!(
        "Normalized season {}: {} accepted ({} unchanged), {} rejected",
        season, report.accepted, report.unchanged, rejected
    );
    Ok(report)
}

async fn normalize_unit(
    index: &GameIndex,
    store: &UnitStore,
    claims: &ClaimMap,
    clock: &PeriodClock,
    key: &UnitKey,
) -> Outcome {
    let raw = match store.read_verified::<PbpEvent>(key).await {
        Ok(raw) => raw,
        Err(err @ Error::SkippedCorrupted { .. }) => {
            warn!(game_id = %key.game_id, "Skipping corrupted unit: {}", err);
            quarantine(index, key, &err.to_string()).await;
            return Outcome::Corrupted(UnitIssue::new(key, &err));
        }
        Err(err) => return Outcome::Failed(UnitIssue::new(key, &err)),
    };

    match find_other_seasons(store, claims, key).await {
        Ok(others) if !others.is_empty() => {
            let mut seasons = others.clone();
            seasons.push(key.season.clone());
            seasons.sort();
            let err = Error::CrossSeasonDuplicate {
                game_id: key.game_id.clone(),
                seasons,
            };
            warn!(game_id = %key.game_id, "{}", err);
            quarantine(index, key, &err.to_string()).await;
            for other in &others {
                let other_key = UnitKey::new(Dataset::Pbp, other, &key.game_id);
                quarantine(index, &other_key, &err.to_string()).await;
            }
            return Outcome::Duplicate(UnitIssue::new(key, &err));
        }
        Ok(_) => {}
        Err(err) => return Outcome::Failed(UnitIssue::new(key, &err)),
    }

    match write_aggregates(index, store, clock, key, &raw).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(game_id = %key.game_id, "Normalization failed: {}", err);
            Outcome::Failed(UnitIssue::new(key, &err))
        }
    }
}

/// Seasons other than `key.season` that also hold this game
async fn find_other_seasons(
    store: &UnitStore,
    claims: &ClaimMap,
    key: &UnitKey,
) -> Result<Vec<String>> {
    let mut others = Vec::new();
    if let Some(existing) = claims.claim(&key.game_id, &key.season) {
        others.push(existing);
    }

    for dataset in Dataset::NORMALIZED {
        for season in store.find_partitions(dataset, &key.game_id)? {
            if season != key.season && !others.contains(&season) {
                others.push(season);
            }
        }
    }

    // A raw copy elsewhere only counts if it genuinely belongs to that season
    for season in store.find_partitions(Dataset::Pbp, &key.game_id)? {
        if season == key.season || others.contains(&season) {
            continue;
        }
        let other = UnitKey::new(Dataset::Pbp, &season, &key.game_id);
        if store.read_verified::<PbpEvent>(&other).await.is_ok() {
            others.push(season);
        }
    }

    others.sort();
    Ok(others)
}

async fn write_aggregates(
    index: &GameIndex,
    store: &UnitStore,
    clock: &PeriodClock,
    key: &UnitKey,
    raw: &StoredUnit<PbpEvent>,
) -> Result<Outcome> {
    let game = index.get(&key.game_id).await?;
    if game.season != key.season {
        return Err(Error::IdentityMismatch {
            field: "season",
            expected: game.season,
            found: key.season.clone(),
        });
    }

    let box_score = aggregate(&raw.rows, clock)?;
    // has_boxscore tracks team_game; player_game never exists without it
    if box_score.teams.is_empty() {
        return Err(Error::Malformed(format!(
            "no team-attributed events in {}",
            key
        )));
    }
    let players = box_score.players.len();
    let teams = box_score.teams.len();
    let has_date = box_score.game_date.is_some();

    let mut rewritten = false;
    if !box_score.players.is_empty() {
        let unit = StoredUnit::derived(box_score.players, raw, "boxscore/player_game")?;
        let player_key = UnitKey::new(Dataset::PlayerGame, &key.season, &key.game_id);
        rewritten |= store.write_if_changed(&player_key, &unit).await?;
    }
    let unit = StoredUnit::derived(box_score.teams, raw, "boxscore/team_game")?;
    let team_key = UnitKey::new(Dataset::TeamGame, &key.season, &key.game_id);
    rewritten |= store.write_if_changed(&team_key, &unit).await?;
    index
        .mark_dataset_present(&key.game_id, Dataset::TeamGame)
        .await?;

    debug!(
        game_id = %key.game_id,
        players, teams, rewritten, "Aggregated box score"
    );
    Ok(Outcome::Written {
        rewritten,
        players,
        teams,
        has_date,
    })
}

async fn quarantine(index: &GameIndex, key: &UnitKey, reason: &str) {
    if let Err(e) = index
        .quarantine(key.dataset, &key.season, &key.game_id, reason)
        .await
    {
        warn!(game_id = %key.game_id, "Could not quarantine {}: {}", key, e);
    }
}

/// Print a normalization report to console
pub fn print_normalization_report(report: &NormalizationReport) {
    println!("\n✓ Normalized season {}", report.season);
    println!(
        "  Accepted: {} ({} unchanged)",
        report.accepted, report.unchanged
    );
    println!(
        "  Rows: {} player-game, {} team-game",
        report.player_rows, report.team_rows
    );

    let sections = [
        ("Skipped (corrupted)", &report.skipped_corrupted),
        ("Cross-season duplicates", &report.cross_season_duplicates),
        ("Failed", &report.failed),
    ];
    for (title, issues) in sections {
        if issues.is_empty() {
            continue;
        }
        println!("\n{}:", title);
        for issue in issues {
            println!("  ✗ {} {}", issue.game_id, issue.message);
        }
    }

    if !report.missing_dates.is_empty() {
        println!("\n⚠ Games without a date: {}", report.missing_dates.join(", "));
    }
    if report.cancelled > 0 {
        println!("\n  Cancelled before start: {}", report.cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{timestamp, GameRecord};
    use crate::models::{EventType, GameStatus};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const SEASON: &str = "2023-24";

    fn events(game_id: &str, season: &str, dated: bool) -> Vec<PbpEvent> {
        let base = PbpEvent {
            game_id: game_id.to_string(),
            season: season.to_string(),
            event_num: 1,
            period: 1,
            clock: "11:00".to_string(),
            event_type: EventType::MadeShot,
            team_id: Some("LAL".to_string()),
            player_id: Some("p1".to_string()),
            home_score: 2,
            away_score: 0,
            shot_value: Some(2),
            game_date: dated.then(|| NaiveDate::from_ymd_opt(2023, 11, 2).unwrap()),
            x: None,
            y: None,
        };
        let second = PbpEvent {
            event_num: 2,
            clock: "10:30".to_string(),
            team_id: Some("BOS".to_string()),
            player_id: Some("p2".to_string()),
            home_score: 2,
            away_score: 3,
            shot_value: Some(3),
            ..base.clone()
        };
        vec![base, second]
    }

    async fn setup() -> (Config, GameIndex, UnitStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let index = GameIndex::connect(&config).await.unwrap();
        let store = UnitStore::from_config(&config);
        (config, index, store, tmp)
    }

    async fn add_game(index: &GameIndex, store: &UnitStore, game_id: &str, season: &str) {
        index
            .upsert(&GameRecord::new(
                game_id.to_string(),
                season.to_string(),
                "nba-regular".to_string(),
                GameStatus::Final,
                "LAL".to_string(),
                "BOS".to_string(),
            ))
            .await
            .unwrap();
        let unit = StoredUnit::fetched(events(game_id, season, true), "test", "pbp", timestamp())
            .unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, season, game_id), &unit)
            .await
            .unwrap();
    }

    #[test]
    fn test_claim_map() {
        let claims = ClaimMap::default();
        assert_eq!(claims.claim("G1", "2023-24"), None);
        assert_eq!(claims.claim("G1", "2023-24"), None);
        assert_eq!(claims.claim("G1", "2022-23"), Some("2023-24".to_string()));
        assert_eq!(claims.claim("G2", "2022-23"), None);
    }

    #[tokio::test]
    async fn test_normalize_writes_aggregates() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", SEASON).await;

        let report = cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.unchanged, 0);
        assert_eq!(report.player_rows, 2);
        assert_eq!(report.team_rows, 2);
        assert!(report.missing_dates.is_empty());
        assert!(index.get("G1").await.unwrap().has_boxscore);

        let teams = store
            .read_verified::<crate::boxscore::TeamGameRow>(&UnitKey::new(
                Dataset::TeamGame,
                SEASON,
                "G1",
            ))
            .await
            .unwrap();
        assert_eq!(teams.rows[0].team_id, "BOS");
        assert_eq!(teams.rows[0].stats.points, 3);
    }

    #[tokio::test]
    async fn test_normalize_is_idempotent() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", SEASON).await;
        add_game(&index, &store, "G2", SEASON).await;

        cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        let key = UnitKey::new(Dataset::PlayerGame, SEASON, "G2");
        let first = store.read_bytes(&key).await.unwrap().unwrap();

        let again = cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(again.accepted, 2);
        assert_eq!(again.unchanged, 2);
        assert_eq!(store.read_bytes(&key).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn test_misfiled_unit_is_skipped_and_quarantined() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", "2022-23").await;

        // Same bytes copied under the wrong season
        let source = store.unit_path(&UnitKey::new(Dataset::Pbp, "2022-23", "G1"));
        let target = store.unit_path(&UnitKey::new(Dataset::Pbp, SEASON, "G1"));
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::copy(&source, &target).unwrap();

        let report = cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(report.skipped_corrupted.len(), 1);
        assert_eq!(report.skipped_corrupted[0].error_kind, "skipped_corrupted");
        assert!(!store.exists(&UnitKey::new(Dataset::PlayerGame, SEASON, "G1")));

        let quarantined = index.list_quarantine(Some(SEASON)).await.unwrap();
        assert_eq!(quarantined.len(), 1);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_cross_season_duplicate_is_rejected() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", "2022-23").await;
        // The provider also served G1 as a game of the next season
        let unit = StoredUnit::fetched(events("G1", SEASON, true), "test", "pbp", timestamp())
            .unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, SEASON, "G1"), &unit)
            .await
            .unwrap();

        let report = cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(report.cross_season_duplicates.len(), 1);
        assert!(report.cross_season_duplicates[0].message.contains("2022-23"));
        assert_eq!(index.list_quarantine(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_game_date_is_reported() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", SEASON).await;
        let unit = StoredUnit::fetched(events("G1", SEASON, false), "test", "pbp", timestamp())
            .unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, SEASON, "G1"), &unit)
            .await
            .unwrap();

        let report = cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.missing_dates, vec!["G1".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_pass_writes_nothing() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", SEASON).await;
        add_game(&index, &store, "G2", SEASON).await;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = cmd_normalize(&config, &index, &store, SEASON, &cancel)
            .await
            .unwrap();
        assert_eq!(report.cancelled, 2);
        assert_eq!(report.accepted, 0);
        assert!(store.list_units(Dataset::PlayerGame, Some(SEASON)).unwrap().is_empty());
        assert_eq!(
            index.latest_run(SEASON).await.unwrap().unwrap().status,
            "cancelled"
        );
    }

    #[tokio::test]
    async fn test_game_without_team_rows_writes_no_box_score() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", SEASON).await;
        let mut rows = events("G1", SEASON, true);
        for row in &mut rows {
            row.team_id = None;
        }
        let unit = StoredUnit::fetched(rows, "test", "pbp", timestamp()).unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, SEASON, "G1"), &unit)
            .await
            .unwrap();

        let report = cmd_normalize(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].error_kind, "malformed");
        for dataset in Dataset::NORMALIZED {
            assert!(!store.exists(&UnitKey::new(dataset, SEASON, "G1")));
        }
        assert!(!index.get("G1").await.unwrap().has_boxscore);
    }
}
