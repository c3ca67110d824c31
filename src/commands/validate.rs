//! Validate command implementation
//!
//! Runs every consistency check over a season, then persists the readiness
//! entry and one metrics row. Checks never short-circuit each other.

use crate::boxscore::{PlayerGameRow, TeamGameRow};
use crate::commands::ingest::CancelFlag;
use crate::commands::ready::{evaluate_readiness, format_pct, ReadinessArtifact, ReadinessEntry};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{timestamp, GameIndex, GameRecord, RunOperation, RunStatus, RunTotals};
use crate::models::{Dataset, GameStatus, PbpEvent, ShotAttempt};
use crate::store::{StoredUnit, UnitKey, UnitRow, UnitStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Consistency check a finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    IdentityIntegrity,
    PartitionDuplication,
    IntraGameInvariant,
    CrossDatasetAgreement,
    IndexDiskAgreement,
    Coverage,
    GameDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One validator finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check: CheckKind,
    pub severity: Severity,
    pub game_id: Option<String>,
    pub dataset: Option<Dataset>,
    pub message: String,
}

/// Coverage of final games by verified raw units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub final_games: usize,
    pub pbp_games: usize,
    pub shots_games: usize,
    pub pbp_pct: f64,
    pub shots_pct: f64,
}

impl Coverage {
    fn compute(games: &[GameRecord], pbp: &BTreeSet<String>, shots: &BTreeSet<String>) -> Self {
        let finals: Vec<&GameRecord> = games
            .iter()
            .filter(|g| g.status == GameStatus::Final)
            .collect();
        let pbp_games = finals.iter().filter(|g| pbp.contains(&g.game_id)).count();
        let shots_games = finals.iter().filter(|g| shots.contains(&g.game_id)).count();
        Self {
            final_games: finals.len(),
            pbp_games,
            shots_games,
            pbp_pct: percentage(pbp_games, finals.len()),
            shots_pct: percentage(shots_games, finals.len()),
        }
    }
}

/// `covered / total` as a percentage; zero when there is nothing to cover
fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (covered * 100) as f64 / total as f64
    }
}

/// Result of one validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub season: String,
    pub run_id: String,
    pub validated_at: String,
    pub units_checked: usize,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub coverage: Coverage,
    /// No errors from the integrity, duplication, invariant, agreement or
    /// index checks
    pub consistent: bool,
    pub ready: bool,
    pub reasons: Vec<String>,
    /// Units left unread because the run was cancelled; such a run is not
    /// persisted
    pub cancelled: usize,
}

/// One row of `metrics.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRow {
    pub season: String,
    pub run_id: String,
    pub validated_at: String,
    pub final_games: usize,
    pub pbp_coverage: f64,
    pub shots_coverage: f64,
    pub error_count: usize,
    pub warning_count: usize,
    pub ready: bool,
}

#[derive(Default)]
struct Findings(Vec<Finding>);

impl Findings {
    fn push(
        &mut self,
        check: CheckKind,
        severity: Severity,
        game_id: Option<&str>,
        dataset: Option<Dataset>,
        message: String,
    ) {
        self.0.push(Finding {
            check,
            severity,
            game_id: game_id.map(str::to_string),
            dataset,
            message,
        });
    }

    fn error(&mut self, check: CheckKind, game_id: &str, dataset: Option<Dataset>, message: String) {
        self.push(check, Severity::Error, Some(game_id), dataset, message);
    }

    fn warning(&mut self, check: CheckKind, game_id: &str, dataset: Option<Dataset>, message: String) {
        self.push(check, Severity::Warning, Some(game_id), dataset, message);
    }
}

/// Verified units of one season, keyed by game id
#[derive(Default)]
struct SeasonUnits {
    pbp: BTreeMap<String, StoredUnit<PbpEvent>>,
    shots: BTreeMap<String, StoredUnit<ShotAttempt>>,
    player_game: BTreeMap<String, StoredUnit<PlayerGameRow>>,
    team_game: BTreeMap<String, StoredUnit<TeamGameRow>>,
    /// Every unit file found, verified or not
    on_disk: BTreeMap<Dataset, BTreeSet<String>>,
    /// Units skipped after cancellation
    cancelled: usize,
}

impl SeasonUnits {
    fn verified(&self, dataset: Dataset) -> BTreeSet<String> {
        match dataset {
            Dataset::Pbp => self.pbp.keys().cloned().collect(),
            Dataset::Shots => self.shots.keys().cloned().collect(),
            Dataset::PlayerGame => self.player_game.keys().cloned().collect(),
            Dataset::TeamGame => self.team_game.keys().cloned().collect(),
        }
    }

    fn unit_count(&self) -> usize {
        self.on_disk.values().map(BTreeSet::len).sum()
    }
}

/// Run all consistency checks for `season`
pub async fn cmd_validate(
    config: &Config,
    index: &GameIndex,
    store: &UnitStore,
    season: &str,
    cancel: &CancelFlag,
) -> Result<ValidationReport> {
    let run = index.start_run(RunOperation::Validate, season, None).await?;
    info!("Validating season {}", season);

    let games = index.list(Some(season), None).await?;
    let mut findings = Findings::default();
    let units = load_season(
        store,
        season,
        config.normalize.concurrency,
        cancel,
        &mut findings,
    )
    .await?;
    if units.cancelled > 0 {
        return cancelled_report(index, &run.id, season, &games, &units, findings).await;
    }

    check_duplication(store, season, &games, &units, &mut findings)?;
    check_invariants(&units, &mut findings);
    check_cross_dataset(&units, config.validate.made_shot_tolerance, &mut findings);
    check_index_agreement(index, season, &games, &units, &mut findings).await?;
    check_game_dates(&units, &mut findings);

    let coverage = Coverage::compute(
        &games,
        &units.verified(Dataset::Pbp),
        &units.verified(Dataset::Shots),
    );

    let mut all = findings.0;
    all.sort_by(|a, b| {
        (a.check, &a.game_id, a.dataset).cmp(&(b.check, &b.game_id, b.dataset))
    });
    let (errors, warnings): (Vec<_>, Vec<_>) =
        all.into_iter().partition(|f| f.severity == Severity::Error);

    let (ready, reasons) = evaluate_readiness(
        coverage.pbp_pct,
        coverage.shots_pct,
        errors.len(),
        &config.readiness,
    );

    let report = ValidationReport {
        season: season.to_string(),
        run_id: run.id.clone(),
        validated_at: timestamp(),
        units_checked: units.unit_count(),
        consistent: errors.is_empty(),
        errors,
        warnings,
        coverage,
        ready,
        reasons,
        cancelled: 0,
    };

    persist(config, &report)?;

    index
        .complete_run(
            &run.id,
            RunStatus::Completed,
            RunTotals {
                processed: report.units_checked as i64,
                succeeded: (report.units_checked as i64
                    - report
                        .errors
                        .iter()
                        .filter(|f| f.check == CheckKind::IdentityIntegrity)
                        .count() as i64)
                    .max(0),
                failed: report.errors.len() as i64,
                errors: report.errors.iter().map(|f| f.message.clone()).collect(),
            },
        )
        .await?;

    info!(
        "Validated season {}: {} errors, {} warnings, pbp {}, shots {}",
        season,
        report.errors.len(),
        report.warnings.len(),
        format_pct(report.coverage.pbp_pct),
        format_pct(report.coverage.shots_pct)
    );
    Ok(report)
}

/// Partial result of a run stopped between unit reads. Readiness and metrics are
/// left as the last complete run wrote them.
async fn cancelled_report(
    index: &GameIndex,
    run_id: &str,
    season: &str,
    games: &[GameRecord],
    units: &SeasonUnits,
    findings: Findings,
) -> Result<ValidationReport> {
    warn!(
        "Validation of season {} cancelled: {} units unchecked, readiness not updated",
        season, units.cancelled
    );
    let (errors, warnings): (Vec<_>, Vec<_>) = findings
        .0
        .into_iter()
        .partition(|f| f.severity == Severity::Error);

    index
        .complete_run(
            run_id,
            RunStatus::Cancelled,
            RunTotals {
                processed: units.unit_count() as i64,
                succeeded: units.unit_count().saturating_sub(errors.len()) as i64,
                failed: errors.len() as i64,
                errors: errors.iter().map(|f| f.message.clone()).collect(),
            },
        )
        .await?;

    Ok(ValidationReport {
        season: season.to_string(),
        run_id: run_id.to_string(),
        validated_at: timestamp(),
        units_checked: units.unit_count(),
        consistent: false,
        errors,
        warnings,
        coverage: Coverage::compute(
            games,
            &units.verified(Dataset::Pbp),
            &units.verified(Dataset::Shots),
        ),
        ready: false,
        reasons: vec![format!(
            "validation cancelled with {} units unchecked",
            units.cancelled
        )],
        cancelled: units.cancelled,
    })
}

type UnitReads<T> = Vec<(UnitKey, Option<Result<StoredUnit<T>>>)>;

/// Read every unit of `dataset`; units reached after cancellation are `None`
async fn read_units<T: UnitRow>(
    store: &UnitStore,
    dataset: Dataset,
    season: &str,
    concurrency: usize,
    cancel: &CancelFlag,
) -> Result<UnitReads<T>> {
    let keys = store.list_units(dataset, Some(season))?;
    Ok(stream::iter(keys)
        .map(|key| async move {
            if cancel.is_cancelled() {
                return (key, None);
            }
            let unit = store.read_verified::<T>(&key).await;
            (key, Some(unit))
        })
        .buffer_unordered(concurrency)
        .collect()
        .await)
}

/// Identity integrity: every unit must verify against its partition
fn keep_verified<T>(
    results: UnitReads<T>,
    on_disk: &mut BTreeMap<Dataset, BTreeSet<String>>,
    cancelled: &mut usize,
    findings: &mut Findings,
) -> BTreeMap<String, StoredUnit<T>> {
    let mut verified = BTreeMap::new();
    for (key, result) in results {
        let Some(result) = result else {
            *cancelled += 1;
            continue;
        };
        on_disk
            .entry(key.dataset)
            .or_default()
            .insert(key.game_id.clone());
        match result {
            Ok(unit) => {
                verified.insert(key.game_id, unit);
            }
            Err(e) => {
                debug!(game_id = %key.game_id, "Unit failed verification: {}", e);
                findings.error(
                    CheckKind::IdentityIntegrity,
                    &key.game_id,
                    Some(key.dataset),
                    e.to_string(),
                );
            }
        }
    }
    verified
}

async fn load_season(
    store: &UnitStore,
    season: &str,
    concurrency: usize,
    cancel: &CancelFlag,
    findings: &mut Findings,
) -> Result<SeasonUnits> {
    let mut units = SeasonUnits::default();
    let pbp = read_units::<PbpEvent>(store, Dataset::Pbp, season, concurrency, cancel).await?;
    units.pbp = keep_verified(pbp, &mut units.on_disk, &mut units.cancelled, findings);
    let shots =
        read_units::<ShotAttempt>(store, Dataset::Shots, season, concurrency, cancel).await?;
    units.shots = keep_verified(shots, &mut units.on_disk, &mut units.cancelled, findings);
    let players =
        read_units::<PlayerGameRow>(store, Dataset::PlayerGame, season, concurrency, cancel)
            .await?;
    units.player_game = keep_verified(players, &mut units.on_disk, &mut units.cancelled, findings);
    let teams =
        read_units::<TeamGameRow>(store, Dataset::TeamGame, season, concurrency, cancel).await?;
    units.team_game = keep_verified(teams, &mut units.on_disk, &mut units.cancelled, findings);
    Ok(units)
}

/// A game id may live under one season partition per dataset
fn check_duplication(
    store: &UnitStore,
    season: &str,
    games: &[GameRecord],
    units: &SeasonUnits,
    findings: &mut Findings,
) -> Result<()> {
    let mut ids: BTreeSet<&str> = games.iter().map(|g| g.game_id.as_str()).collect();
    for present in units.on_disk.values() {
        ids.extend(present.iter().map(String::as_str));
    }

    for game_id in ids {
        for dataset in Dataset::ALL {
            let seasons = store.find_partitions(dataset, game_id)?;
            if seasons.len() > 1 && seasons.iter().any(|s| s == season) {
                let err = Error::CrossSeasonDuplicate {
                    game_id: game_id.to_string(),
                    seasons,
                };
                findings.error(
                    CheckKind::PartitionDuplication,
                    game_id,
                    Some(dataset),
                    err.to_string(),
                );
            }
        }
    }
    Ok(())
}

/// First violation of score or period monotonicity, in event order
pub fn monotonicity_violation(events: &[PbpEvent]) -> Option<Error> {
    let mut ordered: Vec<&PbpEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.event_num);

    for pair in ordered.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let message = if next.period < prev.period {
            format!(
                "period goes back from {} to {} at event {}",
                prev.period, next.period, next.event_num
            )
        } else if next.home_score < prev.home_score {
            format!(
                "home score drops from {} to {} at event {}",
                prev.home_score, next.home_score, next.event_num
            )
        } else if next.away_score < prev.away_score {
            format!(
                "away score drops from {} to {} at event {}",
                prev.away_score, next.away_score, next.event_num
            )
        } else {
            continue;
        };
        return Some(Error::InvariantViolation {
            game_id: next.game_id.clone(),
            message,
        });
    }
    None
}

fn check_invariants(units: &SeasonUnits, findings: &mut Findings) {
    for (game_id, unit) in &units.pbp {
        if let Some(err) = monotonicity_violation(&unit.rows) {
            findings.error(
                CheckKind::IntraGameInvariant,
                game_id,
                Some(Dataset::Pbp),
                err.to_string(),
            );
        }
    }
}

/// Made field goals in pbp against made rows in the shot table
fn check_cross_dataset(units: &SeasonUnits, tolerance: u32, findings: &mut Findings) {
    for (game_id, pbp) in &units.pbp {
        let Some(shots) = units.shots.get(game_id) else {
            continue;
        };
        let pbp_made = pbp
            .rows
            .iter()
            .filter(|e| e.event_type.is_made_field_goal())
            .count();
        let shots_made = shots.rows.iter().filter(|s| s.made).count();
        let diff = pbp_made.abs_diff(shots_made);
        if diff == 0 {
            continue;
        }

        let message = format!(
            "pbp has {} made field goals, shots has {} made attempts",
            pbp_made, shots_made
        );
        if diff <= tolerance as usize {
            findings.warning(CheckKind::CrossDatasetAgreement, game_id, None, message);
        } else {
            findings.error(CheckKind::CrossDatasetAgreement, game_id, None, message);
        }
    }
}

/// Index flags must match the presence of verified units
async fn check_index_agreement(
    index: &GameIndex,
    season: &str,
    games: &[GameRecord],
    units: &SeasonUnits,
    findings: &mut Findings,
) -> Result<()> {
    let flagged = [
        (Dataset::Pbp, units.verified(Dataset::Pbp)),
        (Dataset::Shots, units.verified(Dataset::Shots)),
        (Dataset::TeamGame, units.verified(Dataset::TeamGame)),
    ];

    for game in games {
        for (dataset, verified) in &flagged {
            let flag = game.has(*dataset);
            let present = verified.contains(&game.game_id);
            if flag != present {
                let message = if flag {
                    format!("{} is set but no verified {} unit exists", dataset.flag_column(), dataset)
                } else {
                    format!("verified {} unit exists but {} is not set", dataset, dataset.flag_column())
                };
                findings.error(
                    CheckKind::IndexDiskAgreement,
                    &game.game_id,
                    Some(*dataset),
                    message,
                );
            }
        }
    }

    let indexed: BTreeSet<&str> = games.iter().map(|g| g.game_id.as_str()).collect();
    for (dataset, present) in &units.on_disk {
        for game_id in present {
            if indexed.contains(game_id.as_str()) {
                continue;
            }
            match index.find(game_id).await? {
                Some(other) => findings.error(
                    CheckKind::IndexDiskAgreement,
                    game_id,
                    Some(*dataset),
                    format!(
                        "unit stored under season {} but the game is indexed under {}",
                        season, other.season
                    ),
                ),
                None => findings.warning(
                    CheckKind::IndexDiskAgreement,
                    game_id,
                    Some(*dataset),
                    "unit has no Game Index record".to_string(),
                ),
            }
        }
    }
    Ok(())
}

fn check_game_dates(units: &SeasonUnits, findings: &mut Findings) {
    let player_gaps = units
        .player_game
        .iter()
        .filter(|(_, u)| u.rows.iter().any(|r| r.game_date.is_none()))
        .map(|(id, _)| (id, Dataset::PlayerGame));
    let team_gaps = units
        .team_game
        .iter()
        .filter(|(_, u)| u.rows.iter().any(|r| r.game_date.is_none()))
        .map(|(id, _)| (id, Dataset::TeamGame));

    for (game_id, dataset) in player_gaps.chain(team_gaps) {
        findings.warning(
            CheckKind::GameDate,
            game_id,
            Some(dataset),
            "normalized rows have no game date".to_string(),
        );
    }
}

fn persist(config: &Config, report: &ValidationReport) -> Result<()> {
    ReadinessArtifact::record(
        &config.paths.readiness_file,
        ReadinessEntry {
            season: report.season.clone(),
            ready: report.ready,
            pbp_coverage: report.coverage.pbp_pct,
            shots_coverage: report.coverage.shots_pct,
            error_count: report.errors.len(),
            warning_count: report.warnings.len(),
            reasons: report.reasons.clone(),
            validated_at: report.validated_at.clone(),
        },
    )?;

    let row = MetricsRow {
        season: report.season.clone(),
        run_id: report.run_id.clone(),
        validated_at: report.validated_at.clone(),
        final_games: report.coverage.final_games,
        pbp_coverage: report.coverage.pbp_pct,
        shots_coverage: report.coverage.shots_pct,
        error_count: report.errors.len(),
        warning_count: report.warnings.len(),
        ready: report.ready,
    };
    if let Err(e) = append_metrics(&config.paths.metrics_file, &row) {
        warn!("Could not append metrics row: {}", e);
    }
    Ok(())
}

fn append_metrics(path: &Path, row: &MetricsRow) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut line = serde_json::to_vec(row)?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

/// Print a validation report to console
pub fn print_validation_report(report: &ValidationReport) {
    let mark = if report.ready { "✓" } else { "✗" };
    println!("\n{} Validated season {}", mark, report.season);
    println!("  Units checked: {}", report.units_checked);
    println!(
        "  Coverage: pbp {} ({}/{}), shots {} ({}/{})",
        format_pct(report.coverage.pbp_pct),
        report.coverage.pbp_games,
        report.coverage.final_games,
        format_pct(report.coverage.shots_pct),
        report.coverage.shots_games,
        report.coverage.final_games
    );

    for (title, findings) in [("Errors", &report.errors), ("Warnings", &report.warnings)] {
        if findings.is_empty() {
            continue;
        }
        println!("\n{} ({}):", title, findings.len());
        for finding in findings {
            let target = match (&finding.game_id, finding.dataset) {
                (Some(id), Some(d)) => format!("{} {}", id, d),
                (Some(id), None) => id.clone(),
                _ => "-".to_string(),
            };
            println!("  [{:?}] {}: {}", finding.check, target, finding.message);
        }
    }

    if report.cancelled > 0 {
        println!(
            "\n⚠ Cancelled with {} units unchecked; readiness left unchanged",
            report.cancelled
        );
    }

    if !report.reasons.is_empty() {
        println!("\nNot ready:");
        for reason in &report.reasons {
            println!("  - {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ready::is_ready;
    use crate::models::{EventType, ShotType};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const SEASON: &str = "2023-24";

    fn pbp(game_id: &str, scores: &[(u32, u32)]) -> Vec<PbpEvent> {
        scores
            .iter()
            .enumerate()
            .map(|(i, (home, away))| PbpEvent {
                game_id: game_id.to_string(),
                season: SEASON.to_string(),
                event_num: i as u32 + 1,
                period: 1,
                clock: "10:00".to_string(),
                event_type: EventType::MadeShot,
                team_id: Some("LAL".to_string()),
                player_id: Some("p1".to_string()),
                home_score: *home,
                away_score: *away,
                shot_value: Some(2),
                game_date: NaiveDate::from_ymd_opt(2023, 11, 2),
                x: None,
                y: None,
            })
            .collect()
    }

    fn shots(game_id: &str, made: usize) -> Vec<ShotAttempt> {
        (0..made)
            .map(|i| ShotAttempt {
                game_id: game_id.to_string(),
                season: SEASON.to_string(),
                shot_num: i as u32 + 1,
                period: 1,
                clock: "10:00".to_string(),
                team_id: Some("LAL".to_string()),
                player_id: Some("p1".to_string()),
                shot_type: ShotType::TwoPoint,
                made: true,
                x: None,
                y: None,
                game_date: NaiveDate::from_ymd_opt(2023, 11, 2),
            })
            .collect()
    }

    async fn setup() -> (Config, GameIndex, UnitStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let index = GameIndex::connect(&config).await.unwrap();
        let store = UnitStore::from_config(&config);
        (config, index, store, tmp)
    }

    async fn add_game(
        index: &GameIndex,
        store: &UnitStore,
        game_id: &str,
        events: Vec<PbpEvent>,
        shot_rows: Vec<ShotAttempt>,
    ) {
        index
            .upsert(&GameRecord::new(
                game_id.to_string(),
                SEASON.to_string(),
                "nba-regular".to_string(),
                GameStatus::Final,
                "LAL".to_string(),
                "BOS".to_string(),
            ))
            .await
            .unwrap();
        let fetched_at = timestamp();
        let unit = StoredUnit::fetched(events, "test", "pbp", fetched_at.clone()).unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, SEASON, game_id), &unit)
            .await
            .unwrap();
        index.mark_dataset_present(game_id, Dataset::Pbp).await.unwrap();
        let unit = StoredUnit::fetched(shot_rows, "test", "shots", fetched_at).unwrap();
        store
            .write(&UnitKey::new(Dataset::Shots, SEASON, game_id), &unit)
            .await
            .unwrap();
        index.mark_dataset_present(game_id, Dataset::Shots).await.unwrap();
    }

    #[test]
    fn test_percentage_of_empty_season_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(9, 10), 90.0);
        assert_eq!(percentage(19, 20), 95.0);
    }

    #[test]
    fn test_monotonicity_violation() {
        assert!(monotonicity_violation(&pbp("G1", &[(2, 0), (2, 2), (4, 2)])).is_none());

        let err = monotonicity_violation(&pbp("G1", &[(2, 0), (4, 0), (3, 0)])).unwrap();
        assert_eq!(err.kind(), "invariant_violation");
        assert!(err.to_string().contains("home score drops from 4 to 3"));

        let mut events = pbp("G1", &[(0, 0), (0, 0)]);
        events[0].period = 2;
        assert!(monotonicity_violation(&events)
            .unwrap()
            .to_string()
            .contains("period goes back"));
    }

    #[tokio::test]
    async fn test_clean_season_is_ready_and_persisted() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", pbp("G1", &[(2, 0), (4, 0)]), shots("G1", 2)).await;

        let report = cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(report.consistent);
        assert!(report.ready);
        assert_eq!(report.coverage.pbp_pct, 100.0);
        assert_eq!(report.units_checked, 2);
        assert!(is_ready(&config, SEASON).unwrap());

        cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        let metrics = std::fs::read_to_string(&config.paths.metrics_file).unwrap();
        assert_eq!(metrics.lines().count(), 2);
        let row: MetricsRow = serde_json::from_str(metrics.lines().next().unwrap()).unwrap();
        assert_eq!(row.season, SEASON);
        assert!(row.ready);
    }

    #[tokio::test]
    async fn test_injected_violation_blocks_readiness() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", pbp("G1", &[(2, 0), (4, 0)]), shots("G1", 2)).await;
        add_game(&index, &store, "G2", pbp("G2", &[(2, 0), (1, 0)]), shots("G2", 2)).await;

        let report = cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].check, CheckKind::IntraGameInvariant);
        assert_eq!(report.errors[0].game_id.as_deref(), Some("G2"));
        assert!(!report.ready);
        assert_eq!(report.reasons, vec!["1 validation error"]);
    }

    #[tokio::test]
    async fn test_made_shot_tolerance() {
        let (mut config, index, store, _tmp) = setup().await;
        config.validate.made_shot_tolerance = 1;
        add_game(&index, &store, "G1", pbp("G1", &[(2, 0), (4, 0)]), shots("G1", 1)).await;
        add_game(&index, &store, "G2", pbp("G2", &[(2, 0), (4, 0), (6, 0)]), shots("G2", 1)).await;

        let report = cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        let warned: Vec<_> = report
            .warnings
            .iter()
            .filter(|f| f.check == CheckKind::CrossDatasetAgreement)
            .collect();
        assert_eq!(warned.len(), 1);
        assert_eq!(warned[0].game_id.as_deref(), Some("G1"));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].game_id.as_deref(), Some("G2"));
    }

    #[tokio::test]
    async fn test_flags_must_match_disk() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", pbp("G1", &[(2, 0)]), shots("G1", 1)).await;
        std::fs::remove_file(store.unit_path(&UnitKey::new(Dataset::Shots, SEASON, "G1"))).unwrap();

        // Unit on disk with no index record
        let orphan = StoredUnit::fetched(pbp("G9", &[(0, 0)]), "test", "pbp", timestamp()).unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, SEASON, "G9"), &orphan)
            .await
            .unwrap();

        let report = cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].check, CheckKind::IndexDiskAgreement);
        assert_eq!(report.errors[0].dataset, Some(Dataset::Shots));
        assert!(report
            .warnings
            .iter()
            .any(|f| f.game_id.as_deref() == Some("G9") && f.message.contains("no Game Index")));
        assert_eq!(report.coverage.shots_pct, 0.0);
    }

    #[tokio::test]
    async fn test_empty_season_has_zero_coverage() {
        let (config, index, store, _tmp) = setup().await;
        let report = cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        assert!(report.consistent);
        assert_eq!(report.coverage.final_games, 0);
        assert_eq!(report.coverage.pbp_pct, 0.0);
        assert!(!report.ready);
        assert_eq!(
            report.reasons,
            vec!["pbp coverage 0% < 95%", "shots coverage 0% < 95%"]
        );
    }

    #[tokio::test]
    async fn test_game_in_two_partitions_is_a_duplication_error() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", pbp("G1", &[(2, 0), (4, 0)]), shots("G1", 2)).await;

        // A genuine 2022-23 copy of the same game id
        let mut rows = pbp("G1", &[(2, 0)]);
        rows[0].season = "2022-23".to_string();
        let unit = StoredUnit::fetched(rows, "test", "pbp", timestamp()).unwrap();
        store
            .write(&UnitKey::new(Dataset::Pbp, "2022-23", "G1"), &unit)
            .await
            .unwrap();

        let report = cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        let duplicates: Vec<_> = report
            .errors
            .iter()
            .filter(|f| f.check == CheckKind::PartitionDuplication)
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].game_id.as_deref(), Some("G1"));
        assert!(duplicates[0].message.contains("2022-23"));
        assert!(!report.consistent);
        assert!(!report.ready);
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_previous_readiness() {
        let (config, index, store, _tmp) = setup().await;
        add_game(&index, &store, "G1", pbp("G1", &[(2, 0), (4, 0)]), shots("G1", 2)).await;
        cmd_validate(&config, &index, &store, SEASON, &CancelFlag::new())
            .await
            .unwrap();
        let before = std::fs::read(&config.paths.readiness_file).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = cmd_validate(&config, &index, &store, SEASON, &cancel)
            .await
            .unwrap();
        assert_eq!(report.cancelled, 2);
        assert!(!report.ready);
        assert_eq!(report.reasons, vec!["validation cancelled with 2 units unchecked"]);

        assert_eq!(std::fs::read(&config.paths.readiness_file).unwrap(), before);
        assert!(is_ready(&config, SEASON).unwrap());
        let metrics = std::fs::read_to_string(&config.paths.metrics_file).unwrap();
        assert_eq!(metrics.lines().count(), 1);
        assert_eq!(
            index.latest_run(SEASON).await.unwrap().unwrap().status,
            "cancelled"
        );
    }
}
