//! Regression and drift monitoring
//!
//! Regression compares live provider responses (and stored units) against
//! golden fixtures. Spot-check samples games of a ready season and compares
//! what is stored with what the provider serves now.

use crate::commands::ready::require_ready;
use crate::config::{Config, IngestConfig};
use crate::error::{Error, Result};
use crate::fetch::{fetch_with_retry, Fetcher};
use crate::index::{timestamp, GameIndex, RunOperation, RunStatus, RunTotals};
use crate::models::{embedded_identity, Dataset, GameStatus, PbpEvent, ShotAttempt};
use crate::store::{write_file_atomic, UnitKey, UnitStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current golden file format version
pub const GOLDEN_VERSION: u32 = 1;

/// Summary statistics compared against golden fixtures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub pbp_rows: usize,
    pub shots_rows: usize,
    pub final_home_score: u32,
    pub final_away_score: u32,
    pub period_count: u32,
    #[serde(default)]
    pub event_type_counts: BTreeMap<String, usize>,
}

/// Summarize one game's raw records
pub fn summarize(pbp: &[PbpEvent], shots: &[ShotAttempt]) -> GameSummary {
    let last = pbp.iter().max_by_key(|e| e.event_num);
    let mut event_type_counts = BTreeMap::new();
    for event in pbp {
        *event_type_counts
            .entry(event.event_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    GameSummary {
        pbp_rows: pbp.len(),
        shots_rows: shots.len(),
        final_home_score: last.map_or(0, |e| e.home_score),
        final_away_score: last.map_or(0, |e| e.away_score),
        period_count: pbp.iter().map(|e| e.period).max().unwrap_or(0),
        event_type_counts,
    }
}

/// Fields of `actual` that differ from `expected`, as (field, expected, actual)
pub fn diff_summaries(expected: &GameSummary, actual: &GameSummary) -> Vec<(String, String, String)> {
    let mut diffs = Vec::new();
    let scalars = [
        ("pbp_rows", expected.pbp_rows as u64, actual.pbp_rows as u64),
        ("shots_rows", expected.shots_rows as u64, actual.shots_rows as u64),
        (
            "final_home_score",
            u64::from(expected.final_home_score),
            u64::from(actual.final_home_score),
        ),
        (
            "final_away_score",
            u64::from(expected.final_away_score),
            u64::from(actual.final_away_score),
        ),
        (
            "period_count",
            u64::from(expected.period_count),
            u64::from(actual.period_count),
        ),
    ];
    for (field, want, got) in scalars {
        if want != got {
            diffs.push((field.to_string(), want.to_string(), got.to_string()));
        }
    }

    let mut kinds: Vec<&String> = expected
        .event_type_counts
        .keys()
        .chain(actual.event_type_counts.keys())
        .collect();
    kinds.sort();
    kinds.dedup();
    for kind in kinds {
        let want = expected.event_type_counts.get(kind).copied().unwrap_or(0);
        let got = actual.event_type_counts.get(kind).copied().unwrap_or(0);
        if want != got {
            diffs.push((
                format!("event_type_counts.{}", kind),
                want.to_string(),
                got.to_string(),
            ));
        }
    }
    diffs
}

/// One golden fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenFixture {
    pub game_id: String,
    pub season: String,
    pub expected: GameSummary,
}

/// Versioned golden fixture file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenSet {
    pub version: u32,
    #[serde(default, rename = "fixture")]
    pub fixtures: Vec<GoldenFixture>,
}

impl GoldenSet {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Golden file not found: {} (run 'courtlog capture-golden' first)",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let set: GoldenSet = toml::from_str(&content)?;
        if set.version != GOLDEN_VERSION {
            return Err(Error::Config(format!(
                "Unsupported golden file version {} (expected {})",
                set.version, GOLDEN_VERSION
            )));
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_file_atomic(path, toml::to_string_pretty(self)?.as_bytes())?;
        info!("Saved {} golden fixtures to {:?}", self.fixtures.len(), path);
        Ok(())
    }
}

/// Where a compared summary came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Live,
    Stored,
}

/// A golden field that no longer matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub game_id: String,
    pub source: SummarySource,
    pub field: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub golden_version: u32,
    pub fixtures_checked: usize,
    pub stored_compared: usize,
    pub regressions: Vec<Regression>,
    pub passed: bool,
}

/// Fetch both datasets live and accept them only under the requested identity.
///
/// `season` is checked when known; otherwise the pbp rows decide it and the
/// shots rows must agree.
async fn fetch_game(
    fetcher: &dyn Fetcher,
    game_id: &str,
    season: Option<&str>,
    config: &IngestConfig,
) -> Result<LiveGame> {
    let pbp = fetch_with_retry(fetcher, game_id, Dataset::Pbp, config)
        .await?
        .into_pbp()?;
    let shots = fetch_with_retry(fetcher, game_id, Dataset::Shots, config)
        .await?
        .into_shots()?;

    let pbp_identity = embedded_identity(&pbp)?;
    let season = season.unwrap_or(&pbp_identity.season).to_string();
    for identity in [pbp_identity, embedded_identity(&shots)?] {
        if identity.game_id != game_id {
            return Err(Error::IdentityMismatch {
                field: "game_id",
                expected: game_id.to_string(),
                found: identity.game_id,
            });
        }
        if identity.season != season {
            return Err(Error::IdentityMismatch {
                field: "season",
                expected: season,
                found: identity.season,
            });
        }
    }
    Ok(LiveGame { pbp, shots, season })
}

struct LiveGame {
    pbp: Vec<PbpEvent>,
    shots: Vec<ShotAttempt>,
    season: String,
}

/// Field name a failed live fetch is reported under
fn live_failure_field(err: &Error) -> String {
    match err {
        Error::IdentityMismatch { .. } => "identity".to_string(),
        _ => "fetch".to_string(),
    }
}

async fn read_game(
    store: &UnitStore,
    season: &str,
    game_id: &str,
) -> Result<(Vec<PbpEvent>, Vec<ShotAttempt>)> {
    let pbp = store
        .read_verified::<PbpEvent>(&UnitKey::new(Dataset::Pbp, season, game_id))
        .await?;
    let shots = store
        .read_verified::<ShotAttempt>(&UnitKey::new(Dataset::Shots, season, game_id))
        .await?;
    Ok((pbp.rows, shots.rows))
}

/// Check every golden fixture against live and stored data
pub async fn cmd_regress(
    config: &Config,
    store: &UnitStore,
    fetcher: &dyn Fetcher,
    golden: &GoldenSet,
) -> Result<RegressionReport> {
    info!("Running regression over {} golden fixtures", golden.fixtures.len());
    let mut regressions = Vec::new();
    let mut stored_compared = 0;

    for fixture in &golden.fixtures {
        let push = |regressions: &mut Vec<Regression>,
                    source: SummarySource,
                    field: String,
                    expected: String,
                    actual: String| {
            regressions.push(Regression {
                game_id: fixture.game_id.clone(),
                source,
                field,
                expected,
                actual,
            })
        };

        match fetch_game(fetcher, &fixture.game_id, Some(&fixture.season), &config.ingest).await {
            Ok(game) => {
                let live = summarize(&game.pbp, &game.shots);
                for (field, expected, actual) in diff_summaries(&fixture.expected, &live) {
                    push(&mut regressions, SummarySource::Live, field, expected, actual);
                }
            }
            Err(e) => {
                warn!(game_id = %fixture.game_id, "Live fetch failed: {}", e);
                push(
                    &mut regressions,
                    SummarySource::Live,
                    live_failure_field(&e),
                    "ok".to_string(),
                    e.to_string(),
                );
            }
        }

        let pbp_key = UnitKey::new(Dataset::Pbp, &fixture.season, &fixture.game_id);
        let shots_key = UnitKey::new(Dataset::Shots, &fixture.season, &fixture.game_id);
        if !store.exists(&pbp_key) || !store.exists(&shots_key) {
            debug!(game_id = %fixture.game_id, "No stored units to compare");
            continue;
        }
        stored_compared += 1;
        match read_game(store, &fixture.season, &fixture.game_id).await {
            Ok((pbp, shots)) => {
                let stored = summarize(&pbp, &shots);
                for (field, expected, actual) in diff_summaries(&fixture.expected, &stored) {
                    push(&mut regressions, SummarySource::Stored, field, expected, actual);
                }
            }
            Err(e) => push(
                &mut regressions,
                SummarySource::Stored,
                "stored_unit".to_string(),
                "verified".to_string(),
                e.to_string(),
            ),
        }
    }

    let report = RegressionReport {
        golden_version: golden.version,
        fixtures_checked: golden.fixtures.len(),
        stored_compared,
        passed: regressions.is_empty(),
        regressions,
    };
    info!(
        "Regression finished: {} regressions across {} fixtures",
        report.regressions.len(),
        report.fixtures_checked
    );
    Ok(report)
}

/// Build a golden set from the current live responses
pub async fn cmd_capture_golden(
    config: &Config,
    fetcher: &dyn Fetcher,
    game_ids: &[String],
    path: &Path,
) -> Result<GoldenSet> {
    let mut fixtures = Vec::with_capacity(game_ids.len());
    for game_id in game_ids {
        let game = fetch_game(fetcher, game_id, None, &config.ingest).await?;
        fixtures.push(GoldenFixture {
            game_id: game_id.clone(),
            expected: summarize(&game.pbp, &game.shots),
            season: game.season,
        });
    }

    let set = GoldenSet {
        version: GOLDEN_VERSION,
        fixtures,
    };
    set.save(path)?;
    Ok(set)
}

/// Drift severity of a spot-check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    Low,
    High,
}

impl DriftSeverity {
    pub fn classify(discrepancy_count: usize, high_threshold: usize) -> Self {
        if discrepancy_count == 0 {
            DriftSeverity::None
        } else if discrepancy_count > high_threshold {
            DriftSeverity::High
        } else {
            DriftSeverity::Low
        }
    }
}

/// One stored-vs-live mismatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub dataset: Dataset,
    pub field: String,
    pub stored: String,
    pub live: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDrift {
    pub game_id: String,
    pub fields: Vec<FieldDrift>,
}

/// Result of a spot-check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub season: String,
    pub seed: u64,
    pub checked_at: String,
    pub sampled: Vec<String>,
    pub discrepancy_count: usize,
    pub severity: DriftSeverity,
    pub discrepancies: Vec<GameDrift>,
}

fn final_score(pbp: &[PbpEvent]) -> String {
    let summary = summarize(pbp, &[]);
    format!("{}-{}", summary.final_home_score, summary.final_away_score)
}

async fn compare_game(
    config: &Config,
    store: &UnitStore,
    fetcher: &dyn Fetcher,
    season: &str,
    game_id: &str,
) -> Vec<FieldDrift> {
    let stored = match read_game(store, season, game_id).await {
        Ok(stored) => stored,
        Err(e) => {
            return vec![FieldDrift {
                dataset: Dataset::Pbp,
                field: "stored_unit".to_string(),
                stored: e.to_string(),
                live: "-".to_string(),
            }]
        }
    };
    let live = match fetch_game(fetcher, game_id, Some(season), &config.ingest).await {
        Ok(game) => (game.pbp, game.shots),
        Err(e) => {
            return vec![FieldDrift {
                dataset: Dataset::Pbp,
                field: live_failure_field(&e),
                stored: "-".to_string(),
                live: e.to_string(),
            }]
        }
    };

    let checks = [
        (
            Dataset::Pbp,
            "row_count",
            stored.0.len().to_string(),
            live.0.len().to_string(),
        ),
        (
            Dataset::Shots,
            "row_count",
            stored.1.len().to_string(),
            live.1.len().to_string(),
        ),
        (
            Dataset::Pbp,
            "final_score",
            final_score(&stored.0),
            final_score(&live.0),
        ),
    ];
    checks
        .into_iter()
        .filter(|(_, _, stored, live)| stored != live)
        .map(|(dataset, field, stored, live)| FieldDrift {
            dataset,
            field: field.to_string(),
            stored,
            live,
        })
        .collect()
}

/// Sample games of a ready season and compare stored data with live data
pub async fn cmd_spot_check(
    config: &Config,
    index: &GameIndex,
    store: &UnitStore,
    fetcher: &dyn Fetcher,
    season: &str,
    sample_size: Option<usize>,
    seed: Option<u64>,
) -> Result<DriftReport> {
    require_ready(config, season)?;

    let candidates: Vec<String> = index
        .list(Some(season), Some(GameStatus::Final))
        .await?
        .into_iter()
        .filter(|g| g.has_pbp && g.has_shots)
        .map(|g| g.game_id)
        .collect();

    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let size = sample_size.unwrap_or(config.drift.sample_size);
    let mut sampled: Vec<String> = candidates
        .choose_multiple(&mut rng, size)
        .cloned()
        .collect();
    sampled.sort();

    let run = index
        .start_run(RunOperation::SpotCheck, season, None)
        .await?;
    info!(
        "Spot-checking {} of {} games in season {} (seed {})",
        sampled.len(),
        candidates.len(),
        season,
        seed
    );

    let mut discrepancies = Vec::new();
    for game_id in &sampled {
        let fields = compare_game(config, store, fetcher, season, game_id).await;
        if !fields.is_empty() {
            warn!(game_id = %game_id, "Drift in {} fields", fields.len());
            discrepancies.push(GameDrift {
                game_id: game_id.clone(),
                fields,
            });
        }
    }

    let discrepancy_count = discrepancies.len();
    let report = DriftReport {
        season: season.to_string(),
        seed,
        checked_at: timestamp(),
        severity: DriftSeverity::classify(discrepancy_count, config.drift.high_severity_threshold),
        sampled,
        discrepancy_count,
        discrepancies,
    };

    index
        .complete_run(
            &run.id,
            RunStatus::Completed,
            RunTotals {
                processed: report.sampled.len() as i64,
                succeeded: (report.sampled.len() - discrepancy_count) as i64,
                failed: discrepancy_count as i64,
                errors: report
                    .discrepancies
                    .iter()
                    .map(|d| format!("{}: {} fields drifted", d.game_id, d.fields.len()))
                    .collect(),
            },
        )
        .await?;
    Ok(report)
}

pub fn print_regression_report(report: &RegressionReport) {
    let mark = if report.passed { "✓" } else { "✗" };
    println!(
        "\n{} Regression: {} fixtures, {} stored comparisons, {} regressions",
        mark,
        report.fixtures_checked,
        report.stored_compared,
        report.regressions.len()
    );
    for r in &report.regressions {
        println!(
            "  {} [{:?}] {}: expected {}, got {}",
            r.game_id, r.source, r.field, r.expected, r.actual
        );
    }
}

pub fn print_golden_set(set: &GoldenSet, path: &Path) {
    println!("✓ Captured {} golden fixtures", set.fixtures.len());
    println!("  File: {}", path.display());
}

pub fn print_drift_report(report: &DriftReport) {
    println!(
        "\nSpot-check season {} (seed {}): {} sampled, {} discrepancies, severity {:?}",
        report.season,
        report.seed,
        report.sampled.len(),
        report.discrepancy_count,
        report.severity
    );
    for game in &report.discrepancies {
        println!("  ✗ {}", game.game_id);
        for f in &game.fields {
            println!(
                "      {} {}: stored {}, live {}",
                f.dataset, f.field, f.stored, f.live
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, RawRecords, ShotType};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn pbp(game_id: &str, final_home: u32) -> Vec<PbpEvent> {
        let event = |num: u32, period: u32, kind: EventType, home: u32| PbpEvent {
            game_id: game_id.to_string(),
            season: "2023-24".to_string(),
            event_num: num,
            period,
            clock: "05:00".to_string(),
            event_type: kind,
            team_id: None,
            player_id: None,
            home_score: home,
            away_score: 1,
            shot_value: None,
            game_date: None,
            x: None,
            y: None,
        };
        vec![
            event(1, 1, EventType::JumpBall, 0),
            event(2, 1, EventType::FreeThrowMade, 0),
            event(3, 4, EventType::MadeShot, final_home),
        ]
    }

    fn shots(game_id: &str) -> Vec<ShotAttempt> {
        vec![ShotAttempt {
            game_id: game_id.to_string(),
            season: "2023-24".to_string(),
            shot_num: 1,
            period: 4,
            clock: "05:00".to_string(),
            team_id: None,
            player_id: None,
            shot_type: ShotType::TwoPoint,
            made: true,
            x: None,
            y: None,
            game_date: None,
        }]
    }

    struct Live {
        final_home: u32,
    }

    #[async_trait]
    impl Fetcher for Live {
        async fn fetch(&self, game_id: &str, dataset: Dataset) -> Result<RawRecords> {
            if game_id == "GONE" {
                return Err(Error::NotFoundUpstream(game_id.to_string()));
            }
            Ok(match dataset {
                Dataset::Shots => RawRecords::Shots(shots(game_id)),
                _ => RawRecords::Pbp(pbp(game_id, self.final_home)),
            })
        }

        fn source_system(&self) -> &str {
            "live"
        }
    }

    /// Serves the right play-by-play but another game's shot chart
    struct ForeignShots;

    #[async_trait]
    impl Fetcher for ForeignShots {
        async fn fetch(&self, game_id: &str, dataset: Dataset) -> Result<RawRecords> {
            Ok(match dataset {
                Dataset::Shots => RawRecords::Shots(shots("G9")),
                _ => RawRecords::Pbp(pbp(game_id, 2)),
            })
        }

        fn source_system(&self) -> &str {
            "live"
        }
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&pbp("G1", 2), &shots("G1"));
        assert_eq!(summary.pbp_rows, 3);
        assert_eq!(summary.shots_rows, 1);
        assert_eq!((summary.final_home_score, summary.final_away_score), (2, 1));
        assert_eq!(summary.period_count, 4);
        assert_eq!(summary.event_type_counts["made_shot"], 1);
    }

    #[test]
    fn test_diff_names_each_field() {
        let expected = summarize(&pbp("G1", 2), &shots("G1"));
        let mut events = pbp("G1", 5);
        events[1].event_type = EventType::Foul;
        let actual = summarize(&events, &shots("G1"));

        let fields: Vec<String> = diff_summaries(&expected, &actual)
            .into_iter()
            .map(|(field, _, _)| field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "final_home_score",
                "event_type_counts.foul",
                "event_type_counts.free_throw_made"
            ]
        );
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(DriftSeverity::classify(0, 1), DriftSeverity::None);
        assert_eq!(DriftSeverity::classify(1, 1), DriftSeverity::Low);
        assert_eq!(DriftSeverity::classify(2, 1), DriftSeverity::High);
    }

    #[tokio::test]
    async fn test_capture_then_regress() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let store = UnitStore::from_config(&config);
        let path = config.golden_path();

        let set = cmd_capture_golden(
            &config,
            &Live { final_home: 2 },
            &["G1".to_string(), "G2".to_string()],
            &path,
        )
        .await
        .unwrap();
        assert_eq!(set.fixtures[0].season, "2023-24");
        let loaded = GoldenSet::load(&path).unwrap();
        assert_eq!(loaded, set);

        let report = cmd_regress(&config, &store, &Live { final_home: 2 }, &loaded)
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.stored_compared, 0);

        let report = cmd_regress(&config, &store, &Live { final_home: 4 }, &loaded)
            .await
            .unwrap();
        assert_eq!(report.regressions.len(), 2);
        assert!(report
            .regressions
            .iter()
            .all(|r| r.field == "final_home_score" && r.actual == "4"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_a_regression() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let store = UnitStore::from_config(&config);
        let golden = GoldenSet {
            version: GOLDEN_VERSION,
            fixtures: vec![GoldenFixture {
                game_id: "GONE".to_string(),
                season: "2023-24".to_string(),
                expected: GameSummary::default(),
            }],
        };

        let report = cmd_regress(&config, &store, &Live { final_home: 2 }, &golden)
            .await
            .unwrap();
        assert_eq!(report.regressions.len(), 1);
        assert_eq!(report.regressions[0].field, "fetch");
    }

    #[tokio::test]
    async fn test_foreign_live_shots_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let store = UnitStore::from_config(&config);
        let path = config.golden_path();

        let result = cmd_capture_golden(&config, &ForeignShots, &["G1".to_string()], &path).await;
        match result {
            Err(Error::IdentityMismatch { field, found, .. }) => {
                assert_eq!(field, "game_id");
                assert_eq!(found, "G9");
            }
            other => panic!("expected IdentityMismatch, got {:?}", other),
        }
        assert!(!path.exists());

        let golden = GoldenSet {
            version: GOLDEN_VERSION,
            fixtures: vec![GoldenFixture {
                game_id: "G1".to_string(),
                season: "2023-24".to_string(),
                expected: summarize(&pbp("G1", 2), &shots("G1")),
            }],
        };
        let report = cmd_regress(&config, &store, &ForeignShots, &golden)
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.regressions.len(), 1);
        assert_eq!(report.regressions[0].field, "identity");
    }

    #[test]
    fn test_golden_save_replaces_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("golden").join("fixtures.toml");
        let mut set = GoldenSet {
            version: GOLDEN_VERSION,
            fixtures: vec![GoldenFixture {
                game_id: "G1".to_string(),
                season: "2023-24".to_string(),
                expected: summarize(&pbp("G1", 2), &shots("G1")),
            }],
        };
        set.save(&path).unwrap();

        set.fixtures[0].expected.final_home_score = 9;
        set.save(&path).unwrap();

        assert_eq!(GoldenSet::load(&path).unwrap(), set);
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        assert!(!std::path::Path::new(&tmp_name).exists());
    }

    #[tokio::test]
    async fn test_spot_check_requires_ready_season() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_base_dir(tmp.path().to_path_buf());
        let index = GameIndex::connect(&config).await.unwrap();
        let store = UnitStore::from_config(&config);

        let result = cmd_spot_check(
            &config,
            &index,
            &store,
            &Live { final_home: 2 },
            "2023-24",
            None,
            Some(7),
        )
        .await;
        assert!(matches!(result, Err(Error::NotReady { .. })));
    }
}
