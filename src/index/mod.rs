//! Game Index using SQLite
//!
//! This module holds the canonical per-game metadata:
//! - Games (season, teams, status, dataset flags)
//! - Ingest errors (per-game failures from batch runs)
//! - Quarantine (units flagged as corrupted)
//! - Runs (history and stats)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Dataset, GameStatus};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Timestamp format used for every persisted time.
///
/// Fixed precision keeps lexicographic order equal to chronological order,
/// which the last-write-wins upsert relies on.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Pipeline operations recorded in run history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOperation {
    Ingest,
    Normalize,
    Validate,
    SpotCheck,
}

impl std::fmt::Display for RunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOperation::Ingest => write!(f, "ingest"),
            RunOperation::Normalize => write!(f, "normalize"),
            RunOperation::Validate => write!(f, "validate"),
            RunOperation::SpotCheck => write!(f, "spot_check"),
        }
    }
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// A Game Index row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    pub season: String,
    pub competition: String,
    pub status: GameStatus,
    pub home_team_id: String,
    pub away_team_id: String,
    pub scheduled_at: Option<String>,
    pub has_pbp: bool,
    pub has_shots: bool,
    pub has_boxscore: bool,
    pub last_updated: String,
}

impl GameRecord {
    pub fn new(
        game_id: String,
        season: String,
        competition: String,
        status: GameStatus,
        home_team_id: String,
        away_team_id: String,
    ) -> Self {
        Self {
            game_id,
            season,
            competition,
            status,
            home_team_id,
            away_team_id,
            scheduled_at: None,
            has_pbp: false,
            has_shots: false,
            has_boxscore: false,
            last_updated: timestamp(),
        }
    }

    /// Flag value for a dataset
    pub fn has(&self, dataset: Dataset) -> bool {
        match dataset {
            Dataset::Pbp => self.has_pbp,
            Dataset::Shots => self.has_shots,
            Dataset::PlayerGame | Dataset::TeamGame => self.has_boxscore,
        }
    }
}

#[derive(FromRow)]
struct GameRow {
    game_id: String,
    season: String,
    competition: String,
    status: String,
    home_team_id: String,
    away_team_id: String,
    scheduled_at: Option<String>,
    has_pbp: bool,
    has_shots: bool,
    has_boxscore: bool,
    last_updated: String,
}

impl TryFrom<GameRow> for GameRecord {
    type Error = Error;

    fn try_from(row: GameRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse()?,
            game_id: row.game_id,
            season: row.season,
            competition: row.competition,
            home_team_id: row.home_team_id,
            away_team_id: row.away_team_id,
            scheduled_at: row.scheduled_at,
            has_pbp: row.has_pbp,
            has_shots: row.has_shots,
            has_boxscore: row.has_boxscore,
            last_updated: row.last_updated,
        })
    }
}

/// A per-game failure recorded during a batch run
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IngestErrorRecord {
    pub id: String,
    pub run_id: Option<String>,
    pub game_id: String,
    pub season: String,
    pub dataset: String,
    pub error_kind: String,
    pub message: String,
    pub occurred_at: String,
}

/// A unit flagged as corrupted
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub dataset: String,
    pub season: String,
    pub game_id: String,
    pub reason: String,
    pub detected_at: String,
}

/// A pipeline run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub operation: String,
    pub season: String,
    pub dataset: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub errors_json: Option<String>,
}

impl RunRecord {
    fn new(operation: RunOperation, season: &str, dataset: Option<Dataset>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            season: season.to_string(),
            dataset: dataset.map(|d| d.to_string()),
            started_at: timestamp(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            errors_json: None,
        }
    }
}

/// Final counters for a run
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub errors: Vec<String>,
}

/// Per-season counts from the index
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub season: String,
    pub games: i64,
    pub final_games: i64,
    pub with_pbp: i64,
    pub with_shots: i64,
    pub with_boxscore: i64,
}

/// Game Index database handle
#[derive(Clone)]
pub struct GameIndex {
    pool: SqlitePool,
}

impl GameIndex {
    /// Connect to the game index using config paths
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open (and initialize if needed) the index at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let index = Self { pool };

        if !index.is_initialized().await? {
            index.init_schema().await?;
        }

        Ok(index)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing game index schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='games'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Game Operations =====

    /// Get a game by identifier
    pub async fn get(&self, game_id: &str) -> Result<GameRecord> {
        self.find(game_id)
            .await?
            .ok_or_else(|| Error::GameNotFound(game_id.to_string()))
    }

    /// Get a game by identifier, if indexed
    pub async fn find(&self, game_id: &str) -> Result<Option<GameRecord>> {
        let row = sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE game_id = ?")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(GameRecord::try_from).transpose()
    }

    /// Insert or update a game.
    ///
    /// Last write wins on `last_updated`: an upsert older than the stored row
    /// is ignored and `Ok(false)` is returned. A game never changes season.
    pub async fn upsert(&self, record: &GameRecord) -> Result<bool> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT season FROM games WHERE game_id = ?")
                .bind(&record.game_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(season) = existing {
            if season != record.season {
                return Err(Error::CrossSeasonDuplicate {
                    game_id: record.game_id.clone(),
                    seasons: vec![season, record.season.clone()],
                });
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO games (game_id, season, competition, status, home_team_id, away_team_id,
                               scheduled_at, has_pbp, has_shots, has_boxscore, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_id) DO UPDATE SET
                competition = excluded.competition,
                status = excluded.status,
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                scheduled_at = excluded.scheduled_at,
                has_pbp = excluded.has_pbp,
                has_shots = excluded.has_shots,
                has_boxscore = excluded.has_boxscore,
                last_updated = excluded.last_updated
            WHERE excluded.last_updated >= games.last_updated
              AND excluded.season = games.season
            "#,
        )
        .bind(&record.game_id)
        .bind(&record.season)
        .bind(&record.competition)
        .bind(record.status.to_string())
        .bind(&record.home_team_id)
        .bind(&record.away_team_id)
        .bind(&record.scheduled_at)
        .bind(record.has_pbp)
        .bind(record.has_shots)
        .bind(record.has_boxscore)
        .bind(&record.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List games, optionally filtered by season and status
    pub async fn list(
        &self,
        season: Option<&str>,
        status: Option<GameStatus>,
    ) -> Result<Vec<GameRecord>> {
        let rows = sqlx::query_as::<_, GameRow>(
            r#"
            SELECT * FROM games
            WHERE (?1 IS NULL OR season = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY game_id
            "#,
        )
        .bind(season)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GameRecord::try_from).collect()
    }

    /// Record that a verified unit for `dataset` is on disk.
    ///
    /// Only call after the written unit has been read back and verified.
    pub async fn mark_dataset_present(&self, game_id: &str, dataset: Dataset) -> Result<()> {
        let query = format!(
            "UPDATE games SET {} = 1, last_updated = ? WHERE game_id = ?",
            dataset.flag_column()
        );
        let result = sqlx::query(&query)
            .bind(timestamp())
            .bind(game_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::GameNotFound(game_id.to_string()));
        }
        Ok(())
    }

    /// Per-season counts
    pub async fn season_summaries(&self) -> Result<Vec<SeasonSummary>> {
        let summaries = sqlx::query_as::<_, SeasonSummary>(
            r#"
            SELECT season,
                   COUNT(*) AS games,
                   COALESCE(SUM(status = 'final'), 0) AS final_games,
                   COALESCE(SUM(has_pbp), 0) AS with_pbp,
                   COALESCE(SUM(has_shots), 0) AS with_shots,
                   COALESCE(SUM(has_boxscore), 0) AS with_boxscore
            FROM games
            GROUP BY season
            ORDER BY season
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    // ===== Error Log =====

    /// Record a per-game failure
    pub async fn record_error(
        &self,
        run_id: Option<&str>,
        game_id: &str,
        season: &str,
        dataset: Dataset,
        error: &Error,
    ) -> Result<IngestErrorRecord> {
        let record = IngestErrorRecord {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.map(str::to_string),
            game_id: game_id.to_string(),
            season: season.to_string(),
            dataset: dataset.to_string(),
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            occurred_at: timestamp(),
        };

        sqlx::query(
            r#"
            INSERT INTO ingest_errors (id, run_id, game_id, season, dataset, error_kind, message, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.run_id)
        .bind(&record.game_id)
        .bind(&record.season)
        .bind(&record.dataset)
        .bind(&record.error_kind)
        .bind(&record.message)
        .bind(&record.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// List recorded failures, newest first
    pub async fn list_errors(&self, season: Option<&str>) -> Result<Vec<IngestErrorRecord>> {
        let errors = sqlx::query_as::<_, IngestErrorRecord>(
            r#"
            SELECT * FROM ingest_errors
            WHERE (?1 IS NULL OR season = ?1)
            ORDER BY occurred_at DESC
            "#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        Ok(errors)
    }

    // ===== Quarantine =====

    /// Flag a unit as corrupted; the file itself is left in place
    pub async fn quarantine(
        &self,
        dataset: Dataset,
        season: &str,
        game_id: &str,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quarantine (dataset, season, game_id, reason, detected_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(dataset, season, game_id) DO UPDATE SET
                reason = excluded.reason,
                detected_at = excluded.detected_at
            "#,
        )
        .bind(dataset.to_string())
        .bind(season)
        .bind(game_id)
        .bind(reason)
        .bind(timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List quarantined units
    pub async fn list_quarantine(&self, season: Option<&str>) -> Result<Vec<QuarantineEntry>> {
        let entries = sqlx::query_as::<_, QuarantineEntry>(
            r#"
            SELECT * FROM quarantine
            WHERE (?1 IS NULL OR season = ?1)
            ORDER BY season, dataset, game_id
            "#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    // ===== Run Operations =====

    /// Start a new run
    pub async fn start_run(
        &self,
        operation: RunOperation,
        season: &str,
        dataset: Option<Dataset>,
    ) -> Result<RunRecord> {
        let run = RunRecord::new(operation, season, dataset);
        sqlx::query(
            r#"
            INSERT INTO runs (id, operation, season, dataset, started_at, status, processed, succeeded, failed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.operation)
        .bind(&run.season)
        .bind(&run.dataset)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.processed)
        .bind(run.succeeded)
        .bind(run.failed)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete a run
    pub async fn complete_run(&self, id: &str, status: RunStatus, totals: RunTotals) -> Result<()> {
        let errors_json = if totals.errors.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&totals.errors)?)
        };
        sqlx::query(
            r#"
            UPDATE runs SET
                completed_at = ?,
                status = ?,
                processed = ?,
                succeeded = ?,
                failed = ?,
                errors_json = ?
            WHERE id = ?
            "#,
        )
        .bind(timestamp())
        .bind(status.to_string())
        .bind(totals.processed)
        .bind(totals.succeeded)
        .bind(totals.failed)
        .bind(errors_json)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest run for a season
    pub async fn latest_run(&self, season: &str) -> Result<Option<RunRecord>> {
        let run = sqlx::query_as::<_, RunRecord>(
            "SELECT * FROM runs WHERE season = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }
}
