//! Ingest command implementation
//!
//! Pulls raw records for final games that lack them. Each worker runs
//! fetch, verify, write, read back, mark for a single game; a failure is
//! logged against that game and never aborts the batch.

use crate::config::{is_valid_partition_value, Config};
use crate::error::{Error, Result};
use crate::fetch::{endpoint_kind, fetch_with_retry, Fetcher};
use crate::index::{timestamp, GameIndex, GameRecord, RunOperation, RunStatus, RunTotals};
use crate::models::{Dataset, GameStatus, RawRecords};
use crate::progress::{advance, finish, game_progress};
use crate::store::{StoredUnit, UnitKey, UnitRow, UnitStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation, checked between games
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ingest options
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Refetch even when the dataset flag is already set
    pub force: bool,
    /// Restrict the run to these games
    pub game_ids: Option<Vec<String>>,
}

/// One game that could not be ingested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameFailure {
    pub game_id: String,
    pub error_kind: String,
    pub message: String,
    pub occurred_at: String,
}

/// Result of an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub season: String,
    pub dataset: Dataset,
    pub run_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<GameFailure>,
    pub identity_mismatches: usize,
    pub cancelled: usize,
    pub elapsed_ms: u64,
}

enum Outcome {
    Stored,
    Failed(GameFailure, bool),
    Cancelled,
}

/// Ingest `dataset` for every final game of `season` that still lacks it
#[allow(clippy::too_many_arguments)]
pub async fn cmd_ingest(
    config: &Config,
    index: &GameIndex,
    store: &UnitStore,
    fetcher: &dyn Fetcher,
    season: &str,
    dataset: Dataset,
    options: IngestOptions,
    cancel: &CancelFlag,
) -> Result<IngestionReport> {
    let endpoint = endpoint_kind(dataset)?;
    if !is_valid_partition_value(season) {
        return Err(Error::Config(format!("Invalid season label '{}'", season)));
    }

    let started = Instant::now();
    let run = index
        .start_run(RunOperation::Ingest, season, Some(dataset))
        .await?;

    // The work list is fixed here; flags changed mid-run are not re-read
    let finals = index.list(Some(season), Some(GameStatus::Final)).await?;
    let mut unknown = Vec::new();
    let work: Vec<GameRecord> = match &options.game_ids {
        Some(ids) => {
            let mut selected = Vec::new();
            for id in ids {
                match finals.iter().find(|g| &g.game_id == id) {
                    Some(game) if options.force || !game.has(dataset) => selected.push(game.clone()),
                    Some(_) => debug!(game_id = %id, "Already ingested, skipping"),
                    None => unknown.push(id.clone()),
                }
            }
            selected
        }
        None => finals
            .into_iter()
            .filter(|g| options.force || !g.has(dataset))
            .collect(),
    };

    info!(
        "Ingesting {} for {} games in season {} (run {})",
        dataset,
        work.len(),
        season,
        run.id
    );

    let mut failed = Vec::new();
    for id in unknown {
        let err = Error::GameNotFound(format!("{} is not a final game of season {}", id, season));
        failed.push(log_failure(index, &run.id, &id, season, dataset, &err).await);
    }

    let pb = game_progress(work.len(), &format!("{} {}", season, dataset));
    let progress = &pb;
    let outcomes: Vec<(String, Outcome)> = stream::iter(work)
        .map(|game| {
            let run_id = run.id.clone();
            async move {
                if cancel.is_cancelled() {
                    return (game.game_id.clone(), Outcome::Cancelled);
                }

                let outcome =
                    match ingest_game(config, index, store, fetcher, &game, dataset, endpoint).await {
                        Ok(rows) => {
                            debug!(game_id = %game.game_id, rows, "Stored {} unit", dataset);
                            Outcome::Stored
                        }
                        Err(err) => {
                            warn!(game_id = %game.game_id, "Ingest failed: {}", err);
                            let identity = matches!(err, Error::IdentityMismatch { .. });
                            let failure = log_failure(
                                index,
                                &run_id,
                                &game.game_id,
                                &game.season,
                                dataset,
                                &err,
                            )
                            .await;
                            Outcome::Failed(failure, identity)
                        }
                    };
                advance(progress);
                (game.game_id.clone(), outcome)
            }
        })
        .buffer_unordered(config.ingest.concurrency)
        .collect()
        .await;

    let mut succeeded = 0;
    let mut identity_mismatches = 0;
    let mut cancelled = 0;
    for (_, outcome) in outcomes {
        match outcome {
            Outcome::Stored => succeeded += 1,
            Outcome::Failed(failure, identity) => {
                if identity {
                    identity_mismatches += 1;
                }
                failed.push(failure);
            }
            Outcome::Cancelled => cancelled += 1,
        }
    }
    failed.sort_by(|a, b| a.game_id.cmp(&b.game_id));
    finish(pb, "done");

    let attempted = succeeded + failed.len();
    let status = if cancelled > 0 {
        RunStatus::Cancelled
    } else if attempted > 0 && succeeded == 0 {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };
    index
        .complete_run(
            &run.id,
            status,
            RunTotals {
                processed: attempted as i64,
                succeeded: succeeded as i64,
                failed: failed.len() as i64,
                errors: failed
                    .iter()
                    .map(|f| format!("{}: {}", f.game_id, f.message))
                    .collect(),
            },
        )
        .await?;

    info!(
        "Ingest {} {}: {} stored, {} failed, {} cancelled",
        season,
        dataset,
        succeeded,
        failed.len(),
        cancelled
    );

    Ok(IngestionReport {
        season: season.to_string(),
        dataset,
        run_id: run.id,
        attempted,
        succeeded,
        failed,
        identity_mismatches,
        cancelled,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

async fn ingest_game(
    config: &Config,
    index: &GameIndex,
    store: &UnitStore,
    fetcher: &dyn Fetcher,
    game: &GameRecord,
    dataset: Dataset,
    endpoint: &str,
) -> Result<usize> {
    let records = fetch_with_retry(fetcher, &game.game_id, dataset, &config.ingest).await?;
    if records.dataset() != dataset {
        return Err(Error::Malformed(format!(
            "requested {} but received {}",
            dataset,
            records.dataset()
        )));
    }

    // Embedded identity is authoritative; the requested id is only a claim
    let embedded = records.embedded_identity()?;
    if embedded.game_id != game.game_id {
        return Err(Error::IdentityMismatch {
            field: "game_id",
            expected: game.game_id.clone(),
            found: embedded.game_id,
        });
    }
    if embedded.season != game.season {
        return Err(Error::IdentityMismatch {
            field: "season",
            expected: game.season.clone(),
            found: embedded.season,
        });
    }

    let key = UnitKey::new(dataset, &game.season, &game.game_id);
    let source = fetcher.source_system();
    let rows = match records {
        RawRecords::Pbp(rows) => write_and_verify(store, &key, rows, source, endpoint).await?,
        RawRecords::Shots(rows) => write_and_verify(store, &key, rows, source, endpoint).await?,
    };

    index.mark_dataset_present(&game.game_id, dataset).await?;
    Ok(rows)
}

async fn write_and_verify<T: UnitRow>(
    store: &UnitStore,
    key: &UnitKey,
    rows: Vec<T>,
    source: &str,
    endpoint: &str,
) -> Result<usize> {
    let expected = rows.len();
    let unit = StoredUnit::fetched(rows, source, endpoint, timestamp())?;
    store.write(key, &unit).await?;

    let stored = store.read_verified::<T>(key).await?;
    if stored.rows.len() != expected {
        return Err(Error::SkippedCorrupted {
            path: key.to_string(),
            reason: format!("wrote {} rows, read back {}", expected, stored.rows.len()),
        });
    }
    Ok(expected)
}

async fn log_failure(
    index: &GameIndex,
    run_id: &str,
    game_id: &str,
    season: &str,
    dataset: Dataset,
    err: &Error,
) -> GameFailure {
    match index
        .record_error(Some(run_id), game_id, season, dataset, err)
        .await
    {
        Ok(record) => GameFailure {
            game_id: record.game_id,
            error_kind: record.error_kind,
            message: record.message,
            occurred_at: record.occurred_at,
        },
        Err(log_err) => {
            warn!(game_id, "Could not record failure: {}", log_err);
            GameFailure {
                game_id: game_id.to_string(),
                error_kind: err.kind().to_string(),
                message: err.to_string(),
                occurred_at: timestamp(),
            }
        }
    }
}

/// Print an ingestion report to console
pub fn print_ingestion_report(report: &IngestionReport) {
    println!(
        "\n✓ Ingest {} {} finished in {:.1}s",
        report.season,
        report.dataset,
        report.elapsed_ms as f64 / 1000.0
    );
    println!("  Attempted: {}", report.attempted);
    println!("  Stored: {}", report.succeeded);
    println!("  Failed: {}", report.failed.len());
    if report.identity_mismatches > 0 {
        println!("  Identity mismatches: {}", report.identity_mismatches);
    }
    if report.cancelled > 0 {
        println!("  Cancelled before start: {}", report.cancelled);
    }

    for failure in &report.failed {
        println!(
            "  ✗ {} [{}] {}",
            failure.game_id, failure.error_kind, failure.message
        );
    }
}
