//! Index command implementation
//!
//! Seeds or refreshes the Game Index from the provider schedule for one
//! configured season.

use crate::config::{is_valid_partition_value, SeasonSpec};
use crate::error::{Error, Result};
use crate::fetch::ScheduleSource;
use crate::index::{GameIndex, GameRecord};
use crate::models::ScheduledGame;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A schedule entry that could not be indexed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedGame {
    pub game_id: String,
    pub error_kind: String,
    pub message: String,
}

/// Result of an index refresh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub season: String,
    pub scheduled: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: Vec<RejectedGame>,
}

/// Refresh the Game Index for `season` from `schedule`
pub async fn cmd_index(
    index: &GameIndex,
    schedule: &dyn ScheduleSource,
    season: &SeasonSpec,
) -> Result<IndexReport> {
    info!(
        "Refreshing schedule for season {} ({})",
        season.label, season.competition
    );
    let games = schedule.schedule(season).await?;

    let mut report = IndexReport {
        season: season.label.clone(),
        scheduled: games.len(),
        ..Default::default()
    };

    for game in games {
        let game_id = game.game_id.clone();
        match index_game(index, season, game).await {
            Ok(Change::Inserted) => report.inserted += 1,
            Ok(Change::Updated) => report.updated += 1,
            Ok(Change::Unchanged) => report.unchanged += 1,
            Err(e) => {
                warn!(game_id = %game_id, "Not indexed: {}", e);
                report.rejected.push(RejectedGame {
                    game_id,
                    error_kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        "Indexed season {}: {} inserted, {} updated, {} rejected",
        report.season,
        report.inserted,
        report.updated,
        report.rejected.len()
    );
    Ok(report)
}

enum Change {
    Inserted,
    Updated,
    Unchanged,
}

async fn index_game(index: &GameIndex, season: &SeasonSpec, game: ScheduledGame) -> Result<Change> {
    if !is_valid_partition_value(&game.game_id) {
        return Err(Error::Malformed(format!(
            "game id '{}' cannot be used as a partition value",
            game.game_id
        )));
    }

    let existing = index.find(&game.game_id).await?;
    let mut record = GameRecord::new(
        game.game_id,
        season.label.clone(),
        season.competition.clone(),
        game.status,
        game.home_team_id,
        game.away_team_id,
    );
    record.scheduled_at = game
        .scheduled_at
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true));

    // Dataset flags are owned by ingestion and normalization
    if let Some(current) = &existing {
        record.has_pbp = current.has_pbp;
        record.has_shots = current.has_shots;
        record.has_boxscore = current.has_boxscore;

        let same = current.season == record.season
            && current.competition == record.competition
            && current.status == record.status
            && current.home_team_id == record.home_team_id
            && current.away_team_id == record.away_team_id
            && current.scheduled_at == record.scheduled_at;
        if same {
            debug!(game_id = %record.game_id, "Schedule entry unchanged");
            return Ok(Change::Unchanged);
        }
    }

    let applied = index.upsert(&record).await?;
    Ok(match (existing, applied) {
        (None, _) => Change::Inserted,
        (Some(_), true) => Change::Updated,
        (Some(_), false) => Change::Unchanged,
    })
}

/// Print an index report to console
pub fn print_index_report(report: &IndexReport) {
    println!("\n✓ Indexed season {}", report.season);
    println!("  Scheduled: {}", report.scheduled);
    println!(
        "  Inserted: {}, updated: {}, unchanged: {}",
        report.inserted, report.updated, report.unchanged
    );
    if !report.rejected.is_empty() {
        println!("\nRejected:");
        for game in &report.rejected {
            println!("  ✗ {} ({}): {}", game.game_id, game.error_kind, game.message);
        }
    }
}
