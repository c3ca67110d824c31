//! Box-score aggregation from play-by-play events
//!
//! Pure functions: the same events always produce the same rows in the same
//! order, which is what lets normalization skip rewriting unchanged units.

mod clock;

pub use clock::{parse_clock, PeriodClock};

use crate::error::Result;
use crate::models::{embedded_identity, Dataset, EventType, Identified, PbpEvent};
use crate::store::UnitRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Counting stats shared by player and team rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatLine {
    pub points: u32,
    pub fgm: u32,
    pub fga: u32,
    pub fg3m: u32,
    pub fg3a: u32,
    pub ftm: u32,
    pub fta: u32,
    pub oreb: u32,
    pub dreb: u32,
    pub reb: u32,
    pub ast: u32,
    pub stl: u32,
    pub blk: u32,
    pub tov: u32,
    pub pf: u32,
}

impl StatLine {
    fn record(&mut self, event: &PbpEvent) {
        match event.event_type {
            EventType::MadeShot => {
                let value = event.shot_value.unwrap_or(2);
                self.fga += 1;
                self.fgm += 1;
                self.points += u32::from(value);
                if value == 3 {
                    self.fg3a += 1;
                    self.fg3m += 1;
                }
            }
            EventType::MissedShot => {
                self.fga += 1;
                if event.shot_value == Some(3) {
                    self.fg3a += 1;
                }
            }
            EventType::FreeThrowMade => {
                self.fta += 1;
                self.ftm += 1;
                self.points += 1;
            }
            EventType::FreeThrowMissed => self.fta += 1,
            EventType::OffensiveRebound => {
                self.oreb += 1;
                self.reb += 1;
            }
            EventType::DefensiveRebound => {
                self.dreb += 1;
                self.reb += 1;
            }
            EventType::Rebound => self.reb += 1,
            EventType::Assist => self.ast += 1,
            EventType::Steal => self.stl += 1,
            EventType::Block => self.blk += 1,
            EventType::Turnover => self.tov += 1,
            EventType::Foul => self.pf += 1,
            _ => {}
        }
    }
}

/// Per-player aggregate for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameRow {
    pub game_id: String,
    pub season: String,
    pub game_date: Option<NaiveDate>,
    pub player_id: String,
    pub team_id: Option<String>,
    /// Absent when the game carries no substitution events
    pub minutes: Option<f64>,
    #[serde(flatten)]
    pub stats: StatLine,
}

/// Per-team aggregate for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamGameRow {
    pub game_id: String,
    pub season: String,
    pub game_date: Option<NaiveDate>,
    pub team_id: String,
    #[serde(flatten)]
    pub stats: StatLine,
}

impl Identified for PlayerGameRow {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    fn season(&self) -> &str {
        &self.season
    }
}

impl Identified for TeamGameRow {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    fn season(&self) -> &str {
        &self.season
    }
}

impl UnitRow for PlayerGameRow {
    const DATASET: Dataset = Dataset::PlayerGame;
    const COLUMNS: &'static [&'static str] = &[
        "game_id", "season", "game_date", "player_id", "team_id", "minutes", "points", "fgm",
        "fga", "fg3m", "fg3a", "ftm", "fta", "oreb", "dreb", "reb", "ast", "stl", "blk", "tov",
        "pf",
    ];
}

impl UnitRow for TeamGameRow {
    const DATASET: Dataset = Dataset::TeamGame;
    const COLUMNS: &'static [&'static str] = &[
        "game_id", "season", "game_date", "team_id", "points", "fgm", "fga", "fg3m", "fg3a",
        "ftm", "fta", "oreb", "dreb", "reb", "ast", "stl", "blk", "tov", "pf",
    ];
}

/// Aggregates for one game
#[derive(Debug, Clone, PartialEq)]
pub struct BoxScore {
    pub game_id: String,
    pub season: String,
    pub game_date: Option<NaiveDate>,
    pub players: Vec<PlayerGameRow>,
    pub teams: Vec<TeamGameRow>,
}

/// Aggregate one game's events into player and team rows
pub fn aggregate(events: &[PbpEvent], clock: &PeriodClock) -> Result<BoxScore> {
    let identity = embedded_identity(events)?;

    let mut ordered: Vec<&PbpEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.period, e.event_num));

    let game_date = ordered.iter().find_map(|e| e.game_date);

    let mut players: BTreeMap<&str, (Option<&str>, StatLine)> = BTreeMap::new();
    let mut teams: BTreeMap<&str, StatLine> = BTreeMap::new();

    for event in &ordered {
        if let Some(team_id) = event.team_id.as_deref() {
            teams.entry(team_id).or_default().record(event);
        }
        if let Some(player_id) = event.player_id.as_deref() {
            let entry = players.entry(player_id).or_default();
            if entry.0.is_none() {
                entry.0 = event.team_id.as_deref();
            }
            entry.1.record(event);
        }
    }

    let minutes = if ordered.iter().any(|e| is_substitution(e.event_type)) {
        Some(on_court_seconds(&ordered, clock)?)
    } else {
        None
    };

    let players = players
        .into_iter()
        .map(|(player_id, (team_id, stats))| PlayerGameRow {
            game_id: identity.game_id.clone(),
            season: identity.season.clone(),
            game_date,
            player_id: player_id.to_string(),
            team_id: team_id.map(str::to_string),
            minutes: minutes.as_ref().map(|m| {
                let seconds = m.get(player_id).copied().unwrap_or(0.0);
                (seconds / 60.0 * 100.0).round() / 100.0
            }),
            stats,
        })
        .collect();

    let teams = teams
        .into_iter()
        .map(|(team_id, stats)| TeamGameRow {
            game_id: identity.game_id.clone(),
            season: identity.season.clone(),
            game_date,
            team_id: team_id.to_string(),
            stats,
        })
        .collect();

    Ok(BoxScore {
        game_id: identity.game_id,
        season: identity.season,
        game_date,
        players,
        teams,
    })
}

fn is_substitution(event_type: EventType) -> bool {
    matches!(
        event_type,
        EventType::SubstitutionIn | EventType::SubstitutionOut
    )
}

/// Seconds on court per player, from substitution intervals.
///
/// A player whose first appearance in a period is anything but a
/// substitution in is treated as on court from the start of that period.
fn on_court_seconds<'a>(
    ordered: &[&'a PbpEvent],
    clock: &PeriodClock,
) -> Result<BTreeMap<&'a str, f64>> {
    let mut totals: BTreeMap<&'a str, f64> = BTreeMap::new();

    let periods: BTreeSet<u32> = ordered.iter().map(|e| e.period).collect();
    for period in periods {
        let length = clock.period_length(period);
        // player -> elapsed time they last came on court
        let mut on_since: BTreeMap<&'a str, f64> = BTreeMap::new();
        let mut seen: BTreeSet<&'a str> = BTreeSet::new();

        for event in ordered.iter().filter(|e| e.period == period) {
            let Some(player_id) = event.player_id.as_deref() else {
                continue;
            };
            let elapsed = clock.elapsed(period, &event.clock)?;
            let first_seen = seen.insert(player_id);

            match event.event_type {
                EventType::SubstitutionIn => {
                    on_since.entry(player_id).or_insert(elapsed);
                }
                EventType::SubstitutionOut => {
                    let start = match on_since.remove(player_id) {
                        Some(start) => start,
                        None if first_seen => 0.0,
                        None => continue,
                    };
                    *totals.entry(player_id).or_default() += (elapsed - start).max(0.0);
                }
                _ => {
                    if first_seen {
                        on_since.insert(player_id, 0.0);
                    }
                }
            }
        }

        for (player_id, start) in on_since {
            *totals.entry(player_id).or_default() += (length - start).max(0.0);
        }
    }

    Ok(totals)
}
