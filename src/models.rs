//! Domain records shared by the store, fetchers and engines.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stored dataset kinds, raw and normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Pbp,
    Shots,
    PlayerGame,
    TeamGame,
}

/// Top-level directory a dataset lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Raw,
    Normalized,
}

impl Dataset {
    pub const RAW: [Dataset; 2] = [Dataset::Pbp, Dataset::Shots];
    pub const NORMALIZED: [Dataset; 2] = [Dataset::PlayerGame, Dataset::TeamGame];
    pub const ALL: [Dataset; 4] = [
        Dataset::Pbp,
        Dataset::Shots,
        Dataset::PlayerGame,
        Dataset::TeamGame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Pbp => "pbp",
            Dataset::Shots => "shots",
            Dataset::PlayerGame => "player_game",
            Dataset::TeamGame => "team_game",
        }
    }

    pub fn layer(&self) -> Layer {
        match self {
            Dataset::Pbp | Dataset::Shots => Layer::Raw,
            Dataset::PlayerGame | Dataset::TeamGame => Layer::Normalized,
        }
    }

    /// Game Index flag column backing this dataset
    pub fn flag_column(&self) -> &'static str {
        match self {
            Dataset::Pbp => "has_pbp",
            Dataset::Shots => "has_shots",
            Dataset::PlayerGame | Dataset::TeamGame => "has_boxscore",
        }
    }
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Normalized => "normalized",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pbp" | "play_by_play" | "playbyplay" => Ok(Dataset::Pbp),
            "shots" | "shot" => Ok(Dataset::Shots),
            "player_game" => Ok(Dataset::PlayerGame),
            "team_game" => Ok(Dataset::TeamGame),
            _ => Err(Error::Config(format!("Unknown dataset: {}", s))),
        }
    }
}

/// Scheduling status of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Scheduled => write!(f, "scheduled"),
            GameStatus::InProgress => write!(f, "in_progress"),
            GameStatus::Final => write!(f, "final"),
        }
    }
}

impl FromStr for GameStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(GameStatus::Scheduled),
            "in_progress" | "live" => Ok(GameStatus::InProgress),
            "final" => Ok(GameStatus::Final),
            _ => Err(Error::Config(format!("Unknown game status: {}", s))),
        }
    }
}

/// Rows that embed their own game identity
pub trait Identified {
    fn game_id(&self) -> &str;
    fn season(&self) -> &str;
}

/// Play-by-play event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MadeShot,
    MissedShot,
    FreeThrowMade,
    FreeThrowMissed,
    OffensiveRebound,
    DefensiveRebound,
    Rebound,
    Assist,
    Steal,
    Block,
    Turnover,
    Foul,
    SubstitutionIn,
    SubstitutionOut,
    PeriodStart,
    PeriodEnd,
    Timeout,
    JumpBall,
    #[serde(other)]
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MadeShot => "made_shot",
            EventType::MissedShot => "missed_shot",
            EventType::FreeThrowMade => "free_throw_made",
            EventType::FreeThrowMissed => "free_throw_missed",
            EventType::OffensiveRebound => "offensive_rebound",
            EventType::DefensiveRebound => "defensive_rebound",
            EventType::Rebound => "rebound",
            EventType::Assist => "assist",
            EventType::Steal => "steal",
            EventType::Block => "block",
            EventType::Turnover => "turnover",
            EventType::Foul => "foul",
            EventType::SubstitutionIn => "substitution_in",
            EventType::SubstitutionOut => "substitution_out",
            EventType::PeriodStart => "period_start",
            EventType::PeriodEnd => "period_end",
            EventType::Timeout => "timeout",
            EventType::JumpBall => "jump_ball",
            EventType::Other => "other",
        }
    }

    /// Made field goal (free throws excluded)
    pub fn is_made_field_goal(&self) -> bool {
        matches!(self, EventType::MadeShot)
    }
}

/// One play-by-play action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PbpEvent {
    #[serde(deserialize_with = "de_id")]
    pub game_id: String,
    pub season: String,
    pub event_num: u32,
    pub period: u32,
    pub clock: String,
    pub event_type: EventType,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub team_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub player_id: Option<String>,
    pub home_score: u32,
    pub away_score: u32,
    #[serde(default)]
    pub shot_value: Option<u8>,
    #[serde(default)]
    pub game_date: Option<NaiveDate>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

impl Identified for PbpEvent {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    fn season(&self) -> &str {
        &self.season
    }
}

/// Shot classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    #[serde(alias = "2PT", alias = "2pt", alias = "two")]
    TwoPoint,
    #[serde(alias = "3PT", alias = "3pt", alias = "three")]
    ThreePoint,
}

impl ShotType {
    pub fn points(&self) -> u32 {
        match self {
            ShotType::TwoPoint => 2,
            ShotType::ThreePoint => 3,
        }
    }
}

/// One shot attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotAttempt {
    #[serde(deserialize_with = "de_id")]
    pub game_id: String,
    pub season: String,
    pub shot_num: u32,
    pub period: u32,
    pub clock: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub team_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub player_id: Option<String>,
    pub shot_type: ShotType,
    #[serde(alias = "success", deserialize_with = "de_flag")]
    pub made: bool,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub game_date: Option<NaiveDate>,
}

impl Identified for ShotAttempt {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    fn season(&self) -> &str {
        &self.season
    }
}

/// Raw record set returned by a fetch collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecords {
    Pbp(Vec<PbpEvent>),
    Shots(Vec<ShotAttempt>),
}

impl RawRecords {
    pub fn dataset(&self) -> Dataset {
        match self {
            RawRecords::Pbp(_) => Dataset::Pbp,
            RawRecords::Shots(_) => Dataset::Shots,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawRecords::Pbp(rows) => rows.len(),
            RawRecords::Shots(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_pbp(self) -> Result<Vec<PbpEvent>> {
        match self {
            RawRecords::Pbp(rows) => Ok(rows),
            RawRecords::Shots(_) => Err(Error::Malformed("expected pbp, got shots".to_string())),
        }
    }

    pub fn into_shots(self) -> Result<Vec<ShotAttempt>> {
        match self {
            RawRecords::Shots(rows) => Ok(rows),
            RawRecords::Pbp(_) => Err(Error::Malformed("expected shots, got pbp".to_string())),
        }
    }

    /// Identity embedded in the rows
    pub fn embedded_identity(&self) -> Result<GameIdentity> {
        match self {
            RawRecords::Pbp(rows) => embedded_identity(rows),
            RawRecords::Shots(rows) => embedded_identity(rows),
        }
    }
}

/// (game_id, season) pair carried inside a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameIdentity {
    pub game_id: String,
    pub season: String,
}

/// Derive the single identity carried by every row.
///
/// Empty sets cannot be verified and are rejected as malformed; rows that
/// disagree with the first row are an identity mismatch.
pub fn embedded_identity<T: Identified>(rows: &[T]) -> Result<GameIdentity> {
    let first = rows
        .first()
        .ok_or_else(|| Error::Malformed("record set is empty".to_string()))?;

    for row in rows.iter().skip(1) {
        if row.game_id() != first.game_id() {
            return Err(Error::IdentityMismatch {
                field: "game_id",
                expected: first.game_id().to_string(),
                found: row.game_id().to_string(),
            });
        }
        if row.season() != first.season() {
            return Err(Error::IdentityMismatch {
                field: "season",
                expected: first.season().to_string(),
                found: row.season().to_string(),
            });
        }
    }

    Ok(GameIdentity {
        game_id: first.game_id().to_string(),
        season: first.season().to_string(),
    })
}

/// A game as listed by the schedule collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGame {
    #[serde(deserialize_with = "de_id")]
    pub game_id: String,
    pub status: GameStatus,
    #[serde(deserialize_with = "de_id")]
    pub home_team_id: String,
    #[serde(deserialize_with = "de_id")]
    pub away_team_id: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

// Provider identifiers arrive as strings or bare integers

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or integer identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<String, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
        Ok(v.to_string())
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    deserializer.deserialize_any(IdVisitor)
}

fn de_opt_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    struct OptIdVisitor;

    impl<'de> Visitor<'de> for OptIdVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an optional string or integer identifier")
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(
            self,
            d: D,
        ) -> std::result::Result<Self::Value, D::Error> {
            d.deserialize_any(IdVisitor).map(Some)
        }
    }

    deserializer.deserialize_option(OptIdVisitor)
}

// `made` is boolean valued even when the provider sends 0/1

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean or 0/1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::custom(format!("flag must be 0 or 1, got {}", v))),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::custom(format!("flag must be 0 or 1, got {}", v))),
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<bool, E> {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" => Ok(false),
                other => Err(E::custom(format!("invalid flag value '{}'", other))),
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shot_made_accepts_bool_and_integer() {
        let rows: Vec<ShotAttempt> = serde_json::from_value(json!([
            {"game_id": "G1", "season": "2023-24", "shot_num": 1, "period": 1,
             "clock": "11:40", "shot_type": "two_point", "made": 1},
            {"game_id": "G1", "season": "2023-24", "shot_num": 2, "period": 1,
             "clock": "11:10", "shot_type": "3PT", "success": false}
        ]))
        .unwrap();

        assert!(rows[0].made);
        assert!(!rows[1].made);
        assert_eq!(rows[1].shot_type, ShotType::ThreePoint);
    }

    #[test]
    fn test_shot_type_outside_domain_is_rejected() {
        let result: std::result::Result<ShotAttempt, _> = serde_json::from_value(json!({
            "game_id": "G1", "season": "2023-24", "shot_num": 1, "period": 1,
            "clock": "11:40", "shot_type": "free_throw", "made": true
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_numeric_ids_are_read_as_strings() {
        let event: PbpEvent = serde_json::from_value(json!({
            "game_id": 22300001, "season": "2023-24", "event_num": 4, "period": 1,
            "clock": "PT11M02.00S", "event_type": "made_shot",
            "team_id": 1610612747, "player_id": null,
            "home_score": 2, "away_score": 0, "shot_value": 2
        }))
        .unwrap();

        assert_eq!(event.game_id, "22300001");
        assert_eq!(event.team_id.as_deref(), Some("1610612747"));
        assert_eq!(event.player_id, None);
    }

    #[test]
    fn test_unknown_event_types_collapse_to_other() {
        let event: PbpEvent = serde_json::from_value(json!({
            "game_id": "G1", "season": "2023-24", "event_num": 9, "period": 2,
            "clock": "05:00", "event_type": "instant_replay",
            "home_score": 10, "away_score": 8
        }))
        .unwrap();
        assert_eq!(event.event_type, EventType::Other);
    }

    #[test]
    fn test_embedded_identity_rejects_mixed_rows() {
        let base = PbpEvent {
            game_id: "G1".to_string(),
            season: "2023-24".to_string(),
            event_num: 1,
            period: 1,
            clock: "12:00".to_string(),
            event_type: EventType::PeriodStart,
            team_id: None,
            player_id: None,
            home_score: 0,
            away_score: 0,
            shot_value: None,
            game_date: None,
            x: None,
            y: None,
        };
        let mut other = base.clone();
        other.game_id = "G2".to_string();

        let identity = embedded_identity(&[base.clone()]).unwrap();
        assert_eq!(identity.game_id, "G1");

        match embedded_identity(&[base, other]) {
            Err(Error::IdentityMismatch { field, found, .. }) => {
                assert_eq!(field, "game_id");
                assert_eq!(found, "G2");
            }
            other => panic!("expected identity mismatch, got {:?}", other),
        }

        let empty: Vec<PbpEvent> = Vec::new();
        assert!(matches!(embedded_identity(&empty), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_dataset_round_trips_through_str() {
        for dataset in Dataset::ALL {
            assert_eq!(dataset.as_str().parse::<Dataset>().unwrap(), dataset);
        }
        assert_eq!(Dataset::TeamGame.flag_column(), "has_boxscore");
    }
}
