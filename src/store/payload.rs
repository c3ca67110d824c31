//! Unit payload format: a self-describing record set with provenance

use crate::error::Result;
use crate::models::{Dataset, Identified, PbpEvent, ShotAttempt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Version stamped into every unit this build writes
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rows that can be stored as a unit
pub trait UnitRow: Identified + Serialize + DeserializeOwned + Send + Sync {
    const DATASET: Dataset;
    const COLUMNS: &'static [&'static str];
}

impl UnitRow for PbpEvent {
    const DATASET: Dataset = Dataset::Pbp;
    const COLUMNS: &'static [&'static str] = &[
        "game_id",
        "season",
        "event_num",
        "period",
        "clock",
        "event_type",
        "team_id",
        "player_id",
        "home_score",
        "away_score",
        "shot_value",
        "game_date",
        "x",
        "y",
    ];
}

impl UnitRow for ShotAttempt {
    const DATASET: Dataset = Dataset::Shots;
    const COLUMNS: &'static [&'static str] = &[
        "game_id",
        "season",
        "shot_num",
        "period",
        "clock",
        "team_id",
        "player_id",
        "shot_type",
        "made",
        "x",
        "y",
        "game_date",
    ];
}

/// Where a unit's rows came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_system: String,
    pub endpoint: String,
    pub fetched_at: String,
    pub pipeline_version: String,
    /// blake3 of the serialized rows
    pub content_hash: String,
    /// Content hash of the raw unit a normalized unit was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
}

/// One stored unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct StoredUnit<T> {
    pub provenance: Provenance,
    pub columns: Vec<String>,
    pub rows: Vec<T>,
}

impl<T: UnitRow> StoredUnit<T> {
    /// Wrap fetched rows, hashing their content
    pub fn fetched(
        rows: Vec<T>,
        source_system: &str,
        endpoint: &str,
        fetched_at: String,
    ) -> Result<Self> {
        Ok(Self {
            provenance: Provenance {
                source_system: source_system.to_string(),
                endpoint: endpoint.to_string(),
                fetched_at,
                pipeline_version: PIPELINE_VERSION.to_string(),
                content_hash: content_hash(&rows)?,
                derived_from: None,
            },
            columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Wrap rows derived from `parent`; the result depends only on the parent
    pub fn derived<P>(rows: Vec<T>, parent: &StoredUnit<P>, endpoint: &str) -> Result<Self> {
        Ok(Self {
            provenance: Provenance {
                source_system: parent.provenance.source_system.clone(),
                endpoint: endpoint.to_string(),
                fetched_at: parent.provenance.fetched_at.clone(),
                pipeline_version: PIPELINE_VERSION.to_string(),
                content_hash: content_hash(&rows)?,
                derived_from: Some(parent.provenance.content_hash.clone()),
            },
            columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }
}

/// blake3 hex digest of the JSON encoding of `rows`
pub fn content_hash<T: Serialize>(rows: &[T]) -> Result<String> {
    let bytes = serde_json::to_vec(rows)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Render a unit to its on-disk bytes
pub fn render<T: Serialize>(unit: &StoredUnit<T>) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(unit)?;
    bytes.push(b'\n');
    Ok(bytes)
}
