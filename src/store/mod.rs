//! Partitioned unit store
//!
//! One unit per (dataset, season, game id), laid out as
//! `{root}/{raw|normalized}/{dataset}/season={season}/game_id={game_id}.json`.
//! The partition path is only a claim: every read through
//! [`UnitStore::read_verified`] re-derives identity from the rows.

mod payload;

pub use payload::*;

use crate::config::{is_valid_partition_value, Config};
use crate::error::{Error, Result};
use crate::models::{embedded_identity, Dataset};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};
use walkdir::WalkDir;

const SEASON_PREFIX: &str = "season=";
const GAME_PREFIX: &str = "game_id=";
const UNIT_EXT: &str = "json";

/// Storage key of one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub dataset: Dataset,
    pub season: String,
    pub game_id: String,
}

impl UnitKey {
    pub fn new(dataset: Dataset, season: &str, game_id: &str) -> Self {
        Self {
            dataset,
            season: season.to_string(),
            game_id: game_id.to_string(),
        }
    }

    fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.dataset.layer().as_str())
            .join(self.dataset.as_str())
            .join(format!("{}{}", SEASON_PREFIX, self.season))
            .join(format!("{}{}.{}", GAME_PREFIX, self.game_id, UNIT_EXT))
    }

    fn check_segments(&self) -> Result<()> {
        for value in [&self.season, &self.game_id] {
            if !is_valid_partition_value(value) {
                return Err(Error::Config(format!(
                    "'{}' cannot be used as a partition value",
                    value
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// Filesystem-backed raw and normalized store
#[derive(Debug, Clone)]
pub struct UnitStore {
    root: PathBuf,
}

impl UnitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths.data_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unit_path(&self, key: &UnitKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub fn exists(&self, key: &UnitKey) -> bool {
        self.unit_path(key).is_file()
    }

    /// Write a unit atomically under `key`.
    ///
    /// Rows must embed the identity the key claims; nothing is written
    /// otherwise.
    pub async fn write<T: UnitRow>(&self, key: &UnitKey, unit: &StoredUnit<T>) -> Result<PathBuf> {
        check_claim(key, unit)?;
        let path = self.unit_path(key);
        self.write_bytes(&path, &render(unit)?).await?;
        Ok(path)
    }

    /// Like [`UnitStore::write`], but leaves the file untouched when it
    /// already holds exactly the rendered bytes. Returns whether it wrote.
    pub async fn write_if_changed<T: UnitRow>(
        &self,
        key: &UnitKey,
        unit: &StoredUnit<T>,
    ) -> Result<bool> {
        check_claim(key, unit)?;
        let bytes = render(unit)?;
        let path = self.unit_path(key);
        if let Ok(existing) = tokio::fs::read(&path).await {
            if existing == bytes {
                trace!("Unit {} unchanged", key);
                return Ok(false);
            }
        }
        self.write_bytes(&path, &bytes).await?;
        Ok(true)
    }

    /// tmp sibling, fsync, rename
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!("{}.tmp", UNIT_EXT));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        debug!("Wrote unit {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Read a unit without identity checks
    pub async fn read<T: UnitRow>(&self, key: &UnitKey) -> Result<StoredUnit<T>> {
        let path = self.unit_path(key);
        let bytes = tokio::fs::read(&path).await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::SkippedCorrupted {
            path: key.to_string(),
            reason: format!("unreadable unit: {}", e),
        })
    }

    /// Read a unit and accept it only if its rows agree with the key
    pub async fn read_verified<T: UnitRow>(&self, key: &UnitKey) -> Result<StoredUnit<T>> {
        let unit = self.read::<T>(key).await?;
        verify(key, &unit)?;
        Ok(unit)
    }

    /// Raw bytes of a unit, if present
    pub async fn read_bytes(&self, key: &UnitKey) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.unit_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Units of `dataset`, optionally restricted to one season partition
    pub fn list_units(&self, dataset: Dataset, season: Option<&str>) -> Result<Vec<UnitKey>> {
        let mut base = self
            .root
            .join(dataset.layer().as_str())
            .join(dataset.as_str());
        let depth = if let Some(season) = season {
            base = base.join(format!("{}{}", SEASON_PREFIX, season));
            1
        } else {
            2
        };

        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&base).min_depth(depth).max_depth(depth) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            match parse_unit_path(dataset, entry.path()) {
                Some(key) => keys.push(key),
                None => trace!("Ignoring non-unit file {:?}", entry.path()),
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Season partitions holding a unit of `dataset` for `game_id`
    pub fn find_partitions(&self, dataset: Dataset, game_id: &str) -> Result<Vec<String>> {
        let base = self
            .root
            .join(dataset.layer().as_str())
            .join(dataset.as_str());
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let file_name = format!("{}{}.{}", GAME_PREFIX, game_id, UNIT_EXT);
        let mut seasons = Vec::new();
        for entry in std::fs::read_dir(&base)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(season) = name.to_str().and_then(|n| n.strip_prefix(SEASON_PREFIX)) else {
                continue;
            };
            if entry.path().join(&file_name).is_file() {
                seasons.push(season.to_string());
            }
        }

        seasons.sort();
        Ok(seasons)
    }
}

/// Replace `path` with `bytes` through a fsynced `.tmp` sibling
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn check_claim<T: UnitRow>(key: &UnitKey, unit: &StoredUnit<T>) -> Result<()> {
    key.check_segments()?;
    if T::DATASET != key.dataset {
        return Err(Error::Config(format!(
            "{} rows cannot be stored as {}",
            T::DATASET,
            key.dataset
        )));
    }

    let identity = embedded_identity(&unit.rows)?;
    if identity.game_id != key.game_id {
        return Err(Error::IdentityMismatch {
            field: "game_id",
            expected: key.game_id.clone(),
            found: identity.game_id,
        });
    }
    if identity.season != key.season {
        return Err(Error::IdentityMismatch {
            field: "season",
            expected: key.season.clone(),
            found: identity.season,
        });
    }
    Ok(())
}

fn parse_unit_path(dataset: Dataset, path: &Path) -> Option<UnitKey> {
    if path.extension()?.to_str()? != UNIT_EXT {
        return None;
    }
    let game_id = path.file_stem()?.to_str()?.strip_prefix(GAME_PREFIX)?;
    let season = path
        .parent()?
        .file_name()?
        .to_str()?
        .strip_prefix(SEASON_PREFIX)?;
    Some(UnitKey::new(dataset, season, game_id))
}

/// Check a parsed unit against the key it was read from
pub fn verify<T: UnitRow>(key: &UnitKey, unit: &StoredUnit<T>) -> Result<()> {
    let corrupted = |reason: String| Error::SkippedCorrupted {
        path: key.to_string(),
        reason,
    };

    let identity = embedded_identity(&unit.rows).map_err(|e| match e {
        Error::Malformed(_) => corrupted("unit has no rows".to_string()),
        Error::IdentityMismatch { field, .. } => corrupted(format!("rows disagree on {}", field)),
        other => other,
    })?;

    if identity.game_id != key.game_id {
        return Err(corrupted(format!(
            "embedded game_id {} does not match partition {}",
            identity.game_id, key.game_id
        )));
    }
    if identity.season != key.season {
        return Err(corrupted(format!(
            "embedded season {} does not match partition {}",
            identity.season, key.season
        )));
    }
    if content_hash(&unit.rows)? != unit.provenance.content_hash {
        return Err(corrupted("content hash mismatch".to_string()));
    }
    Ok(())
}
