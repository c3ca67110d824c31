//! Init command implementation

use crate::config::{Config, SeasonSpec};
use crate::error::{Error, Result};
use crate::index::GameIndex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Seasons to pre-register, as `label` or `label:competition`
    pub seasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub base_dir: String,
    pub config_path: String,
    pub db_path: String,
    pub data_dir: String,
    pub seasons: Vec<String>,
}

/// Parse `label[:competition]`
pub fn parse_season_arg(arg: &str) -> SeasonSpec {
    match arg.split_once(':') {
        Some((label, competition)) => SeasonSpec {
            label: label.to_string(),
            competition: competition.to_string(),
            provider_season: None,
        },
        None => SeasonSpec {
            label: arg.to_string(),
            competition: "regular".to_string(),
            provider_season: None,
        },
    }
}

/// Write a default configuration and create the Game Index
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        seasons,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::with_base_dir(base_dir);
    config.paths.config_file = config_path;
    config.seasons = seasons.iter().map(|s| parse_season_arg(s)).collect();
    config.validate()?;
    config.save()?;

    std::fs::create_dir_all(&config.paths.data_dir)?;
    GameIndex::connect(&config).await?;
    info!("Created game index at {:?}", config.paths.db_file);

    Ok(InitReport {
        base_dir: config.paths.base_dir.display().to_string(),
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        data_dir: config.paths.data_dir.display().to_string(),
        seasons: config.seasons.iter().map(|s| s.label.clone()).collect(),
    })
}

pub fn print_init_report(report: &InitReport) {
    println!("✓ Initialized courtlog at {}", report.base_dir);
    println!("\nConfiguration: {}", report.config_path);
    println!("Game index: {}", report.db_path);
    println!("Data: {}", report.data_dir);
    if !report.seasons.is_empty() {
        println!("Seasons: {}", report.seasons.join(", "));
    }
    println!("\nNext steps:");
    println!("  courtlog index <season>          # Load the season schedule");
    println!("  courtlog ingest <season> pbp     # Fetch play-by-play");
    println!("  courtlog ingest <season> shots   # Fetch shot charts");
    println!("  courtlog normalize <season>      # Build box scores");
    println!("  courtlog validate <season>       # Check consistency and readiness");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
            seasons: vec!["2023-24:nba-regular".to_string(), "2022-23".to_string()],
        }
    }

    #[test]
    fn test_parse_season_arg() {
        assert_eq!(parse_season_arg("2023-24:nba-playoffs").competition, "nba-playoffs");
        assert_eq!(parse_season_arg("2023-24").competition, "regular");
    }

    #[tokio::test]
    async fn test_init_writes_loadable_config() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(options(&tmp, false)).await.unwrap();
        assert_eq!(report.seasons, vec!["2023-24", "2022-23"]);

        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert!(config.is_initialized());
        assert_eq!(config.season("2023-24").unwrap().competition, "nba-regular");

        assert!(cmd_init(options(&tmp, false)).await.is_err());
        assert!(cmd_init(options(&tmp, true)).await.is_ok());
    }
}
