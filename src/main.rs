//! courtlog CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use courtlog::{
    commands::{
        cmd_capture_golden, cmd_errors, cmd_index, cmd_ingest, cmd_init, cmd_normalize, cmd_ready,
        cmd_regress, cmd_spot_check, cmd_status, cmd_validate, print_drift_report, print_errors,
        print_golden_set, print_index_report, print_ingestion_report, print_init_report,
        print_normalization_report, print_readiness, print_regression_report, print_status,
        print_validation_report, CancelFlag, GoldenSet, IngestOptions, InitOptions,
    },
    config::Config,
    error::Result,
    fetch::HttpFetcher,
    index::GameIndex,
    models::Dataset,
    progress::LogWriterFactory,
    store::UnitStore,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "courtlog")]
#[command(version, about = "Season-partitioned basketball data pipeline with readiness gating", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "COURTLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON objects on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize courtlog configuration and game index
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// Season to register, as LABEL or LABEL:COMPETITION (repeatable)
        #[arg(long = "season")]
        seasons: Vec<String>,
    },

    /// Load or refresh a season's schedule into the game index
    Index {
        /// Configured season label
        season: String,
    },

    /// Fetch raw data for the final games of a season
    Ingest {
        /// Configured season label
        season: String,

        /// Raw dataset to fetch
        #[arg(value_parser = parse_raw_dataset)]
        dataset: Dataset,

        /// Refetch games that already have the dataset
        #[arg(long)]
        force: bool,

        /// Only ingest these games (repeatable)
        #[arg(long = "game")]
        games: Option<Vec<String>>,
    },

    /// Build player and team box scores from stored play-by-play
    Normalize {
        /// Season label
        season: String,
    },

    /// Run consistency checks and record readiness
    Validate {
        /// Season label
        season: String,
    },

    /// Compare live and stored data against golden fixtures
    Regress {
        /// Golden file (defaults to the configured golden_file)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Capture golden fixtures from current live responses
    CaptureGolden {
        /// Games to capture
        #[arg(required = true)]
        game_ids: Vec<String>,

        /// Output file (defaults to the configured golden_file)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Compare a sample of stored games with live data
    SpotCheck {
        /// Season label (must be ready)
        season: String,

        /// Number of games to sample
        #[arg(long)]
        sample: Option<usize>,

        /// RNG seed for a reproducible sample
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show whether a season is ready for downstream use
    Ready {
        /// Season label
        season: String,
    },

    /// Show pipeline status
    Status,

    /// List recorded failures and quarantined units
    Errors {
        /// Only this season
        season: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_raw_dataset(value: &str) -> std::result::Result<Dataset, String> {
    match value.parse::<Dataset>() {
        Ok(dataset) if Dataset::RAW.contains(&dataset) => Ok(dataset),
        Ok(dataset) => Err(format!("{} is derived by 'normalize', not ingested", dataset)),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let text_layer = (!cli.log_json).then(|| fmt::layer().with_writer(LogWriterFactory::default()));
    let json_layer = cli
        .log_json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "courtlog", &mut std::io::stdout());
        return Ok(0);
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize components
    let index = GameIndex::connect(&config).await?;
    let store = UnitStore::from_config(&config);

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Index { season } => {
            let spec = config.season(&season)?;
            let provider = HttpFetcher::new(&config.provider)?;
            let report = cmd_index(&index, &provider, spec).await?;
            emit(cli.json, &report, print_index_report)?;
        }

        Commands::Ingest {
            season,
            dataset,
            force,
            games,
        } => {
            config.season(&season)?;
            let provider = HttpFetcher::new(&config.provider)?;
            let cancel = CancelFlag::new();
            watch_ctrl_c(cancel.clone());

            let options = IngestOptions {
                force,
                game_ids: games,
            };
            let report = cmd_ingest(
                &config, &index, &store, &provider, &season, dataset, options, &cancel,
            )
            .await?;
            emit(cli.json, &report, print_ingestion_report)?;
            if report.cancelled > 0 {
                return Ok(130);
            }
        }

        Commands::Normalize { season } => {
            let cancel = CancelFlag::new();
            watch_ctrl_c(cancel.clone());
            let report = cmd_normalize(&config, &index, &store, &season, &cancel).await?;
            emit(cli.json, &report, print_normalization_report)?;
            if report.cancelled > 0 {
                return Ok(130);
            }
        }

        Commands::Validate { season } => {
            let cancel = CancelFlag::new();
            watch_ctrl_c(cancel.clone());
            let report = cmd_validate(&config, &index, &store, &season, &cancel).await?;
            emit(cli.json, &report, print_validation_report)?;
            if report.cancelled > 0 {
                return Ok(130);
            }
        }

        Commands::Regress { file } => {
            let path = file.unwrap_or_else(|| config.golden_path());
            let golden = GoldenSet::load(&path)?;
            let provider = HttpFetcher::new(&config.provider)?;
            let report = cmd_regress(&config, &store, &provider, &golden).await?;
            emit(cli.json, &report, print_regression_report)?;
            if !report.passed {
                return Ok(1);
            }
        }

        Commands::CaptureGolden { game_ids, file } => {
            let path = file.unwrap_or_else(|| config.golden_path());
            let provider = HttpFetcher::new(&config.provider)?;
            let set = cmd_capture_golden(&config, &provider, &game_ids, &path).await?;
            emit(cli.json, &set, |set| print_golden_set(set, &path))?;
        }

        Commands::SpotCheck {
            season,
            sample,
            seed,
        } => {
            let provider = HttpFetcher::new(&config.provider)?;
            let report =
                cmd_spot_check(&config, &index, &store, &provider, &season, sample, seed).await?;
            emit(cli.json, &report, print_drift_report)?;
        }

        Commands::Ready { season } => {
            let report = cmd_ready(&config, &season)?;
            emit(cli.json, &report, print_readiness)?;
            if !report.ready {
                return Ok(1);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &index).await?;
            emit(cli.json, &status, print_status)?;
        }

        Commands::Errors { season } => {
            let log = cmd_errors(&index, season.as_deref()).await?;
            emit(cli.json, &log, print_errors)?;
        }
    }

    Ok(0)
}

async fn handle_init(cli: Cli) -> Result<i32> {
    let Commands::Init { force, seasons } = cli.command else {
        unreachable!()
    };

    let (base_dir, config_path) = resolve_paths(cli.config);
    let report = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
        seasons,
    })
    .await?;
    emit(cli.json, &report, print_init_report)?;
    Ok(0)
}

/// Request cancellation on the first Ctrl-C; in-flight games finish
fn watch_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing in-flight games, starting no new ones");
            cancel.cancel();
        }
    });
}

/// Base directory and config file for `init`.
///
/// If the user specifies a config file, its parent is the base directory.
fn resolve_paths(config: Option<PathBuf>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'courtlog init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
