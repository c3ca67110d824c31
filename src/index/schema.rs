//! SQLite schema definition

/// SQL schema for the game index database
pub const SCHEMA_SQL: &str = r#"
-- Games: one row per provider game identifier
CREATE TABLE IF NOT EXISTS games (
    game_id TEXT PRIMARY KEY,
    season TEXT NOT NULL,
    competition TEXT NOT NULL,
    status TEXT NOT NULL,
    home_team_id TEXT NOT NULL,
    away_team_id TEXT NOT NULL,
    scheduled_at TEXT,
    has_pbp INTEGER NOT NULL DEFAULT 0,
    has_shots INTEGER NOT NULL DEFAULT 0,
    has_boxscore INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL
);

-- Per-game failures collected during batch runs
CREATE TABLE IF NOT EXISTS ingest_errors (
    id TEXT PRIMARY KEY,
    run_id TEXT,
    game_id TEXT NOT NULL,
    season TEXT NOT NULL,
    dataset TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    message TEXT NOT NULL,
    occurred_at TEXT NOT NULL
);

-- Units flagged as corrupted, pending operator confirmation
CREATE TABLE IF NOT EXISTS quarantine (
    dataset TEXT NOT NULL,
    season TEXT NOT NULL,
    game_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    PRIMARY KEY (dataset, season, game_id)
);

-- Pipeline runs: tracking history
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    operation TEXT NOT NULL,
    season TEXT NOT NULL,
    dataset TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    errors_json TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_games_season ON games(season);
CREATE INDEX IF NOT EXISTS idx_games_season_status ON games(season, status);
CREATE INDEX IF NOT EXISTS idx_errors_season ON ingest_errors(season);
CREATE INDEX IF NOT EXISTS idx_errors_game ON ingest_errors(game_id);
CREATE INDEX IF NOT EXISTS idx_quarantine_season ON quarantine(season);
CREATE INDEX IF NOT EXISTS idx_runs_season ON runs(season);
"#;
