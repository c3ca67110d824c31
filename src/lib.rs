//! courtlog - season-partitioned basketball game data pipeline
//!
//! This crate provides:
//! - A Game Index (SQLite) tracking which datasets are present per game
//! - Ingestion of play-by-play and shot data into identity-verified raw units
//! - Box-score normalization, consistency validation and readiness gating
//! - Golden-fixture regression and live drift spot-checks

pub mod boxscore;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod models;
pub mod progress;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
