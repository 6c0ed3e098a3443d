//! Greyhound - Betfair BSP and race-card tip consolidation
//!
//! This library provides:
//! - Betfair greyhound win-market BSP feed loading
//! - Per-race price tables with odds bands and favourite rankings
//! - Greyhound Recorder race-card scraping
//! - Consolidation of tips with the prices of the traps they name
//! - CSV export of every table
//!
//! # Example
//!
//! ```no_run
//! use greyhound::config::PipelineConfig;
//! use greyhound::data::TableExport;
//! use greyhound::pipeline::{today, Session};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut session = Session::new(PipelineConfig::from_env())?;
//!
//! let date = today().pred_opt().unwrap();
//! let table = session.consolidated(date, today()).await?;
//! table.export(std::path::Path::new(table.file_name()))?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scraper;

// Re-export commonly used types
pub use core::OddsBand;
pub use data::{ConsolidatedTable, FeedBatch, PriceTable, RunnerCardTable, TableExport};
pub use error::StageError;
pub use models::{ConsolidatedRow, RaceCardField, RaceSummary, RunnerCardRow, TrapPrices};
pub use pipeline::Session;
