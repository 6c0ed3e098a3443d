//! Data loading, normalisation and export modules

pub mod consolidate;
pub mod export;
pub mod feed_loader;
pub mod price_table;
pub mod race_card;

// Re-export commonly used types
pub use consolidate::{consolidate, ConsolidatedTable};
pub use export::{export_csv, to_csv_bytes, write_csv, TableExport};
pub use feed_loader::{feed_url, validate_date, FeedBatch, PriceFeedLoader};
pub use price_table::{normalize_prices, pivot_trap_prices, PriceTable, TrapRow};
pub use race_card::{load_race_cards, normalize_race_cards, save_race_cards, RunnerCardTable};
