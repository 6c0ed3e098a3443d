//! Web scraper for thegreyhoundrecorder.com.au race cards
//!
//! Follows every form-guide link on the listing page and extracts the race
//! numbers, distances, grades and the four ranked tips of each meeting.
//!
//! # Example
//!
//! ```no_run
//! use greyhound::scraper::{RaceCardScraper, ScraperConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let scraper = RaceCardScraper::new(ScraperConfig::default())?;
//!
//!     let cards = scraper
//!         .scrape_cards("http://thegreyhoundrecorder.com.au/form-guides/", 2026)
//!         .await?;
//!     println!("Scraped {} meetings", cards.len());
//!
//!     Ok(())
//! }
//! ```

mod card;
mod client;

pub use card::{card_base_url, card_date, CardParser};
pub use client::{build_client, RaceCardScraper, ScraperConfig, ScraperError};
