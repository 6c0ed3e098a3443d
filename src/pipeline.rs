//! Stage orchestration for one session
//!
//! A `Session` owns the HTTP client, the scraper and one memo table per
//! stage. Each stage reads its inputs from the stage before it; when that
//! stage failed the failure is logged and the next stage sees `None`, so
//! problems surface as `NoData` further down instead of aborting.

use chrono::{Datelike, Local, NaiveDate};
use std::sync::Arc;

use crate::cache::{FeedKey, Memo, PriceKey};
use crate::config::PipelineConfig;
use crate::data::{
    consolidate, normalize_prices, normalize_race_cards, ConsolidatedTable, FeedBatch,
    PriceFeedLoader, PriceTable, RunnerCardTable,
};
use crate::error::StageError;
use crate::models::RaceCardField;
use crate::scraper::{build_client, RaceCardScraper};

/// Today's date in local time
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Turn an upstream failure into "no input", logging it
fn upstream<T>(stage: &str, result: Result<T, StageError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{} stage failed: {}", stage, e.notice());
            None
        }
    }
}

pub struct Session {
    config: PipelineConfig,
    loader: PriceFeedLoader,
    scraper: RaceCardScraper,
    feeds: Memo<FeedKey, FeedBatch>,
    prices: Memo<PriceKey, PriceTable>,
    cards: Memo<String, Vec<RaceCardField>>,
    runners: Memo<String, RunnerCardTable>,
    consolidated: Memo<(PriceKey, String), ConsolidatedTable>,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Result<Self, StageError> {
        let client = build_client(&config.scraper)?;
        let loader = PriceFeedLoader::new(client.clone(), config.feed_base_url.clone());
        let scraper = RaceCardScraper::with_client(client, config.scraper.clone())?;

        Ok(Self {
            config,
            loader,
            scraper,
            feeds: Memo::new(),
            prices: Memo::new(),
            cards: Memo::new(),
            runners: Memo::new(),
            consolidated: Memo::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn feed_key(&self, date: NaiveDate) -> FeedKey {
        FeedKey {
            base_url: self.loader.base_url().to_string(),
            date,
        }
    }

    fn price_key(&self, date: NaiveDate) -> PriceKey {
        PriceKey {
            feed: self.feed_key(date),
            country: self.config.country_code.clone(),
        }
    }

    fn listing_key(&self) -> String {
        self.config.card_listing_url.clone()
    }

    /// Raw BSP feed for a date
    pub async fn load_feed(
        &mut self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Arc<FeedBatch>, StageError> {
        let key = self.feed_key(date);
        if let Some(batch) = self.feeds.get(&key) {
            return Ok(batch);
        }

        let batch = self.loader.load(date, today).await?;
        Ok(self.feeds.insert(key, batch))
    }

    /// Normalised price table for a date
    pub async fn price_table(
        &mut self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Arc<PriceTable>, StageError> {
        let key = self.price_key(date);
        if let Some(table) = self.prices.get(&key) {
            return Ok(table);
        }

        let feed = upstream("Feed", self.load_feed(date, today).await);
        let table = normalize_prices(feed.as_deref(), &self.config.country_code)?;
        Ok(self.prices.insert(key, table))
    }

    /// Raw race-card pages from the listing page
    pub async fn scrape_cards(&mut self, year: i32) -> Result<Arc<Vec<RaceCardField>>, StageError> {
        let key = self.listing_key();
        if let Some(fields) = self.cards.get(&key) {
            return Ok(fields);
        }

        let fields = self.scraper.scrape_cards(&key, year).await?;
        Ok(self.cards.insert(key, fields))
    }

    /// Use previously saved race-card pages instead of scraping
    ///
    /// Anything derived from older pages is dropped.
    pub fn use_race_cards(&mut self, fields: Vec<RaceCardField>) -> Arc<Vec<RaceCardField>> {
        let key = self.listing_key();
        self.runners.remove(&key);
        self.consolidated.invalidate();
        self.cards.insert(key, fields)
    }

    /// Exploded race-card rows
    pub async fn runner_cards(&mut self, year: i32) -> Result<Arc<RunnerCardTable>, StageError> {
        let key = self.listing_key();
        if let Some(table) = self.runners.get(&key) {
            return Ok(table);
        }

        let fields = upstream("Race card", self.scrape_cards(year).await);
        let table = normalize_race_cards(fields.as_deref().map(|f| f.as_slice()))?;
        Ok(self.runners.insert(key, table))
    }

    /// Fetch the feed and race cards a consolidation needs
    ///
    /// Stops at the first failing input so its own error reaches the caller
    /// instead of the "not scraped yet" notice.
    pub async fn require_inputs(
        &mut self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), StageError> {
        self.load_feed(date, today).await?;
        self.scrape_cards(today.year()).await?;
        Ok(())
    }

    /// Prices joined with race-card tips
    pub async fn consolidated(
        &mut self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Arc<ConsolidatedTable>, StageError> {
        let key = (self.price_key(date), self.listing_key());
        if let Some(table) = self.consolidated.get(&key) {
            return Ok(table);
        }

        let prices = upstream("Price table", self.price_table(date, today).await);
        let runners = upstream("Race card table", self.runner_cards(today.year()).await);
        let table = consolidate(prices.as_deref(), runners.as_deref())?;
        Ok(self.consolidated.insert(key, table))
    }

    /// Forget every cached table
    pub fn invalidate(&mut self) {
        self.feeds.invalidate();
        self.prices.invalidate();
        self.cards.invalidate();
        self.runners.invalidate();
        self.consolidated.invalidate();
        tracing::info!("Session cache cleared");
    }

    /// Number of tables currently cached
    pub fn cached_tables(&self) -> usize {
        self.feeds.len()
            + self.prices.len()
            + self.cards.len()
            + self.runners.len()
            + self.consolidated.len()
    }
}
