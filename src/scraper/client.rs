//! HTTP client with rate limiting for thegreyhoundrecorder.com.au

use super::card::{card_base_url, CardParser};
use crate::error::StageError;
use crate::models::RaceCardField;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Scraper errors
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("{url} returned HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse HTML: {0}")]
    ParseError(String),
}

impl From<ScraperError> for StageError {
    fn from(e: ScraperError) -> Self {
        match e {
            ScraperError::ParseError(msg) => StageError::MalformedInput(msg),
            other => StageError::Connection(other.to_string()),
        }
    }
}

/// Scraper configuration
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Delay between requests in milliseconds
    pub delay_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            delay_ms: 2000,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Build the shared HTTP client
pub fn build_client(config: &ScraperConfig) -> Result<reqwest::Client, ScraperError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(&config.user_agent)
        .build()?;
    Ok(client)
}

/// Race-card scraper with rate limiting
pub struct RaceCardScraper {
    client: reqwest::Client,
    config: ScraperConfig,
    parser: CardParser,
    last_request: Arc<Mutex<Instant>>,
}

impl RaceCardScraper {
    /// Create a new scraper with its own client
    pub fn new(config: ScraperConfig) -> Result<Self, ScraperError> {
        let client = build_client(&config)?;
        Self::with_client(client, config)
    }

    /// Create a scraper sharing an existing client
    pub fn with_client(client: reqwest::Client, config: ScraperConfig) -> Result<Self, ScraperError> {
        Ok(Self {
            client,
            config,
            parser: CardParser::new()?,
            last_request: Arc::new(Mutex::new(Instant::now() - Duration::from_secs(10))),
        })
    }

    /// Wait for rate limit
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        let delay = Duration::from_millis(self.config.delay_ms);

        if elapsed < delay {
            tokio::time::sleep(delay - elapsed).await;
        }

        *last = Instant::now();
    }

    /// Fetch a page once, returning the final URL (after redirects) and body
    async fn fetch_page(&self, url: &str) -> Result<(String, String), ScraperError> {
        self.wait_for_rate_limit().await;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ScraperError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((final_url, body))
    }

    /// Form-guide URLs linked from the listing page
    pub async fn scrape_listing(&self, listing_url: &str) -> Result<Vec<String>, ScraperError> {
        tracing::info!("Scraping race-card listing: {}", listing_url);

        let (final_url, html) = self.fetch_page(listing_url).await?;
        let links = self.parser.parse_listing(&html, card_base_url(&final_url));

        tracing::info!("Found {} race cards", links.len());
        Ok(links)
    }

    /// Scrape every race card linked from the listing page
    ///
    /// A transport failure aborts the whole scrape; a page that fails to
    /// parse is skipped.
    pub async fn scrape_cards(
        &self,
        listing_url: &str,
        year: i32,
    ) -> Result<Vec<RaceCardField>, ScraperError> {
        let links = self.scrape_listing(listing_url).await?;
        let mut fields = Vec::with_capacity(links.len());

        for link in &links {
            tracing::info!("Scraping race card: {}", link);
            let (_, html) = self.fetch_page(link).await?;

            match self.parser.parse_card_page(&html, year) {
                Ok(field) => fields.push(field),
                Err(e) => tracing::warn!("Skipping race card {}: {}", link, e),
            }
        }

        Ok(fields)
    }
}
