//! Pipeline configuration
//!
//! Defaults point at the public Betfair greyhound BSP archive and the
//! Greyhound Recorder form guides; every value can be overridden from the
//! environment.

use crate::scraper::ScraperConfig;

/// Betfair greyhound win-market BSP archive (date and `.csv` are appended)
pub const DEFAULT_FEED_BASE_URL: &str =
    "https://promo.betfair.com/betfairsp/prices/dwbfgreyhoundwin";

/// Race-card listing page
pub const DEFAULT_CARD_LISTING_URL: &str = "http://thegreyhoundrecorder.com.au/form-guides/";

/// Market-hint prefix of the races we keep
pub const DEFAULT_COUNTRY_CODE: &str = "AUS";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feed_base_url: String,
    pub card_listing_url: String,
    pub country_code: String,
    pub scraper: ScraperConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            card_listing_url: DEFAULT_CARD_LISTING_URL.to_string(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            scraper: ScraperConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read overrides from FEED_BASE_URL, CARD_LISTING_URL, COUNTRY_CODE,
    /// SCRAPER_DELAY_MS and SCRAPER_TIMEOUT_SECS
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scraper = ScraperConfig {
            delay_ms: std::env::var("SCRAPER_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.scraper.delay_ms),
            timeout_secs: std::env::var("SCRAPER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.scraper.timeout_secs),
            ..defaults.scraper
        };

        Self {
            feed_base_url: std::env::var("FEED_BASE_URL").unwrap_or(defaults.feed_base_url),
            card_listing_url: std::env::var("CARD_LISTING_URL")
                .unwrap_or(defaults.card_listing_url),
            country_code: std::env::var("COUNTRY_CODE").unwrap_or(defaults.country_code),
            scraper,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.country_code, "AUS");
        assert!(config.feed_base_url.ends_with("dwbfgreyhoundwin"));
        assert!(config.card_listing_url.contains("/form-guides"));
    }
}
