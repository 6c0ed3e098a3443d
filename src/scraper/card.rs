//! Race-card page parsing for thegreyhoundrecorder.com.au
//!
//! The listing page links to one form guide per meeting. Each form guide has
//! a title ("Sale - Friday 17th October"), one `tr#tableHeader` row per race
//! and one tips row per race holding the four ranked tips.

use chrono::{NaiveDate, Weekday};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::ScraperError;
use crate::models::{RaceCardField, TIP_COUNT};

/// Path segment that splits the site root from the form guides
const FORM_GUIDES_PATH: &str = "/form-guides";

fn selector(css: &str) -> Result<Selector, ScraperError> {
    Selector::parse(css).map_err(|e| ScraperError::ParseError(format!("{}: {}", css, e)))
}

/// Turn a title date such as "Friday 17th October" into dd/mm/yyyy
///
/// Text that does not read as a day and month is kept as it is, with the
/// year appended.
pub fn card_date(text: &str, year: i32) -> String {
    let cleaned: Vec<String> = text
        .split_whitespace()
        .map(|t| t.trim_matches(','))
        .filter(|t| t.parse::<Weekday>().is_err())
        .map(|t| {
            if t.starts_with(|c: char| c.is_ascii_digit()) {
                t.trim_end_matches(|c: char| c.is_ascii_alphabetic()).to_string()
            } else {
                t.to_string()
            }
        })
        .collect();
    let joined = format!("{} {}", cleaned.join(" "), year);

    ["%d %B %Y", "%d %b %Y", "%B %d %Y", "%b %d %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&joined, fmt).ok())
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| {
            warn!("Unrecognised race-card date {:?}", text);
            format!("{} {}", text, year).trim().to_string()
        })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Site root for resolving card links: everything before `/form-guides`
pub fn card_base_url(listing_url: &str) -> &str {
    listing_url
        .split(FORM_GUIDES_PATH)
        .next()
        .unwrap_or(listing_url)
        .trim_end_matches('/')
}

/// Race-card page parser
pub struct CardParser {
    listing_links: Selector,
    title: Selector,
    header_rows: Selector,
    cells: Selector,
    tips: Vec<Selector>,
    race_number: Regex,
}

impl CardParser {
    pub fn new() -> Result<Self, ScraperError> {
        let tips = (1..=TIP_COUNT)
            .map(|k| {
                selector(&format!(
                    "tbody tr.fieldsTableRow.raceTipsRow div > span:nth-of-type({})",
                    k
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            listing_links: selector("tbody > tr > td:nth-child(2) > a")?,
            title: selector("div > h1.title")?,
            header_rows: selector("tr#tableHeader")?,
            cells: selector("td")?,
            tips,
            race_number: Regex::new(r"^(.).*?(\d+)$")
                .map_err(|e| ScraperError::ParseError(e.to_string()))?,
        })
    }

    /// Shorten a race label to its first character and trailing digits
    ///
    /// "Race 1" becomes "R1"; labels without trailing digits are kept.
    pub fn normalize_race_number(&self, label: &str) -> String {
        let label = label.trim();
        match self.race_number.captures(label) {
            Some(caps) => format!("{}{}", &caps[1], &caps[2]),
            None => label.to_string(),
        }
    }

    /// Absolute URLs of every form guide linked from the listing page
    pub fn parse_listing(&self, html: &str, base: &str) -> Vec<String> {
        let document = Html::parse_document(html);

        document
            .select(&self.listing_links)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| {
                if href.starts_with("http://") || href.starts_with("https://") {
                    href.to_string()
                } else {
                    format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
                }
            })
            .collect()
    }

    /// Parse one form guide into its raw parallel sequences
    ///
    /// `year` completes the date in the title, which only carries day and
    /// month.
    pub fn parse_card_page(&self, html: &str, year: i32) -> Result<RaceCardField, ScraperError> {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(element_text)
            .ok_or_else(|| ScraperError::ParseError("form guide has no title".to_string()))?;

        let track = title.split_whitespace().next().unwrap_or("").to_string();
        let date = match title.split_once('-') {
            Some((_, rest)) => card_date(rest.trim(), year),
            None => year.to_string(),
        };

        let mut race_numbers = Vec::new();
        let mut distances = Vec::new();
        let mut grades = Vec::new();

        for row in document.select(&self.header_rows) {
            let cells: Vec<String> = row.select(&self.cells).map(element_text).collect();
            let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();

            race_numbers.push(self.normalize_race_number(&cell(0)));
            distances.push(cell(2));
            grades.push(cell(3));
        }

        let tips = self
            .tips
            .iter()
            .map(|sel| {
                document
                    .select(sel)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<String>>()
            })
            .collect();

        Ok(RaceCardField {
            date,
            track,
            race_numbers,
            distances,
            grades,
            tips,
        })
    }
}
