//! Betfair BSP feed loading
//!
//! Downloads the dated greyhound win-market CSV and decorates every row with
//! calendar fields parsed from its event timestamp.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::io::Cursor;
use std::sync::Arc;

use crate::error::StageError;
use crate::models::{CalendarFields, PriceRecord};

/// Columns the normalizer relies on
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "EVENT_ID",
    "MENU_HINT",
    "EVENT_NAME",
    "EVENT_DT",
    "SELECTION_ID",
    "SELECTION_NAME",
    "WIN_LOSE",
    "BSP",
];

/// Pinned dtypes of the columns we read; inference alone can pick `i64`
/// for BSP when the first rows hold whole prices
fn feed_schema() -> Schema {
    Schema::from_iter([
        Field::new("EVENT_ID".into(), DataType::Int64),
        Field::new("MENU_HINT".into(), DataType::String),
        Field::new("EVENT_NAME".into(), DataType::String),
        Field::new("EVENT_DT".into(), DataType::String),
        Field::new("SELECTION_ID".into(), DataType::Int64),
        Field::new("SELECTION_NAME".into(), DataType::String),
        Field::new("WIN_LOSE".into(), DataType::Int64),
        Field::new("BSP".into(), DataType::Float64),
    ])
}

/// Timestamp layouts seen in the feed
const TIMESTAMP_FORMATS: [&str; 6] = [
    "%d-%m-%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

/// One day of feed data
#[derive(Debug, Clone)]
pub struct FeedBatch {
    pub date: NaiveDate,
    pub url: String,
    /// Raw feed columns plus DATE, Time, Year and Month
    pub frame: DataFrame,
    pub records: Vec<PriceRecord>,
}

impl FeedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Build the feed URL: `{base}{DDMMYYYY}.csv`
pub fn feed_url(base: &str, date: NaiveDate) -> String {
    format!("{}{}.csv", base, date.format("%d%m%Y"))
}

/// Reject dates after today; the archive has nothing for them yet
pub fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), StageError> {
    if date > today {
        return Err(StageError::InvalidDate {
            requested: date,
            today,
        });
    }
    Ok(())
}

/// Derive calendar fields from an EVENT_DT value
pub fn derive_calendar(event_dt: &str) -> Option<CalendarFields> {
    let trimmed = event_dt.trim();
    let parsed = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())?;

    Some(CalendarFields {
        date: parsed.format("%d/%m/%Y").to_string(),
        time: trimmed.split_whitespace().nth(1).unwrap_or("").to_string(),
        year: parsed.year(),
        month: parsed.format("%b").to_string(),
    })
}

/// Parse feed CSV bytes into the raw frame and typed records
///
/// Columns outside `REQUIRED_COLUMNS` are inferred over the whole file.
pub fn parse_feed_csv(bytes: &[u8]) -> Result<(DataFrame, Vec<PriceRecord>), StageError> {
    let header = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    let header = String::from_utf8_lossy(header);
    let columns: Vec<&str> = header
        .trim_start_matches('\u{feff}')
        .split(',')
        .map(|c| c.trim().trim_matches('"'))
        .collect();

    for name in REQUIRED_COLUMNS {
        if !columns.contains(&name) {
            return Err(StageError::MalformedInput(format!(
                "feed is missing column {}",
                name
            )));
        }
    }

    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(Some(Arc::new(feed_schema())))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()?;

    let records = dataframe_to_records(&df)?;

    let dates: Vec<&str> = records.iter().map(|r| r.calendar.date.as_str()).collect();
    let times: Vec<&str> = records.iter().map(|r| r.calendar.time.as_str()).collect();
    let years: Vec<i32> = records.iter().map(|r| r.calendar.year).collect();
    let months: Vec<&str> = records.iter().map(|r| r.calendar.month.as_str()).collect();

    df.with_column(Series::new("DATE".into(), dates))?;
    df.with_column(Series::new("Time".into(), times))?;
    df.with_column(Series::new("Year".into(), years))?;
    df.with_column(Series::new("Month".into(), months))?;

    Ok((df, records))
}

/// Convert feed rows to PriceRecords
fn dataframe_to_records(df: &DataFrame) -> Result<Vec<PriceRecord>, StageError> {
    let mut records = Vec::with_capacity(df.height());

    // Cast so integer-looking prices or quoted ids still read cleanly
    let event_id_col = df.column("EVENT_ID")?.cast(&DataType::Int64)?;
    let menu_hint_col = df.column("MENU_HINT")?.cast(&DataType::String)?;
    let event_name_col = df.column("EVENT_NAME")?.cast(&DataType::String)?;
    let event_dt_col = df.column("EVENT_DT")?.cast(&DataType::String)?;
    let selection_id_col = df.column("SELECTION_ID")?.cast(&DataType::Int64)?;
    let selection_name_col = df.column("SELECTION_NAME")?.cast(&DataType::String)?;
    let win_lose_col = df.column("WIN_LOSE")?.cast(&DataType::Int64)?;
    let bsp_col = df.column("BSP")?.cast(&DataType::Float64)?;

    let event_id = event_id_col.i64()?;
    let menu_hint = menu_hint_col.str()?;
    let event_name = event_name_col.str()?;
    let event_dt = event_dt_col.str()?;
    let selection_id = selection_id_col.i64()?;
    let selection_name = selection_name_col.str()?;
    let win_lose = win_lose_col.i64()?;
    let bsp = bsp_col.f64()?;

    for i in 0..df.height() {
        let (Some(event_id), Some(selection_id)) = (event_id.get(i), selection_id.get(i)) else {
            return Err(StageError::MalformedInput(format!(
                "feed row {} has no EVENT_ID or SELECTION_ID",
                i + 1
            )));
        };

        let event_dt = event_dt.get(i).unwrap_or("");
        let calendar = derive_calendar(event_dt).ok_or_else(|| {
            StageError::MalformedInput(format!(
                "feed row {} has an unreadable EVENT_DT: {:?}",
                i + 1,
                event_dt
            ))
        })?;

        records.push(PriceRecord {
            event_id,
            menu_hint: menu_hint.get(i).unwrap_or("").to_string(),
            event_name: event_name.get(i).unwrap_or("").to_string(),
            event_dt: event_dt.to_string(),
            selection_id,
            selection_name: selection_name.get(i).unwrap_or("").to_string(),
            win_lose: win_lose.get(i).unwrap_or(0),
            bsp: bsp.get(i),
            calendar,
        });
    }

    Ok(records)
}

/// Downloads the BSP feed for a date
pub struct PriceFeedLoader {
    client: reqwest::Client,
    base_url: String,
}

impl PriceFeedLoader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch and parse the feed for `date`
    ///
    /// No retries: a transport failure or non-success status is returned as
    /// `StageError::Fetch`.
    pub async fn load(&self, date: NaiveDate, today: NaiveDate) -> Result<FeedBatch, StageError> {
        validate_date(date, today)?;

        let url = feed_url(&self.base_url, date);
        tracing::info!("Fetching BSP feed: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StageError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StageError::Fetch {
                url,
                reason: format!("HTTP status {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| StageError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let (frame, records) = parse_feed_csv(&bytes)?;
        tracing::info!("Loaded {} feed rows for {}", records.len(), date);

        Ok(FeedBatch {
            date,
            url,
            frame,
            records,
        })
    }
}
