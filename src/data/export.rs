//! CSV export
//!
//! Every table converts to a polars `DataFrame` with a fixed column layout
//! and is written as UTF-8 CSV with a BOM, a header row and two-decimal
//! floats.

use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::consolidate::ConsolidatedTable;
use super::feed_loader::FeedBatch;
use super::price_table::PriceTable;
use super::race_card::RunnerCardTable;
use crate::core::{rank_favourites, OddsBand};
use crate::models::{RaceSummary, TIP_COUNT};

pub const FEED_FILE_NAME: &str = "Betfair.csv";
pub const PRICES_FILE_NAME: &str = "Betfair_processed.csv";
pub const CARDS_FILE_NAME: &str = "Greyhound.csv";
pub const CONSOLIDATED_FILE_NAME: &str = "Consolidated_output.csv";

/// A table that can be exported as CSV
pub trait TableExport {
    /// Default artifact name
    fn file_name(&self) -> &'static str;

    fn to_dataframe(&self) -> PolarsResult<DataFrame>;

    fn csv_bytes(&self) -> PolarsResult<Vec<u8>> {
        let mut df = self.to_dataframe()?;
        to_csv_bytes(&mut df)
    }

    fn export(&self, path: &Path) -> PolarsResult<()> {
        let mut df = self.to_dataframe()?;
        export_csv(&mut df, path)
    }
}

/// Write a frame as CSV: BOM, header, no index, floats to 2 dp
pub fn write_csv<W: Write>(df: &mut DataFrame, writer: W) -> PolarsResult<()> {
    CsvWriter::new(writer)
        .include_bom(true)
        .include_header(true)
        .with_float_precision(Some(2))
        .finish(df)
}

pub fn to_csv_bytes(df: &mut DataFrame) -> PolarsResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(df, &mut buf)?;
    Ok(buf)
}

pub fn export_csv<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> PolarsResult<()> {
    let file = File::create(path.as_ref())?;
    write_csv(df, file)?;
    tracing::info!(
        "Exported {} rows to {}",
        df.height(),
        path.as_ref().display()
    );
    Ok(())
}

fn blank(name: &str, height: usize) -> Series {
    Series::new(name.into(), vec![""; height])
}

fn band_series(name: String, bands: impl Iterator<Item = OddsBand>) -> Series {
    let labels: Vec<&str> = bands.map(|b| b.label()).collect();
    Series::new(name.into(), labels)
}

fn text_column<'a>(
    races: &[&'a RaceSummary],
    field: fn(&'a RaceSummary) -> Option<&'a str>,
    zero_fill: bool,
) -> Vec<Option<&'a str>> {
    races
        .iter()
        .map(|r| field(*r).or(zero_fill.then_some("0")))
        .collect()
}

/// Columns shared by the price table and the consolidated table
///
/// `zero_fill` writes missing values as zeros instead of nulls, and
/// `spacer` inserts `Blank_1` between `Win Trap` and `Win BSP`.
fn race_columns<'a>(
    races: &[&'a RaceSummary],
    traps: &BTreeSet<u8>,
    zero_fill: bool,
    spacer: bool,
) -> Vec<Series> {
    let height = races.len();

    let mut columns = vec![
        Series::new(
            "EVENT_ID".into(),
            races.iter().map(|r| r.event_id).collect::<Vec<i64>>(),
        ),
        Series::new(
            "Date".into(),
            races.iter().map(|r| r.date.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "Time".into(),
            races.iter().map(|r| r.time.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "Year".into(),
            races.iter().map(|r| r.year).collect::<Vec<i32>>(),
        ),
        Series::new(
            "Month".into(),
            races.iter().map(|r| r.month.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "Track".into(),
            text_column(races, |r| r.track.as_deref(), zero_fill),
        ),
        Series::new(
            "#".into(),
            text_column(races, |r| r.race_number.as_deref(), zero_fill),
        ),
        Series::new(
            "Distance".into(),
            text_column(races, |r| r.distance.as_deref(), zero_fill),
        ),
        Series::new(
            "Betfair Grade".into(),
            text_column(races, |r| r.grade.as_deref(), zero_fill),
        ),
        Series::new(
            "Runners".into(),
            races.iter().map(|r| r.runners as u64).collect::<Vec<u64>>(),
        ),
    ];

    let win_trap: Vec<Option<i64>> = races
        .iter()
        .map(|r| r.win_trap.map(i64::from).or(zero_fill.then_some(0)))
        .collect();
    let win_bsp: Vec<Option<f64>> = races
        .iter()
        .map(|r| r.win_bsp.or(zero_fill.then_some(0.0)))
        .collect();
    columns.push(Series::new("Win Trap".into(), win_trap));
    if spacer {
        columns.push(blank("Blank_1", height));
    }
    columns.push(Series::new("Win BSP".into(), win_bsp));

    for &trap in traps {
        let prices: Vec<f64> = races.iter().map(|r| r.trap_price(trap)).collect();
        columns.push(Series::new(trap.to_string().into(), prices));
    }
    // Band columns are numbered by position, not by trap
    for (i, &trap) in traps.iter().enumerate() {
        columns.push(band_series(
            format!("Trap{} Odds Band", i + 1),
            races.iter().map(|r| r.trap_band(trap)),
        ));
    }

    columns.push(blank("Blank_2", height));

    let favourites: Vec<Vec<f64>> = races
        .iter()
        .map(|r| rank_favourites(&r.prices.row(traps)))
        .collect();
    for k in 0..traps.len() {
        let prices: Vec<f64> = favourites.iter().map(|f| f[k]).collect();
        columns.push(Series::new(format!("Fav{}", k + 1).into(), prices));
    }
    for k in 0..traps.len() {
        columns.push(band_series(
            format!("Fav{} Odds Band", k + 1),
            favourites.iter().map(|f| OddsBand::from_price(f[k])),
        ));
    }

    columns.push(blank("Blank_3", height));
    columns
}

impl TableExport for FeedBatch {
    fn file_name(&self) -> &'static str {
        FEED_FILE_NAME
    }

    fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        Ok(self.frame.clone())
    }
}

impl TableExport for PriceTable {
    fn file_name(&self) -> &'static str {
        PRICES_FILE_NAME
    }

    fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let races: Vec<&RaceSummary> = self.races.iter().collect();
        DataFrame::new(race_columns(&races, &self.traps, false, false))
    }
}

impl TableExport for RunnerCardTable {
    fn file_name(&self) -> &'static str {
        CARDS_FILE_NAME
    }

    fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns = vec![
            Series::new(
                "#".into(),
                self.rows.iter().map(|r| r.race_number.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                "Distance".into(),
                self.rows.iter().map(|r| r.distance.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                "TGR Grade".into(),
                self.rows.iter().map(|r| r.grade.as_str()).collect::<Vec<_>>(),
            ),
        ];

        for k in 0..TIP_COUNT {
            let tips: Vec<Option<i64>> = self
                .rows
                .iter()
                .map(|r| r.tips[k].map(i64::from))
                .collect();
            columns.push(Series::new(format!("TGR{}", k + 1).into(), tips));
        }

        DataFrame::new(columns)
    }
}

impl TableExport for ConsolidatedTable {
    fn file_name(&self) -> &'static str {
        CONSOLIDATED_FILE_NAME
    }

    fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let races: Vec<&RaceSummary> = self.rows.iter().map(|r| &r.summary).collect();
        let mut columns = race_columns(&races, &self.traps, true, true);

        let grades: Vec<&str> = self
            .rows
            .iter()
            .map(|r| r.card.as_ref().map(|c| c.grade.as_str()).unwrap_or("0"))
            .collect();
        columns.push(Series::new("TGR Grade".into(), grades));

        for k in 0..TIP_COUNT {
            let tips: Vec<i64> = self
                .rows
                .iter()
                .map(|r| {
                    r.card
                        .as_ref()
                        .and_then(|c| c.tips[k])
                        .map(i64::from)
                        .unwrap_or(0)
                })
                .collect();
            columns.push(Series::new(format!("TGR{}", k + 1).into(), tips));
        }
        for k in 0..TIP_COUNT {
            let prices: Vec<f64> = self
                .rows
                .iter()
                .map(|r| r.tip_prices[k].unwrap_or(0.0))
                .collect();
            columns.push(Series::new(format!("TGR{} BSP", k + 1).into(), prices));
        }
        for k in 0..TIP_COUNT {
            columns.push(band_series(
                format!("TGR{} Odds Band", k + 1),
                self.rows.iter().map(|r| r.tip_bands[k]),
            ));
        }

        DataFrame::new(columns)
    }
}
