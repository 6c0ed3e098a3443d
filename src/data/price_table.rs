//! BSP feed normalisation
//!
//! Filters the feed to one country, collapses runner rows to one summary per
//! race, finds the winner and pivots runner prices into per-trap prices.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::feed_loader::FeedBatch;
use crate::core::{round2, OddsBand};
use crate::error::StageError;
use crate::models::{PriceRecord, RaceSummary, TrapPrices};

/// Notice when the feed stage produced nothing
pub const NO_DATE_SELECTED: &str = "No date selected yet";

/// One priced runner, the input of the trap pivot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapRow {
    pub event_id: i64,
    pub trap: u8,
    pub bsp: Option<f64>,
}

/// Result of pivoting runner prices by trap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrapPivot {
    /// Every trap number that carried a price anywhere in the batch
    pub traps: BTreeSet<u8>,
    pub prices: HashMap<i64, TrapPrices>,
}

/// Normalised races for one feed day
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    pub country: String,
    /// Union of trap numbers across all races; one price column each
    pub traps: BTreeSet<u8>,
    /// One summary per event, in feed order
    pub races: Vec<RaceSummary>,
}

impl PriceTable {
    pub fn len(&self) -> usize {
        self.races.len()
    }

    pub fn is_empty(&self) -> bool {
        self.races.is_empty()
    }

    pub fn get(&self, event_id: i64) -> Option<&RaceSummary> {
        self.races.iter().find(|r| r.event_id == event_id)
    }

    /// Zero-filled trap prices, one row per race and one column per trap
    pub fn trap_matrix(&self) -> Vec<Vec<f64>> {
        self.races.iter().map(|r| r.prices.row(&self.traps)).collect()
    }

    /// Odds band of every trap column for a race
    pub fn trap_bands(&self, race: &RaceSummary) -> Vec<OddsBand> {
        self.traps.iter().map(|&t| race.trap_band(t)).collect()
    }

    /// Fav1..FavN prices for a race, N = number of trap columns
    pub fn favourites(&self, race: &RaceSummary) -> Vec<f64> {
        race.favourites(&self.traps)
    }

    pub fn favourite_bands(&self, race: &RaceSummary) -> Vec<OddsBand> {
        self.favourites(race)
            .into_iter()
            .map(OddsBand::from_price)
            .collect()
    }

    /// Re-derive runner rows from the pivoted prices
    pub fn to_trap_rows(&self) -> Vec<TrapRow> {
        self.races
            .iter()
            .flat_map(|race| {
                race.prices.iter().map(move |(trap, price)| TrapRow {
                    event_id: race.event_id,
                    trap,
                    bsp: Some(price),
                })
            })
            .collect()
    }
}

/// Trap number from a runner name such as "3. Some Dog"
pub fn parse_trap(selection_name: &str) -> Option<u8> {
    selection_name.split('.').next()?.trim().parse::<u8>().ok()
}

/// Whitespace token at `idx`
fn token(text: &str, idx: usize) -> Option<String> {
    text.split_whitespace().nth(idx).map(|s| s.to_string())
}

/// Pivot runner prices into per-race trap prices
///
/// Multiple rows for one (event, trap) are averaged; rows without a price
/// are ignored. Prices are rounded to 2 decimal places.
pub fn pivot_trap_prices(rows: &[TrapRow]) -> TrapPivot {
    let mut sums: HashMap<(i64, u8), (f64, usize)> = HashMap::new();

    for row in rows {
        let Some(bsp) = row.bsp.filter(|p| !p.is_nan()) else {
            continue;
        };
        let entry = sums.entry((row.event_id, row.trap)).or_insert((0.0, 0));
        entry.0 += bsp;
        entry.1 += 1;
    }

    let mut pivot = TrapPivot::default();
    for ((event_id, trap), (sum, count)) in sums {
        pivot.traps.insert(trap);
        pivot
            .prices
            .entry(event_id)
            .or_default()
            .insert(trap, round2(sum / count as f64));
    }

    pivot
}

/// Per-event accumulator; field values follow the last row seen
struct RaceAccumulator<'a> {
    last: &'a PriceRecord,
    track: Option<String>,
    race_number: Option<String>,
    distance: Option<String>,
    grade: Option<String>,
    selections: HashSet<i64>,
    winner: Option<(u8, Option<f64>)>,
    winners: usize,
}

impl<'a> RaceAccumulator<'a> {
    fn new(record: &'a PriceRecord) -> Self {
        Self {
            last: record,
            track: None,
            race_number: None,
            distance: None,
            grade: None,
            selections: HashSet::new(),
            winner: None,
            winners: 0,
        }
    }

    fn push(&mut self, record: &'a PriceRecord, trap: u8) {
        self.last = record;
        self.track = token(&record.menu_hint, 2).or(self.track.take());
        self.race_number = token(&record.event_name, 0).or(self.race_number.take());
        self.distance = token(&record.event_name, 1).or(self.distance.take());
        self.grade = token(&record.event_name, 2).or(self.grade.take());
        self.selections.insert(record.selection_id);

        if record.win_lose == 1 {
            self.winners += 1;
            if self.winner.is_none() {
                self.winner = Some((trap, record.bsp.map(round2)));
            }
        }
    }

    fn finish(self, event_id: i64, prices: TrapPrices) -> RaceSummary {
        if self.winners > 1 {
            tracing::warn!(
                "Event {} has {} winners, keeping the first",
                event_id,
                self.winners
            );
        }

        let calendar = &self.last.calendar;
        RaceSummary {
            event_id,
            date: calendar.date.clone(),
            time: calendar.time.clone(),
            year: calendar.year,
            month: calendar.month.clone(),
            track: self.track,
            race_number: self.race_number,
            distance: self.distance,
            grade: self.grade,
            runners: self.selections.len(),
            win_trap: self.winner.map(|(trap, _)| trap),
            win_bsp: self.winner.and_then(|(_, bsp)| bsp),
            prices,
        }
    }
}

/// Normalise a feed batch into one summary per race
///
/// A missing batch (the feed stage failed) yields `NoData`; a runner name
/// without a numeric trap prefix makes the whole batch `MalformedInput`.
pub fn normalize_prices(
    batch: Option<&FeedBatch>,
    country: &str,
) -> Result<PriceTable, StageError> {
    let batch = batch.ok_or_else(|| StageError::NoData(NO_DATE_SELECTED.to_string()))?;

    let rows: Vec<&PriceRecord> = batch
        .records
        .iter()
        .filter(|r| r.menu_hint.starts_with(country))
        .collect();

    if rows.is_empty() {
        return Err(StageError::NoData(format!(
            "No {} races in the feed for {}",
            country, batch.date
        )));
    }

    let mut trap_rows = Vec::with_capacity(rows.len());
    let mut order: Vec<i64> = Vec::new();
    let mut races: HashMap<i64, RaceAccumulator> = HashMap::new();

    for record in rows {
        let trap = parse_trap(&record.selection_name).ok_or_else(|| {
            StageError::MalformedInput(format!(
                "cannot read a trap number from runner {:?}",
                record.selection_name
            ))
        })?;

        trap_rows.push(TrapRow {
            event_id: record.event_id,
            trap,
            bsp: record.bsp,
        });

        races
            .entry(record.event_id)
            .or_insert_with(|| {
                order.push(record.event_id);
                RaceAccumulator::new(record)
            })
            .push(record, trap);
    }

    let mut pivot = pivot_trap_prices(&trap_rows);

    let summaries: Vec<RaceSummary> = order
        .into_iter()
        .filter_map(|event_id| {
            let acc = races.remove(&event_id)?;
            let prices = pivot.prices.remove(&event_id).unwrap_or_default();
            Some(acc.finish(event_id, prices))
        })
        .collect();

    tracing::info!(
        "Normalized {} {} races across {} traps",
        summaries.len(),
        country,
        pivot.traps.len()
    );

    Ok(PriceTable {
        country: country.to_string(),
        traps: pivot.traps,
        races: summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalendarFields;
    use chrono::NaiveDate;
    use polars::prelude::DataFrame;

    fn record(
        event_id: i64,
        menu_hint: &str,
        event_name: &str,
        selection_id: i64,
        selection_name: &str,
        win_lose: i64,
        bsp: Option<f64>,
    ) -> PriceRecord {
        PriceRecord {
            event_id,
            menu_hint: menu_hint.to_string(),
            event_name: event_name.to_string(),
            event_dt: "17-10-2026 11:52".to_string(),
            selection_id,
            selection_name: selection_name.to_string(),
            win_lose,
            bsp,
            calendar: CalendarFields {
                date: "17/10/2026".to_string(),
                time: "11:52".to_string(),
                year: 2026,
                month: "Oct".to_string(),
            },
        }
    }

    fn batch(records: Vec<PriceRecord>) -> FeedBatch {
        FeedBatch {
            date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            url: "test".to_string(),
            frame: DataFrame::default(),
            records,
        }
    }

    const SALE: &str = "AUS / Sale (AUS) 17th Oct";

    fn sample_batch() -> FeedBatch {
        batch(vec![
            record(1, SALE, "R1 515m Gr5", 11, "1. Alpha", 1, Some(2.4)),
            record(1, SALE, "R1 515m Gr5", 12, "2. Bravo", 0, Some(3.456)),
            record(1, SALE, "R1 515m Gr5", 13, "4. Delta", 0, Some(12.0)),
            record(2, SALE, "R2 520m Mdn", 21, "1. Echo", 0, Some(1.9)),
            record(2, SALE, "R2 520m Mdn", 22, "3. Foxtrot", 1, Some(4.0)),
            record(3, "GB / Romford 17th Oct", "A1 400m", 31, "1. Golf", 1, Some(2.0)),
        ])
    }

    #[test]
    fn test_parse_trap() {
        assert_eq!(parse_trap("1. Fast Dog"), Some(1));
        assert_eq!(parse_trap("10. Reserve"), Some(10));
        assert_eq!(parse_trap("Fast Dog"), None);
    }

    #[test]
    fn test_missing_batch_is_no_data() {
        let err = normalize_prices(None, "AUS").unwrap_err();
        assert_eq!(err, StageError::NoData(NO_DATE_SELECTED.to_string()));
    }

    #[test]
    fn test_filters_country() {
        let table = normalize_prices(Some(&sample_batch()), "AUS").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_no_rows_for_country() {
        let err = normalize_prices(Some(&sample_batch()), "NZL").unwrap_err();
        assert!(matches!(err, StageError::NoData(_)));
    }

    #[test]
    fn test_summary_fields() {
        let table = normalize_prices(Some(&sample_batch()), "AUS").unwrap();
        let race = &table.races[0];
        assert_eq!(race.event_id, 1);
        assert_eq!(race.track.as_deref(), Some("Sale"));
        assert_eq!(race.race_number.as_deref(), Some("R1"));
        assert_eq!(race.distance.as_deref(), Some("515m"));
        assert_eq!(race.grade.as_deref(), Some("Gr5"));
        assert_eq!(race.runners, 3);
        assert_eq!(race.win_trap, Some(1));
        assert_eq!(race.win_bsp, Some(2.4));
        assert_eq!(race.month, "Oct");
    }

    #[test]
    fn test_preserves_feed_order() {
        let mut records = sample_batch().records;
        records.rotate_left(3); // race 2 rows first
        let table = normalize_prices(Some(&batch(records)), "AUS").unwrap();
        assert_eq!(table.races[0].event_id, 2);
        assert_eq!(table.races[1].event_id, 1);
    }

    #[test]
    fn test_trap_union_and_zero_fill() {
        let table = normalize_prices(Some(&sample_batch()), "AUS").unwrap();
        let traps: Vec<u8> = table.traps.iter().copied().collect();
        assert_eq!(traps, vec![1, 2, 3, 4]);

        let matrix = table.trap_matrix();
        assert_eq!(matrix[0], vec![2.4, 3.46, 0.0, 12.0]);
        assert_eq!(matrix[1], vec![1.9, 0.0, 4.0, 0.0]);

        // Sparse view keeps "did not run" distinct from a price
        assert_eq!(table.races[1].prices.get(2), None);
    }

    #[test]
    fn test_no_winner_leaves_fields_absent() {
        let records = vec![
            record(7, SALE, "R3 515m Gr5", 1, "1. A", 0, Some(2.0)),
            record(7, SALE, "R3 515m Gr5", 2, "2. B", 0, Some(3.0)),
        ];
        let table = normalize_prices(Some(&batch(records)), "AUS").unwrap();
        assert_eq!(table.races[0].win_trap, None);
        assert_eq!(table.races[0].win_bsp, None);
    }

    #[test]
    fn test_unreadable_trap_is_malformed() {
        let records = vec![record(7, SALE, "R3 515m Gr5", 1, "Mystery", 1, Some(2.0))];
        let err = normalize_prices(Some(&batch(records)), "AUS").unwrap_err();
        assert!(matches!(err, StageError::MalformedInput(_)));
    }

    #[test]
    fn test_runner_count_is_distinct() {
        let records = vec![
            record(7, SALE, "R3 515m Gr5", 1, "1. A", 0, Some(2.0)),
            record(7, SALE, "R3 515m Gr5", 1, "1. A", 0, Some(4.0)),
            record(7, SALE, "R3 515m Gr5", 2, "2. B", 1, None),
        ];
        let table = normalize_prices(Some(&batch(records)), "AUS").unwrap();
        let race = &table.races[0];
        assert_eq!(race.runners, 2);
        // Duplicate rows are averaged, missing prices ignored
        assert_eq!(race.prices.get(1), Some(3.0));
        assert_eq!(race.prices.get(2), None);
        assert_eq!(race.win_trap, Some(2));
        assert_eq!(race.win_bsp, None);
    }

    #[test]
    fn test_pivot_is_idempotent() {
        let table = normalize_prices(Some(&sample_batch()), "AUS").unwrap();
        let repivot = pivot_trap_prices(&table.to_trap_rows());

        assert_eq!(repivot.traps, table.traps);
        for race in &table.races {
            assert_eq!(repivot.prices.get(&race.event_id), Some(&race.prices));
        }
    }

    #[test]
    fn test_bands_and_favourites() {
        let table = normalize_prices(Some(&sample_batch()), "AUS").unwrap();
        let race = &table.races[1];

        let bands: Vec<&str> = table.trap_bands(race).iter().map(|b| b.label()).collect();
        assert_eq!(bands, vec!["1.8 – 1.99", "0.00", "4.0 – 4.99", "0.00"]);

        assert_eq!(table.favourites(race), vec![1.9, 4.0, 0.0, 0.0]);
        let fav_bands: Vec<&str> = table
            .favourite_bands(race)
            .iter()
            .map(|b| b.label())
            .collect();
        assert_eq!(fav_bands, vec!["1.8 – 1.99", "4.0 – 4.99", "0.00", "0.00"]);
    }
}
