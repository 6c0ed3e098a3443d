use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::{rank_favourites, OddsBand};

/// Number of ranked tips on a race card (TGR1..TGR4)
pub const TIP_COUNT: usize = 4;

/// Calendar fields derived from a feed timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarFields {
    /// dd/mm/yyyy
    pub date: String,
    pub time: String,
    pub year: i32,
    /// Abbreviated month name (Jan..Dec)
    pub month: String,
}

/// One runner-in-race row from the BSP feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub event_id: i64,
    /// Country / track hint, e.g. "AUS / Sale (AUS) 17th Oct"
    pub menu_hint: String,
    /// Race number, distance and grade, e.g. "R1 515m Gr5"
    pub event_name: String,
    pub event_dt: String,
    pub selection_id: i64,
    /// Trap-prefixed runner name, e.g. "1. Fast Dog"
    pub selection_name: String,
    pub win_lose: i64,
    pub bsp: Option<f64>,
    pub calendar: CalendarFields,
}

/// Trap number -> price for one race
///
/// Only traps that actually ran (and have a price) are stored; `get` returns
/// `None` for the rest while `price_or_zero` gives the zero-filled view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapPrices(BTreeMap<u8, f64>);

impl TrapPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trap: u8, price: f64) {
        self.0.insert(trap, price);
    }

    pub fn get(&self, trap: u8) -> Option<f64> {
        self.0.get(&trap).copied()
    }

    pub fn price_or_zero(&self, trap: u8) -> f64 {
        self.get(trap).unwrap_or(0.0)
    }

    pub fn traps(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, f64)> + '_ {
        self.0.iter().map(|(&t, &p)| (t, p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero-filled prices over a trap set, in ascending trap order
    pub fn row(&self, traps: &BTreeSet<u8>) -> Vec<f64> {
        traps.iter().map(|&t| self.price_or_zero(t)).collect()
    }
}

impl FromIterator<(u8, f64)> for TrapPrices {
    fn from_iter<I: IntoIterator<Item = (u8, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One race from the BSP feed after normalisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSummary {
    pub event_id: i64,
    pub date: String,
    pub time: String,
    pub year: i32,
    pub month: String,
    pub track: Option<String>,
    /// Race number token (`#`), the join key against race cards
    pub race_number: Option<String>,
    pub distance: Option<String>,
    pub grade: Option<String>,
    pub runners: usize,
    pub win_trap: Option<u8>,
    pub win_bsp: Option<f64>,
    pub prices: TrapPrices,
}

impl RaceSummary {
    /// Price of a trap, 0.0 when it did not run
    pub fn trap_price(&self, trap: u8) -> f64 {
        self.prices.price_or_zero(trap)
    }

    pub fn trap_band(&self, trap: u8) -> OddsBand {
        OddsBand::from_price(self.trap_price(trap))
    }

    /// Zero-indexed price lookup vector
    ///
    /// Index 0 is a 0.00 sentinel (no tip); indices 1..=N are this race's
    /// prices over `traps` in ascending trap order.
    pub fn price_vector(&self, traps: &BTreeSet<u8>) -> Vec<f64> {
        let mut vector = Vec::with_capacity(traps.len() + 1);
        vector.push(0.0);
        vector.extend(self.prices.row(traps));
        vector
    }

    /// Trap prices sorted shortest first, zeros last
    pub fn favourites(&self, traps: &BTreeSet<u8>) -> Vec<f64> {
        rank_favourites(&self.prices.row(traps))
    }
}

/// Raw fields scraped from one race-card page
///
/// Every sequence is parallel: element i of each belongs to the same race.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceCardField {
    pub date: String,
    pub track: String,
    #[serde(default)]
    pub race_numbers: Vec<String>,
    #[serde(default)]
    pub distances: Vec<String>,
    #[serde(default)]
    pub grades: Vec<String>,
    /// TGR1..TGR4, each a sequence of trap numbers as text
    #[serde(default)]
    pub tips: Vec<Vec<String>>,
}

/// One exploded race-card row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerCardRow {
    pub race_number: String,
    pub distance: String,
    pub grade: String,
    /// TGR1..TGR4 trap numbers; `None` when the tip was not numeric
    pub tips: [Option<u8>; TIP_COUNT],
}

/// A race summary joined with its race-card tips
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedRow {
    pub summary: RaceSummary,
    /// `None` when no card row matched the race number
    pub card: Option<RunnerCardRow>,
    /// TGR1..TGR4 BSP; `None` when there is no tip or it points nowhere
    pub tip_prices: [Option<f64>; TIP_COUNT],
    pub tip_bands: [OddsBand; TIP_COUNT],
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cached_tables: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(prices: &[(u8, f64)]) -> RaceSummary {
        RaceSummary {
            event_id: 1,
            date: "17/10/2026".to_string(),
            time: "11:52".to_string(),
            year: 2026,
            month: "Oct".to_string(),
            track: Some("Sale".to_string()),
            race_number: Some("R1".to_string()),
            distance: Some("515m".to_string()),
            grade: Some("Gr5".to_string()),
            runners: prices.len(),
            win_trap: None,
            win_bsp: None,
            prices: prices.iter().copied().collect(),
        }
    }

    #[test]
    fn test_trap_prices_missing_vs_zero() {
        let prices: TrapPrices = [(1, 2.5), (3, 6.0)].into_iter().collect();
        assert_eq!(prices.get(2), None);
        assert_eq!(prices.price_or_zero(2), 0.0);
        assert_eq!(prices.get(3), Some(6.0));
    }

    #[test]
    fn test_price_vector_has_sentinel() {
        let race = summary(&[(1, 2.5), (2, 4.0), (3, 6.0)]);
        let traps: BTreeSet<u8> = [1, 2, 3].into_iter().collect();
        assert_eq!(race.price_vector(&traps), vec![0.0, 2.5, 4.0, 6.0]);
    }

    #[test]
    fn test_price_vector_zero_fills_union() {
        let race = summary(&[(1, 2.5)]);
        let traps: BTreeSet<u8> = [1, 2].into_iter().collect();
        assert_eq!(race.price_vector(&traps), vec![0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_favourites() {
        let race = summary(&[(2, 3.0), (3, 1.5), (5, 8.0)]);
        let traps: BTreeSet<u8> = [1, 2, 3, 4, 5].into_iter().collect();
        assert_eq!(race.favourites(&traps), vec![1.5, 3.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn test_race_card_field_defaults_from_json() {
        let json = r#"{"date": "17/10/2026", "track": "Sale"}"#;
        let field: RaceCardField = serde_json::from_str(json).unwrap();
        assert!(field.tips.is_empty());
        assert!(field.race_numbers.is_empty());
    }
}
