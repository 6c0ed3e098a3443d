//! Joins normalised races with race-card tips
//!
//! Each race is matched to a race-card row by race number, and every tip is
//! resolved to the BSP of the trap it names.

use std::collections::{BTreeSet, HashSet};

use super::price_table::PriceTable;
use super::race_card::RunnerCardTable;
use crate::core::{round2, OddsBand};
use crate::error::StageError;
use crate::models::{ConsolidatedRow, RaceSummary, RunnerCardRow, TIP_COUNT};

/// Notice when either input stage produced nothing
pub const NOT_SCRAPED_YET: &str =
    "No data have been scraped yet. Scrape Betfair and Greyhound data first";

/// Races joined with their tips
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedTable {
    /// Trap columns carried over from the price table
    pub traps: BTreeSet<u8>,
    pub rows: Vec<ConsolidatedRow>,
}

impl ConsolidatedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Resolve a tip through a race's price vector
///
/// Index 0 is the no-tip sentinel, so a zero tip, a missing tip or one past
/// the last trap column all resolve to no price.
pub fn resolve_tip(vector: &[f64], tip: Option<u8>) -> Option<f64> {
    let idx = tip.filter(|&t| t > 0)? as usize;
    vector.get(idx).copied().map(round2)
}

fn consolidate_race(
    race: &RaceSummary,
    card: Option<&RunnerCardRow>,
    traps: &BTreeSet<u8>,
) -> ConsolidatedRow {
    let vector = race.price_vector(traps);
    let tip_prices: [Option<f64>; TIP_COUNT] = match card {
        Some(card) => std::array::from_fn(|k| resolve_tip(&vector, card.tips[k])),
        None => [None; TIP_COUNT],
    };
    let tip_bands = tip_prices.map(OddsBand::from_optional);

    ConsolidatedRow {
        summary: race.clone(),
        card: card.cloned(),
        tip_prices,
        tip_bands,
    }
}

/// Left-join races with race-card rows on race number
///
/// Races without a matching card row are kept with no tips. When several
/// card rows share a race number the first one wins, and each event id
/// appears at most once in the output.
pub fn consolidate(
    prices: Option<&PriceTable>,
    cards: Option<&RunnerCardTable>,
) -> Result<ConsolidatedTable, StageError> {
    let (Some(prices), Some(cards)) = (prices, cards) else {
        return Err(StageError::NoData(NOT_SCRAPED_YET.to_string()));
    };

    let mut seen = HashSet::new();
    let mut unmatched = 0usize;

    let rows: Vec<ConsolidatedRow> = prices
        .races
        .iter()
        .filter(|race| seen.insert(race.event_id))
        .map(|race| {
            let card = race.race_number.as_deref().and_then(|n| cards.find(n));
            if card.is_none() {
                unmatched += 1;
            }
            consolidate_race(race, card, &prices.traps)
        })
        .collect();

    tracing::info!(
        "Consolidated {} races ({} without a race card)",
        rows.len(),
        unmatched
    );

    Ok(ConsolidatedTable {
        traps: prices.traps.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrapPrices;

    fn race(event_id: i64, race_number: &str, prices: &[(u8, f64)]) -> RaceSummary {
        RaceSummary {
            event_id,
            date: "17/10/2026".to_string(),
            time: "11:52".to_string(),
            year: 2026,
            month: "Oct".to_string(),
            track: Some("Sale".to_string()),
            race_number: Some(race_number.to_string()),
            distance: Some("515m".to_string()),
            grade: Some("Gr5".to_string()),
            runners: prices.len(),
            win_trap: Some(1),
            win_bsp: prices.first().map(|&(_, p)| p),
            prices: prices.iter().copied().collect::<TrapPrices>(),
        }
    }

    fn card(race_number: &str, tips: [Option<u8>; 4]) -> RunnerCardRow {
        RunnerCardRow {
            race_number: race_number.to_string(),
            distance: "515m".to_string(),
            grade: "Gr5".to_string(),
            tips,
        }
    }

    fn table(races: Vec<RaceSummary>) -> PriceTable {
        let traps = races.iter().flat_map(|r| r.prices.traps()).collect();
        PriceTable {
            country: "AUS".to_string(),
            traps,
            races,
        }
    }

    #[test]
    fn test_resolve_tip() {
        let vector = [0.0, 2.5, 4.0, 6.0];
        assert_eq!(resolve_tip(&vector, Some(2)), Some(4.0));
        assert_eq!(resolve_tip(&vector, Some(0)), None);
        assert_eq!(resolve_tip(&vector, None), None);
        assert_eq!(resolve_tip(&vector, Some(4)), None);
    }

    #[test]
    fn test_winner_tip_resolves_to_win_price() {
        let prices = table(vec![race(101, "R1", &[(1, 2.4), (2, 5.1)])]);
        let cards = RunnerCardTable {
            rows: vec![card("R1", [Some(1), Some(2), None, Some(0)])],
        };

        let out = consolidate(Some(&prices), Some(&cards)).unwrap();
        assert_eq!(out.len(), 1);

        let row = &out.rows[0];
        assert_eq!(row.tip_prices, [Some(2.4), Some(5.1), None, None]);
        assert_eq!(row.tip_bands[0].label(), "2.0 – 2.99");
        assert_eq!(row.tip_bands[2], OddsBand::Nil);
        assert_eq!(row.tip_prices[0], row.summary.win_bsp);
    }

    #[test]
    fn test_unmatched_race_kept_without_tips() {
        let prices = table(vec![
            race(101, "R1", &[(1, 2.4)]),
            race(102, "R2", &[(1, 3.0)]),
        ]);
        let cards = RunnerCardTable {
            rows: vec![card("R1", [Some(1), None, None, None])],
        };

        let out = consolidate(Some(&prices), Some(&cards)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.rows[1].card.is_none());
        assert_eq!(out.rows[1].tip_prices, [None; 4]);
    }

    #[test]
    fn test_first_card_row_wins_and_events_unique() {
        let prices = table(vec![
            race(101, "R1", &[(1, 2.4), (2, 5.1)]),
            race(101, "R1", &[(1, 2.4), (2, 5.1)]),
        ]);
        let cards = RunnerCardTable {
            rows: vec![
                card("R1", [Some(2), None, None, None]),
                card("R1", [Some(1), None, None, None]),
            ],
        };

        let out = consolidate(Some(&prices), Some(&cards)).unwrap();
        assert!(out.len() <= prices.len());
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0].tip_prices[0], Some(5.1));
    }

    #[test]
    fn test_tip_uses_union_order() {
        // Race 102 has no trap 1, so its vector is zero-filled at index 1
        let prices = table(vec![
            race(101, "R1", &[(1, 2.4), (2, 5.1)]),
            race(102, "R2", &[(2, 3.0), (3, 7.5)]),
        ]);
        let cards = RunnerCardTable {
            rows: vec![card("R2", [Some(3), Some(1), None, None])],
        };

        let out = consolidate(Some(&prices), Some(&cards)).unwrap();
        assert_eq!(out.rows[1].tip_prices[0], Some(7.5));
        assert_eq!(out.rows[1].tip_prices[1], Some(0.0));
        assert_eq!(out.rows[1].tip_bands[1], OddsBand::Nil);
    }

    #[test]
    fn test_missing_input_is_no_data() {
        let prices = table(vec![race(101, "R1", &[(1, 2.4)])]);
        let cards = RunnerCardTable::default();

        assert_eq!(
            consolidate(None, Some(&cards)),
            Err(StageError::NoData(NOT_SCRAPED_YET.to_string()))
        );
        assert!(consolidate(Some(&prices), None).is_err());
    }

    #[test]
    fn test_feed_and_card_page_to_consolidated_csv() {
        use crate::data::export::TableExport;
        use crate::data::feed_loader::{parse_feed_csv, FeedBatch};
        use crate::data::price_table::normalize_prices;
        use crate::data::race_card::normalize_race_cards;
        use crate::scraper::CardParser;
        use chrono::NaiveDate;

        let feed = "\
EVENT_ID,MENU_HINT,EVENT_NAME,EVENT_DT,SELECTION_ID,SELECTION_NAME,WIN_LOSE,BSP
101,AUS / Sale (AUS) 17th Oct,R1 515m Gr5,17-10-2026 11:52,9001,1. Fast Dog,1,2.4
101,AUS / Sale (AUS) 17th Oct,R1 515m Gr5,17-10-2026 11:52,9002,2. Slow Dog,0,5.0
";
        let html = r#"
<html><body>
<div><h1 class="title">Sale - Saturday 17th October</h1></div>
<table><tbody>
  <tr id="tableHeader"><td>Race 1</td><td>11:52</td><td>515m</td><td>Grade 5</td></tr>
  <tr class="fieldsTableRow raceTipsRow"><td>
    <div><span>1</span><span>2</span><span>9</span><span>0</span></div>
  </td></tr>
</tbody></table>
</body></html>
"#;

        let (frame, records) = parse_feed_csv(feed.as_bytes()).unwrap();
        let batch = FeedBatch {
            date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            url: "http://feed/test.csv".to_string(),
            frame,
            records,
        };
        let prices = normalize_prices(Some(&batch), "AUS").unwrap();

        let field = CardParser::new().unwrap().parse_card_page(html, 2026).unwrap();
        let cards = normalize_race_cards(Some(std::slice::from_ref(&field))).unwrap();

        let out = consolidate(Some(&prices), Some(&cards)).unwrap();
        assert_eq!(out.len(), 1);

        let row = &out.rows[0];
        assert_eq!(row.summary.win_trap, Some(1));
        assert_eq!(row.summary.win_bsp, Some(2.4));
        assert_eq!(row.tip_prices, [Some(2.4), Some(5.0), None, None]);
        assert_eq!(row.tip_bands[0].label(), "2.0 – 2.99");

        let csv = String::from_utf8(out.csv_bytes().unwrap()).unwrap();
        assert!(csv.contains("2.40"));
    }
}
