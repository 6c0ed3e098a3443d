//! Race-card normalisation
//!
//! Explodes the parallel per-page sequences scraped from race cards into one
//! row per element, and persists raw scrapes as JSON for offline reuse.

use std::fs;
use std::path::Path;

use crate::error::StageError;
use crate::models::{RaceCardField, RunnerCardRow, TIP_COUNT};

/// Notice when the scrape produced no pages
pub const NOT_SCRAPED: &str = "Greyhound data was not scraped due to poor internet connection";

/// Notice when tip sequences are missing
pub const TIPS_NOT_PRESENT: &str = "TGR1, TGR2, TGR3 and TGR4 columns not present";

/// Exploded race-card rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerCardTable {
    pub rows: Vec<RunnerCardRow>,
}

impl RunnerCardTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row for a race number, in card order
    pub fn find(&self, race_number: &str) -> Option<&RunnerCardRow> {
        self.rows.iter().find(|r| r.race_number == race_number)
    }
}

/// Coerce a tip to a trap number; anything non-numeric is no value
pub fn coerce_tip(text: &str) -> Option<u8> {
    let text = text.trim();
    if let Ok(trap) = text.parse::<u8>() {
        return Some(trap);
    }

    // "3.0" style values
    let value = text.parse::<f64>().ok()?;
    if value.fract() == 0.0 && (0.0..=u8::MAX as f64).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

fn is_blank(seq: &[String]) -> bool {
    seq.iter().all(|s| s.trim().is_empty())
}

/// Explode one page into rows, or `None` when the page must be dropped
fn explode_page(field: &RaceCardField) -> Option<Vec<RunnerCardRow>> {
    let tips = &field.tips[..TIP_COUNT];

    let sequences = [&field.race_numbers, &field.distances, &field.grades]
        .into_iter()
        .chain(tips.iter());

    let mut len = None;
    for seq in sequences {
        if is_blank(seq) {
            tracing::warn!("Dropping {} race card: blank field", field.track);
            return None;
        }
        match len {
            None => len = Some(seq.len()),
            Some(n) if n != seq.len() => {
                tracing::warn!(
                    "Dropping {} race card: fields have {} and {} entries",
                    field.track,
                    n,
                    seq.len()
                );
                return None;
            }
            Some(_) => {}
        }
    }

    let rows = (0..len.unwrap_or(0))
        .map(|i| RunnerCardRow {
            race_number: field.race_numbers[i].trim().to_string(),
            distance: field.distances[i].trim().to_string(),
            grade: field.grades[i].trim().to_string(),
            tips: std::array::from_fn(|k| coerce_tip(&tips[k][i])),
        })
        .collect();

    Some(rows)
}

/// Normalise scraped race-card pages into one row per race entry
///
/// Date and track are dropped; only the race number joins downstream.
pub fn normalize_race_cards(
    fields: Option<&[RaceCardField]>,
) -> Result<RunnerCardTable, StageError> {
    let fields = match fields {
        Some(f) if !f.is_empty() => f,
        _ => return Err(StageError::Connection(NOT_SCRAPED.to_string())),
    };

    if fields.iter().any(|f| f.tips.len() < TIP_COUNT) {
        return Err(StageError::MalformedInput(TIPS_NOT_PRESENT.to_string()));
    }

    let rows: Vec<RunnerCardRow> = fields.iter().filter_map(explode_page).flatten().collect();

    if rows.is_empty() {
        return Err(StageError::NoData(
            "Every scraped race card was blank".to_string(),
        ));
    }

    tracing::info!(
        "Normalized {} race-card rows from {} pages",
        rows.len(),
        fields.len()
    );

    Ok(RunnerCardTable { rows })
}

/// Save raw scraped pages as JSON
pub fn save_race_cards<P: AsRef<Path>>(path: P, fields: &[RaceCardField]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(fields)?;
    fs::write(path, json)
}

/// Load raw scraped pages saved by `save_race_cards`
pub fn load_race_cards<P: AsRef<Path>>(path: P) -> Result<Vec<RaceCardField>, StageError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        StageError::NoData(format!("cannot read race cards from {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        StageError::MalformedInput(format!("race cards in {} are unreadable: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn page(track: &str, races: &[&str], tips: [&[&str]; 4]) -> RaceCardField {
        RaceCardField {
            date: "17/10/2026".to_string(),
            track: track.to_string(),
            race_numbers: strings(races),
            distances: strings(&vec!["515m"; races.len()]),
            grades: strings(&vec!["Gr5"; races.len()]),
            tips: tips.iter().map(|t| strings(t)).collect(),
        }
    }

    #[test]
    fn test_coerce_tip() {
        assert_eq!(coerce_tip("3"), Some(3));
        assert_eq!(coerce_tip(" 3 "), Some(3));
        assert_eq!(coerce_tip("3.0"), Some(3));
        assert_eq!(coerce_tip("3.5"), None);
        assert_eq!(coerce_tip("Scratched"), None);
        assert_eq!(coerce_tip(""), None);
    }

    #[test]
    fn test_explodes_parallel_sequences() {
        let fields = vec![page(
            "Sale",
            &["R1", "R2"],
            [&["1", "4"], &["2", "x"], &["3", "1"], &["4", "2"]],
        )];
        let table = normalize_race_cards(Some(fields.as_slice())).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].race_number, "R1");
        assert_eq!(table.rows[0].tips, [Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(table.rows[1].race_number, "R2");
        assert_eq!(table.rows[1].tips, [Some(4), None, Some(1), Some(2)]);
        assert_eq!(table.rows[1].grade, "Gr5");
    }

    #[test]
    fn test_blank_page_dropped() {
        let fields = vec![
            page("Sale", &["R1"], [&["1"], &["2"], &["3"], &["4"]]),
            page("Empty", &["R1"], [&[], &["2"], &["3"], &["4"]]),
        ];
        let table = normalize_race_cards(Some(fields.as_slice())).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_mismatched_page_dropped() {
        let fields = vec![
            page("Sale", &["R1"], [&["1"], &["2"], &["3"], &["4"]]),
            page("Odd", &["R1", "R2"], [&["1"], &["2"], &["3"], &["4"]]),
        ];
        let table = normalize_race_cards(Some(fields.as_slice())).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_scrape_is_connection_error() {
        assert!(matches!(
            normalize_race_cards(None),
            Err(StageError::Connection(_))
        ));
        assert!(matches!(
            normalize_race_cards(Some(&[][..])),
            Err(StageError::Connection(_))
        ));
    }

    #[test]
    fn test_missing_tips_is_malformed() {
        let mut field = page("Sale", &["R1"], [&["1"], &["2"], &["3"], &["4"]]);
        field.tips.truncate(2);
        let err = normalize_race_cards(Some(std::slice::from_ref(&field))).unwrap_err();
        assert_eq!(err, StageError::MalformedInput(TIPS_NOT_PRESENT.to_string()));
    }

    #[test]
    fn test_all_blank_is_no_data() {
        let fields = vec![page("Empty", &[], [&[], &[], &[], &[]])];
        assert!(matches!(
            normalize_race_cards(Some(fields.as_slice())),
            Err(StageError::NoData(_))
        ));
    }

    #[test]
    fn test_save_and_load_race_cards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.json");
        let fields = vec![page("Sale", &["R1"], [&["1"], &["2"], &["3"], &["4"]])];

        save_race_cards(&path, &fields).unwrap();
        let loaded = load_race_cards(&path).unwrap();
        assert_eq!(loaded, fields);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_race_cards("/nonexistent/cards.json").unwrap_err();
        assert!(matches!(err, StageError::NoData(_)));
    }
}
