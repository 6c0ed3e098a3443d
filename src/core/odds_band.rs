//! Odds Bands
//!
//! Categorical price ranges used to group BSPs.
//!
//! Bins are contiguous, left-closed and right-open, covering [0, ∞):
//!     [0, 1.0) [1.0, 1.2) [1.2, 1.4) [1.4, 1.6) [1.6, 1.8) [1.8, 2.0)
//!     [2.0, 3.0) [3.0, 4.0) ... [9.0, 10.0) [10.0, ∞)
//!
//! The lowest bin is where a zero price (no runner in the trap) lands, so it
//! renders as the literal `0.00` instead of a label.

use serde::{Serialize, Serializer};
use std::fmt;

/// Lower edges of every bin, in order. The last bin is unbounded.
pub const BAND_EDGES: [f64; 15] = [
    0.0, 1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0,
];

/// Rendering of the [0, 1.0) bin
pub const NIL_BAND: &str = "0.00";

/// A labeled price range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OddsBand {
    /// [0, 1.0), also used for missing prices
    Nil,
    From1_0,
    From1_2,
    From1_4,
    From1_6,
    From1_8,
    From2,
    From3,
    From4,
    From5,
    From6,
    From7,
    From8,
    From9,
    /// [10.0, ∞)
    From10,
}

const ALL_BANDS: [OddsBand; 15] = [
    OddsBand::Nil,
    OddsBand::From1_0,
    OddsBand::From1_2,
    OddsBand::From1_4,
    OddsBand::From1_6,
    OddsBand::From1_8,
    OddsBand::From2,
    OddsBand::From3,
    OddsBand::From4,
    OddsBand::From5,
    OddsBand::From6,
    OddsBand::From7,
    OddsBand::From8,
    OddsBand::From9,
    OddsBand::From10,
];

impl OddsBand {
    /// Band a price
    ///
    /// NaN and negative prices have no bin and fall back to `Nil`.
    ///
    /// # Examples
    /// ```
    /// use greyhound::core::OddsBand;
    /// assert_eq!(OddsBand::from_price(2.4).label(), "2.0 – 2.99");
    /// assert_eq!(OddsBand::from_price(0.0).label(), "0.00");
    /// ```
    pub fn from_price(price: f64) -> Self {
        if price.is_nan() || price < 0.0 {
            return OddsBand::Nil;
        }

        // Last edge that is <= price
        let idx = BAND_EDGES
            .iter()
            .rposition(|&edge| price >= edge)
            .unwrap_or(0);

        ALL_BANDS[idx]
    }

    /// Band an optional price; `None` means no price at all
    pub fn from_optional(price: Option<f64>) -> Self {
        price.map(Self::from_price).unwrap_or(OddsBand::Nil)
    }

    /// Half-open interval covered by this band
    pub fn bounds(&self) -> (f64, f64) {
        let idx = *self as usize;
        let upper = BAND_EDGES.get(idx + 1).copied().unwrap_or(f64::INFINITY);
        (BAND_EDGES[idx], upper)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, OddsBand::Nil)
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            OddsBand::Nil => NIL_BAND,
            OddsBand::From1_0 => "1.0 - 1.19",
            OddsBand::From1_2 => "1.2 – 1.39",
            OddsBand::From1_4 => "1.4 – 1.59",
            OddsBand::From1_6 => "1.6 – 1.79",
            OddsBand::From1_8 => "1.8 – 1.99",
            OddsBand::From2 => "2.0 – 2.99",
            OddsBand::From3 => "3.0 – 3.99",
            OddsBand::From4 => "4.0 – 4.99",
            OddsBand::From5 => "5.0 – 5.99",
            OddsBand::From6 => "6.0 – 6.99",
            OddsBand::From7 => "7.0 – 7.99",
            OddsBand::From8 => "8.0 – 8.99",
            OddsBand::From9 => "9.0 – 9.99",
            OddsBand::From10 => "10.0+",
        }
    }
}

impl fmt::Display for OddsBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for OddsBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Rank a row of trap prices into favourites
///
/// Non-zero prices are sorted ascending and zeros (traps that did not run)
/// are pushed to the end, so index 0 is the shortest-priced runner.
pub fn rank_favourites(prices: &[f64]) -> Vec<f64> {
    let mut priced: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| *p > 0.0)
        .collect();
    priced.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let zeros = prices.len() - priced.len();
    priced.extend(std::iter::repeat(0.0).take(zeros));
    priced
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
