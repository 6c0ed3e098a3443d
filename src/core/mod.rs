//! Core pricing logic

pub mod odds_band;

// Re-export commonly used types
pub use odds_band::{rank_favourites, round2, OddsBand, BAND_EDGES, NIL_BAND};
