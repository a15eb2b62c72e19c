//! BarSeries — the validated input to every indicator.
//!
//! Collaborators are responsible for fetching, cleaning, and sorting bars;
//! the engine still refuses malformed input loudly rather than producing
//! silently wrong state. Construction is the only way in, and deserialization
//! goes through the same validation via `#[serde(try_from)]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Bar;

/// Structured error types for series validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index} has a non-finite price field")]
    NonFinitePrice { index: usize },

    #[error(
        "bar {index} violates OHLC bounds: high {high} / low {low} must bracket open {open} and close {close}"
    )]
    InvalidBounds {
        index: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("bar {index} timestamp {timestamp} does not increase over the previous bar")]
    NonMonotonicTimestamp {
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Ordered, gap-free, validated bar sequence.
///
/// Immutable once constructed. Every derived per-bar structure is indexed
/// against this series, one entry per bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bar>", into = "Vec<Bar>")]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validates and wraps a bar sequence.
    ///
    /// Rejects non-finite prices, inverted OHLC bounds, and non-increasing
    /// timestamps. An empty sequence is valid (indicators produce empty
    /// output for it).
    pub fn new(bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, bar) in bars.iter().enumerate() {
            if !bar.is_finite() {
                return Err(SeriesError::NonFinitePrice { index });
            }
            if !bar.is_sane() {
                return Err(SeriesError::InvalidBounds {
                    index,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                });
            }
            if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
                return Err(SeriesError::NonMonotonicTimestamp {
                    index,
                    timestamp: bar.timestamp,
                });
            }
        }
        Ok(Self { bars })
    }

    /// Wraps bars whose invariants hold by construction (e.g. the
    /// Heiken-Ashi transform of an already-validated series).
    pub(crate) fn from_bars_unchecked(bars: Vec<Bar>) -> Self {
        debug_assert!(
            bars.iter().all(Bar::is_sane),
            "unchecked BarSeries constructed from insane bars"
        );
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl TryFrom<Vec<Bar>> for BarSeries {
    type Error = SeriesError;

    fn try_from(bars: Vec<Bar>) -> Result<Self, Self::Error> {
        Self::new(bars)
    }
}

impl From<BarSeries> for Vec<Bar> {
    fn from(series: BarSeries) -> Self {
        series.bars
    }
}
