//! Heiken-Ashi — smoothed candle transform.
//!
//! Formula (per input bar):
//! - HA_Close = (Open + High + Low + Close) / 4
//! - HA_Open  = (previous HA_Open + previous HA_Close) / 2, seeded with
//!   (Open + Close) / 2 on the first bar
//! - HA_High  = max(High, HA_Open, HA_Close)
//! - HA_Low   = min(Low, HA_Open, HA_Close)
//!
//! Inherently sequential: `ha_open` is a first-order recurrence, so this is a
//! strict left-to-right scan, never a per-index formula.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, BarSeries};

/// Smoothed candle derived from one input bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeikenAshiBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Transforms a bar sequence into Heiken-Ashi candles, one per input bar.
pub fn transform(bars: &[Bar]) -> Vec<HeikenAshiBar> {
    let mut out = Vec::with_capacity(bars.len());
    let mut prev_open = f64::NAN;
    let mut prev_close = f64::NAN;

    for (i, bar) in bars.iter().enumerate() {
        let ha_close = (bar.open + bar.high + bar.low + bar.close) / 4.0;
        let ha_open = if i == 0 {
            (bar.open + bar.close) / 2.0
        } else {
            (prev_open + prev_close) / 2.0
        };
        out.push(HeikenAshiBar {
            timestamp: bar.timestamp,
            open: ha_open,
            high: bar.high.max(ha_open).max(ha_close),
            low: bar.low.min(ha_open).min(ha_close),
            close: ha_close,
        });
        prev_open = ha_open;
        prev_close = ha_close;
    }

    out
}

/// Derives a smoothed `BarSeries` (original timestamps, Heiken-Ashi prices)
/// for indicators configured to consume the transform instead of raw candles.
///
/// The HA formulas keep the high/low bracketing invariant and timestamps are
/// untouched, so the derived series always satisfies `BarSeries` validation.
pub fn smoothed_series(series: &BarSeries) -> BarSeries {
    let bars = transform(series.bars())
        .into_iter()
        .map(|ha| Bar {
            timestamp: ha.timestamp,
            open: ha.open,
            high: ha.high,
            low: ha.low,
            close: ha.close,
        })
        .collect();
    BarSeries::from_bars_unchecked(bars)
}
