//! Indicator computation kernels.
//!
//! Three indicators, each producing exactly one output entry per input bar:
//! - `sequential`: the TD Sequential state machine (strict forward scan)
//! - `bands`: moving-average-centered volatility bands (window-local)
//! - `heiken_ashi`: smoothed candle transform (strict forward scan)
//!
//! Insufficient-history positions carry absent markers (`f64::NAN` in numeric
//! columns, zeroed/`None` fields in structured state) rather than failing;
//! invalid parameters are rejected before any computation starts.

pub mod bands;
pub mod heiken_ashi;
pub mod ma;
pub mod sequential;

pub use bands::{BandEnvelope, BandSeries, BandSettings, Bands, MaKind};
pub use heiken_ashi::HeikenAshiBar;
pub use sequential::{
    CountdownCount, Direction, PriceFlip, Sequential, SequentialBarState, SequentialSettings,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which price series an indicator reads: raw candles or their
/// Heiken-Ashi transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    Raw,
    HeikenAshi,
}

/// Structured error types for indicator parameter validation.
///
/// Raised synchronously at computation start, before any output exists.
/// Short or empty series are not errors — they produce absent output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("period must be at least {min}, got {got}")]
    PeriodTooSmall { min: usize, got: usize },

    #[error("multiplier set must not be empty")]
    EmptyMultipliers,

    #[error("multipliers must be positive")]
    ZeroMultiplier,

    #[error("lookback must be at least 1, got {got}")]
    LookbackTooSmall { got: usize },

    #[error("setup length must be at least {min}, got {got}")]
    SetupLengthTooSmall { min: u8, got: u8 },

    #[error("countdown length must be at least 1, got {got}")]
    CountdownLengthTooSmall { got: u8 },
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHL: open = prev close (or close for the first bar),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base = base_timestamp();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::minutes(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
            }
        })
        .collect()
}

/// Create bars from explicit (open, high, low, close) tuples for tests that
/// need full control over highs and lows.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base = base_timestamp();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: base + chrono::Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
        })
        .collect()
}

#[cfg(test)]
fn base_timestamp() -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
