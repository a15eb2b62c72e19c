//! Volatility bands — moving-average basis +/- standard-deviation envelopes.
//!
//! - Basis: SMA(close, period) or EMA(close, period), selectable.
//! - Per multiplier k: upper = basis + k * stddev, lower = basis - k * stddev.
//! - stddev is the sample (N-1) standard deviation of closes over the SMA
//!   window, regardless of which basis kind is selected.
//! - Warmup positions (index < period - 1) are `f64::NAN`.
//!
//! Window-local: every index is computable from its own lookback window, so
//! unlike the sequential engine this carries no cross-bar state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::ma::{ema_series, sma_series};
use crate::indicators::{IndicatorError, PriceSource};

/// Which moving average centers the bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaKind {
    Simple,
    Exponential,
}

/// Band calculator parameters.
///
/// Defaults match the original application: 20-period simple basis with a
/// single 2-sigma envelope over the raw series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSettings {
    pub period: usize,
    pub ma_kind: MaKind,
    pub multipliers: BTreeSet<u32>,
    pub source: PriceSource,
}

impl Default for BandSettings {
    fn default() -> Self {
        Self {
            period: 20,
            ma_kind: MaKind::Simple,
            multipliers: BTreeSet::from([2]),
            source: PriceSource::Raw,
        }
    }
}

impl BandSettings {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        if self.period < 2 {
            return Err(IndicatorError::PeriodTooSmall {
                min: 2,
                got: self.period,
            });
        }
        if self.multipliers.is_empty() {
            return Err(IndicatorError::EmptyMultipliers);
        }
        if self.multipliers.contains(&0) {
            return Err(IndicatorError::ZeroMultiplier);
        }
        Ok(())
    }
}

/// One multiplier's envelope, index-aligned with the input series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEnvelope {
    pub multiplier: u32,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Columnar band output: basis plus one envelope per configured multiplier
/// (ascending), every column exactly as long as the input series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSeries {
    pub basis: Vec<f64>,
    pub envelopes: Vec<BandEnvelope>,
}

impl BandSeries {
    pub fn len(&self) -> usize {
        self.basis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }

    pub fn envelope(&self, multiplier: u32) -> Option<&BandEnvelope> {
        self.envelopes.iter().find(|e| e.multiplier == multiplier)
    }
}

/// Band calculator with validated settings.
#[derive(Debug, Clone)]
pub struct Bands {
    settings: BandSettings,
}

impl Bands {
    pub fn new(settings: BandSettings) -> Result<Self, IndicatorError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &BandSettings {
        &self.settings
    }

    /// Computes basis and envelopes for the whole series.
    ///
    /// A series shorter than the period yields all-NaN columns rather than
    /// an error.
    pub fn compute(&self, bars: &[Bar]) -> BandSeries {
        let n = bars.len();
        let period = self.settings.period;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let basis = match self.settings.ma_kind {
            MaKind::Simple => sma_series(&closes, period),
            MaKind::Exponential => ema_series(&closes, period),
        };

        let stddev = rolling_sample_stddev(&closes, period);

        let envelopes = self
            .settings
            .multipliers
            .iter()
            .map(|&multiplier| {
                let k = f64::from(multiplier);
                let mut upper = vec![f64::NAN; n];
                let mut lower = vec![f64::NAN; n];
                for i in 0..n {
                    upper[i] = basis[i] + k * stddev[i];
                    lower[i] = basis[i] - k * stddev[i];
                }
                BandEnvelope {
                    multiplier,
                    upper,
                    lower,
                }
            })
            .collect();

        BandSeries { basis, envelopes }
    }
}

/// Sample (N-1 denominator) standard deviation over each trailing window.
fn rolling_sample_stddev(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period < 2 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / (period - 1) as f64;
        result[i] = variance.sqrt();
    }

    result
}
