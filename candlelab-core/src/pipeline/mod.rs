//! Indicator pipeline — cached raw series in, merged per-bar result out.
//!
//! The pipeline owns the validated raw `BarSeries` and the per-indicator
//! settings. Enabling, disabling, or reconfiguring an indicator recomputes
//! that indicator alone, always from the cached raw series (never from a
//! previously derived result), so parameter changes are independent of prior
//! runs. Every output series has exactly one entry per input bar index.
//!
//! Dispatch is a closed set of indicator kinds, not a runtime registry: the
//! compiler checks exhaustiveness when a kind is added.
//!
//! Sequential and Bands only read the shared immutable series and write
//! disjoint outputs, so they run concurrently via `rayon::join`. Each
//! recomputation yields a fresh, fully written output; the `revision` stamp
//! lets callers discard results from a superseded request.

use serde::{Deserialize, Serialize};

use crate::domain::BarSeries;
use crate::indicators::{
    bands::{BandSeries, BandSettings, Bands},
    heiken_ashi,
    heiken_ashi::HeikenAshiBar,
    sequential::{Sequential, SequentialBarState, SequentialSettings},
    IndicatorError, PriceSource,
};

/// The closed set of indicators the pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sequential,
    Bands,
    HeikenAshi,
}

/// Which indicators run, and with which parameters. `None`/`false` disables.
///
/// Defaults mirror the original application: the sequential overlay on, bands
/// off, Heiken-Ashi candles off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub sequential: Option<SequentialSettings>,
    pub bands: Option<BandSettings>,
    pub heiken_ashi: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sequential: Some(SequentialSettings::default()),
            bands: None,
            heiken_ashi: false,
        }
    }
}

/// A rejected indicator computation. The other indicators still complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorFailure {
    pub kind: IndicatorKind,
    pub error: IndicatorError,
}

/// Merged, index-aligned per-bar result.
///
/// Enabled indicators that computed successfully fill their field; disabled
/// or failed ones leave it `None` (failures are listed separately). All
/// contained series have exactly `len` entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineOutput {
    pub len: usize,
    pub revision: u64,
    pub sequential: Option<Vec<SequentialBarState>>,
    pub bands: Option<BandSeries>,
    pub heiken_ashi: Option<Vec<HeikenAshiBar>>,
    pub failures: Vec<IndicatorFailure>,
}

/// Stateful orchestrator: cached raw series + current merged output.
#[derive(Debug, Clone)]
pub struct IndicatorPipeline {
    series: BarSeries,
    settings: PipelineSettings,
    output: PipelineOutput,
    revision: u64,
}

impl IndicatorPipeline {
    /// Computes every enabled indicator over the series.
    pub fn new(series: BarSeries, settings: PipelineSettings) -> Self {
        let mut pipeline = Self {
            series,
            settings,
            output: PipelineOutput::default(),
            revision: 0,
        };
        pipeline.recompute_all();
        pipeline
    }

    pub fn output(&self) -> &PipelineOutput {
        &self.output
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    /// Reconfigures (or disables) the sequential indicator and recomputes it
    /// alone from the cached raw series.
    pub fn set_sequential(&mut self, settings: Option<SequentialSettings>) {
        self.settings.sequential = settings;
        self.recompute_one(IndicatorKind::Sequential);
    }

    /// Reconfigures (or disables) the band indicator and recomputes it alone.
    pub fn set_bands(&mut self, settings: Option<BandSettings>) {
        self.settings.bands = settings;
        self.recompute_one(IndicatorKind::Bands);
    }

    /// Toggles the Heiken-Ashi candle output and recomputes it alone.
    pub fn set_heiken_ashi(&mut self, enabled: bool) {
        self.settings.heiken_ashi = enabled;
        self.recompute_one(IndicatorKind::HeikenAshi);
    }

    /// Swaps in a new data load and recomputes everything.
    pub fn replace_series(&mut self, series: BarSeries) {
        self.series = series;
        self.recompute_all();
    }

    fn recompute_all(&mut self) {
        self.revision += 1;
        tracing::debug!(
            "recomputing all indicators: bars={} revision={}",
            self.series.len(),
            self.revision
        );

        // Sequential and Bands are independent; fan them out. Heiken-Ashi is
        // a single cheap scan and stays inline.
        let (sequential, bands) = rayon::join(
            || {
                self.settings
                    .sequential
                    .map(|s| compute_sequential(&self.series, &s))
            },
            || {
                self.settings
                    .bands
                    .as_ref()
                    .map(|s| compute_bands(&self.series, s))
            },
        );
        let heiken_ashi = self
            .settings
            .heiken_ashi
            .then(|| heiken_ashi::transform(self.series.bars()));

        let mut output = PipelineOutput {
            len: self.series.len(),
            revision: self.revision,
            sequential: None,
            bands: None,
            heiken_ashi,
            failures: Vec::new(),
        };
        merge_slot(IndicatorKind::Sequential, sequential, &mut output.sequential, &mut output.failures);
        merge_slot(IndicatorKind::Bands, bands, &mut output.bands, &mut output.failures);

        debug_assert!(output
            .sequential
            .as_ref()
            .map_or(true, |s| s.len() == output.len));
        debug_assert!(output.bands.as_ref().map_or(true, |b| b.len() == output.len));

        self.output = output;
    }

    fn recompute_one(&mut self, kind: IndicatorKind) {
        self.revision += 1;
        tracing::debug!(
            "recomputing {kind:?}: bars={} revision={}",
            self.series.len(),
            self.revision
        );

        // Fresh output structure: untouched slots are carried over, the
        // changed slot is rebuilt from the raw series.
        let mut output = self.output.clone();
        output.revision = self.revision;
        output.failures.retain(|f| f.kind != kind);

        match kind {
            IndicatorKind::Sequential => {
                let slot = self
                    .settings
                    .sequential
                    .map(|s| compute_sequential(&self.series, &s));
                output.sequential = None;
                merge_slot(kind, slot, &mut output.sequential, &mut output.failures);
            }
            IndicatorKind::Bands => {
                let slot = self
                    .settings
                    .bands
                    .as_ref()
                    .map(|s| compute_bands(&self.series, s));
                output.bands = None;
                merge_slot(kind, slot, &mut output.bands, &mut output.failures);
            }
            IndicatorKind::HeikenAshi => {
                output.heiken_ashi = self
                    .settings
                    .heiken_ashi
                    .then(|| heiken_ashi::transform(self.series.bars()));
            }
        }

        self.output = output;
    }
}

fn compute_sequential(
    series: &BarSeries,
    settings: &SequentialSettings,
) -> Result<Vec<SequentialBarState>, IndicatorError> {
    let engine = Sequential::new(*settings)?;
    Ok(match settings.source {
        PriceSource::Raw => engine.compute(series.bars()),
        PriceSource::HeikenAshi => {
            let smoothed = heiken_ashi::smoothed_series(series);
            engine.compute(smoothed.bars())
        }
    })
}

fn compute_bands(series: &BarSeries, settings: &BandSettings) -> Result<BandSeries, IndicatorError> {
    let engine = Bands::new(settings.clone())?;
    Ok(match settings.source {
        PriceSource::Raw => engine.compute(series.bars()),
        PriceSource::HeikenAshi => {
            let smoothed = heiken_ashi::smoothed_series(series);
            engine.compute(smoothed.bars())
        }
    })
}

fn merge_slot<T>(
    kind: IndicatorKind,
    slot: Option<Result<T, IndicatorError>>,
    field: &mut Option<T>,
    failures: &mut Vec<IndicatorFailure>,
) {
    match slot {
        Some(Ok(value)) => *field = Some(value),
        Some(Err(error)) => {
            tracing::warn!("{kind:?} rejected: {error}");
            failures.push(IndicatorFailure { kind, error });
        }
        None => {}
    }
}
