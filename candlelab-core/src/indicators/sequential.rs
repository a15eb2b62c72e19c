//! TD Sequential — price flip, setup, TDST level, and countdown phases.
//!
//! Inherently sequential/stateful: a single forward pass carries the active
//! setup, the recorded trend-boundary level, and countdown progress. Counts
//! reference closes up to `flip_lookback + 1` bars back, the countdown
//! qualifier references its own 8th bar, and a completed opposite setup
//! invalidates an in-flight countdown — none of this decomposes into
//! per-index formulas.
//!
//! Phases per bar, in order: flip detection, setup counting (completion
//! records the TDST level, perfection, and arms the countdown), countdown
//! cancellation checks, countdown counting with the 13-vs-8 qualifier.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::{IndicatorError, PriceSource};

/// Which side a setup or countdown is building toward.
///
/// Buy setups form in falling markets (exhaustion of a downtrend),
/// sell setups in rising ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

/// Momentum shift relative to the close `flip_lookback` bars earlier.
///
/// A bearish flip starts a buy setup; a bullish flip starts a sell setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceFlip {
    Bullish,
    Bearish,
}

/// Countdown progress for one bar.
///
/// `Count(0)` means no countdown bar was recorded here. `DeferredThirteen`
/// marks a would-be 13th bar held back by the 13-vs-8 qualifier (displayed
/// "13+"); it is a distinct state, never a numeric count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountdownCount {
    Count(u8),
    DeferredThirteen,
}

impl Default for CountdownCount {
    fn default() -> Self {
        CountdownCount::Count(0)
    }
}

impl std::fmt::Display for CountdownCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountdownCount::Count(n) => write!(f, "{n}"),
            CountdownCount::DeferredThirteen => write!(f, "13+"),
        }
    }
}

/// Annotated state for a single bar, produced by [`Sequential::compute`].
///
/// `setup_direction`/`countdown_direction` reflect the phase in effect at the
/// end of the bar; `countdown_cancelled` is set only on the bar where a
/// cancellation fires; `tdst_level` persists from the most recent completed
/// setup until superseded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SequentialBarState {
    pub price_flip: Option<PriceFlip>,
    pub setup_direction: Option<Direction>,
    pub setup_count: u8,
    pub setup_perfected: bool,
    pub tdst_level: Option<f64>,
    pub countdown_direction: Option<Direction>,
    pub countdown_count: CountdownCount,
    pub countdown_cancelled: bool,
}

/// TD Sequential parameters.
///
/// Defaults are the published constants: 4-bar flip/setup lookback, 2-bar
/// countdown lookback, 9-bar setup, 13-bar countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequentialSettings {
    pub flip_lookback: usize,
    pub countdown_lookback: usize,
    pub setup_length: u8,
    pub countdown_length: u8,
    pub source: PriceSource,
}

impl Default for SequentialSettings {
    fn default() -> Self {
        Self {
            flip_lookback: 4,
            countdown_lookback: 2,
            setup_length: 9,
            countdown_length: 13,
            source: PriceSource::Raw,
        }
    }
}

impl SequentialSettings {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        if self.flip_lookback < 1 {
            return Err(IndicatorError::LookbackTooSmall {
                got: self.flip_lookback,
            });
        }
        if self.countdown_lookback < 1 {
            return Err(IndicatorError::LookbackTooSmall {
                got: self.countdown_lookback,
            });
        }
        // Perfection compares the setup's last two bars against the two
        // before them, so the setup must span at least four bars.
        if self.setup_length < 4 {
            return Err(IndicatorError::SetupLengthTooSmall {
                min: 4,
                got: self.setup_length,
            });
        }
        if self.countdown_length < 1 {
            return Err(IndicatorError::CountdownLengthTooSmall {
                got: self.countdown_length,
            });
        }
        Ok(())
    }
}

/// The countdown bar whose close anchors the 13-vs-8 qualifier.
const QUALIFIER_BAR: u8 = 8;

#[derive(Debug, Clone, Copy)]
struct Setup {
    direction: Direction,
    count: u8,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    direction: Direction,
    count: u8,
    qualifier_close: Option<f64>,
    /// Index of the setup's completion bar; counting starts strictly after.
    armed_at: usize,
}

impl Countdown {
    fn new(direction: Direction, armed_at: usize) -> Self {
        Self {
            direction,
            count: 0,
            qualifier_close: None,
            armed_at,
        }
    }
}

/// TD Sequential engine with validated settings.
#[derive(Debug, Clone)]
pub struct Sequential {
    settings: SequentialSettings,
}

impl Sequential {
    pub fn new(settings: SequentialSettings) -> Result<Self, IndicatorError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &SequentialSettings {
        &self.settings
    }

    /// Runs the state machine over the whole series, one output per bar.
    ///
    /// Series shorter than `flip_lookback + 2` never flip and produce
    /// all-default states; an empty series produces empty output.
    pub fn compute(&self, bars: &[Bar]) -> Vec<SequentialBarState> {
        let n = bars.len();
        let lookback = self.settings.flip_lookback;
        let cd_lookback = self.settings.countdown_lookback;
        let setup_length = self.settings.setup_length;
        let countdown_length = self.settings.countdown_length;

        let mut out = vec![SequentialBarState::default(); n];

        let mut setup: Option<Setup> = None;
        let mut tdst: Option<f64> = None;
        let mut countdown: Option<Countdown> = None;

        for i in 0..n {
            // ── Price flip ──
            let flip = if i >= lookback + 1 {
                detect_flip(bars, i, lookback)
            } else {
                None
            };
            out[i].price_flip = flip;

            // ── Setup ──
            match flip {
                Some(PriceFlip::Bearish) => {
                    setup = Some(Setup {
                        direction: Direction::Buy,
                        count: 1,
                    });
                }
                Some(PriceFlip::Bullish) => {
                    setup = Some(Setup {
                        direction: Direction::Sell,
                        count: 1,
                    });
                }
                None => {
                    if let Some(active) = setup.as_mut() {
                        let holds = match active.direction {
                            Direction::Buy => bars[i].close < bars[i - lookback].close,
                            Direction::Sell => bars[i].close > bars[i - lookback].close,
                        };
                        if holds {
                            active.count += 1;
                        } else {
                            setup = None;
                        }
                    }
                }
            }

            let mut completed: Option<Direction> = None;
            if let Some(active) = setup {
                out[i].setup_direction = Some(active.direction);
                out[i].setup_count = active.count;
                if active.count == setup_length {
                    completed = Some(active.direction);
                }
            }

            if let Some(direction) = completed {
                let start = i + 1 - setup_length as usize;
                let window = &bars[start..=i];
                match direction {
                    Direction::Buy => {
                        // Resistance: the highest high the setup spanned.
                        tdst = Some(window.iter().map(|b| b.high).fold(f64::MIN, f64::max));
                        let floor = bars[i - 2].low.min(bars[i - 3].low);
                        out[i].setup_perfected =
                            bars[i].low <= floor || bars[i - 1].low <= floor;
                    }
                    Direction::Sell => {
                        // Support: the lowest low the setup spanned.
                        tdst = Some(window.iter().map(|b| b.low).fold(f64::MAX, f64::min));
                        let ceiling = bars[i - 2].high.max(bars[i - 3].high);
                        out[i].setup_perfected =
                            bars[i].high >= ceiling || bars[i - 1].high >= ceiling;
                    }
                }
                // The cycle ends at the ninth bar; no counting past it.
                setup = None;

                // A completed opposite setup invalidates an in-flight
                // countdown; a same-direction completion restarts it.
                if let Some(cd) = countdown.as_ref() {
                    if cd.direction != direction {
                        out[i].countdown_cancelled = true;
                    }
                }
                countdown = Some(Countdown::new(direction, i));
            }

            // ── Countdown cancellation on a TDST break ──
            if let (Some(cd), Some(level)) = (countdown.as_ref(), tdst) {
                let broken = match cd.direction {
                    Direction::Buy => bars[i].close > level,
                    Direction::Sell => bars[i].close < level,
                };
                if broken {
                    out[i].countdown_cancelled = true;
                    countdown = None;
                }
            }

            // ── Countdown counting ──
            let mut finished = false;
            if let Some(cd) = countdown.as_mut() {
                if i > cd.armed_at && i >= cd_lookback {
                    let qualifies = match cd.direction {
                        Direction::Buy => bars[i].close <= bars[i - cd_lookback].low,
                        Direction::Sell => bars[i].close >= bars[i - cd_lookback].high,
                    };
                    if qualifies {
                        cd.count += 1;
                        if cd.count == QUALIFIER_BAR {
                            cd.qualifier_close = Some(bars[i].close);
                        }
                        if cd.count == countdown_length {
                            let passes = cd.qualifier_close.map_or(true, |c8| match cd.direction {
                                Direction::Buy => bars[i].close <= c8,
                                Direction::Sell => bars[i].close >= c8,
                            });
                            out[i].countdown_direction = Some(cd.direction);
                            if passes {
                                out[i].countdown_count = CountdownCount::Count(countdown_length);
                                finished = true;
                            } else {
                                // Hold at "13+"; re-test against the original
                                // bar-8 close on the next qualifying bar.
                                out[i].countdown_count = CountdownCount::DeferredThirteen;
                                cd.count -= 1;
                            }
                        } else {
                            out[i].countdown_direction = Some(cd.direction);
                            out[i].countdown_count = CountdownCount::Count(cd.count);
                        }
                    }
                }
            }
            if finished {
                countdown = None;
            }

            if out[i].countdown_direction.is_none() {
                out[i].countdown_direction = countdown.as_ref().map(|cd| cd.direction);
            }
            out[i].tdst_level = tdst;
        }

        out
    }
}

fn detect_flip(bars: &[Bar], i: usize, lookback: usize) -> Option<PriceFlip> {
    let current = bars[i].close;
    let reference = bars[i - lookback].close;
    let previous = bars[i - 1].close;
    let previous_reference = bars[i - 1 - lookback].close;

    if current < reference && previous >= previous_reference {
        Some(PriceFlip::Bearish)
    } else if current > reference && previous <= previous_reference {
        Some(PriceFlip::Bullish)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    /// Bars with open = close + 0.2, high = close + 0.5, low = close - 0.5,
    /// so lows and highs track closes exactly half a point away.
    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let ohlc: Vec<(f64, f64, f64, f64)> = closes
            .iter()
            .map(|&c| (c + 0.2, c + 0.5, c - 0.5, c))
            .collect();
        make_ohlc_bars(&ohlc)
    }

    fn default_engine() -> Sequential {
        Sequential::new(SequentialSettings::default()).unwrap()
    }

    /// Rising preamble, then a nine-bar fall completing a buy setup at 13,
    /// countdown bars through a deferral episode resolving at 33.
    fn deferral_fixture() -> Vec<Bar> {
        bars_from_closes(&[
            100.0, 101.0, 102.0, 103.0, 104.0, // rising preamble
            96.0, 95.0, 94.0, 93.0, 92.0, 91.0, 90.0, 89.0, 88.0, // setup 1..9
            86.0, 85.0, 84.0, 83.0, 82.0, 81.0, 80.0, 79.0, // countdown 1..8
            90.0, 91.0, 92.0, 93.0, // pullback, no countdown bars
            89.0, 88.5, 88.0, 87.0, // countdown 9..12
            86.0, 85.5, // would-be 13th bars, deferred
            89.0, // non-qualifying
            75.0, // qualifier finally passes
        ])
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut settings = SequentialSettings::default();
        settings.flip_lookback = 0;
        assert!(matches!(
            Sequential::new(settings),
            Err(IndicatorError::LookbackTooSmall { got: 0 })
        ));

        let mut settings = SequentialSettings::default();
        settings.setup_length = 3;
        assert!(matches!(
            Sequential::new(settings),
            Err(IndicatorError::SetupLengthTooSmall { min: 4, got: 3 })
        ));
    }

    #[test]
    fn empty_series_empty_output() {
        assert!(default_engine().compute(&[]).is_empty());
    }

    #[test]
    fn no_flip_before_lookback_plus_one() {
        // Five bars: flips require index >= 5, so none can ever fire.
        let bars = bars_from_closes(&[100.0, 90.0, 80.0, 70.0, 60.0]);
        let states = default_engine().compute(&bars);
        assert!(states.iter().all(|s| s.price_flip.is_none()));
        assert!(states.iter().all(|s| s.setup_count == 0));
    }

    #[test]
    fn flat_series_produces_nothing() {
        let bars = bars_from_closes(&[100.0; 20]);
        let states = default_engine().compute(&bars);
        for state in &states {
            assert_eq!(state.price_flip, None);
            assert_eq!(state.setup_direction, None);
            assert_eq!(state.countdown_direction, None);
            assert_eq!(state.countdown_count, CountdownCount::Count(0));
            assert_eq!(state.tdst_level, None);
        }
    }

    #[test]
    fn bearish_flip_starts_buy_setup_counting_to_nine() {
        let states = default_engine().compute(&deferral_fixture());

        assert_eq!(states[4].price_flip, None);
        assert_eq!(states[5].price_flip, Some(PriceFlip::Bearish));

        // Counts 1..9 on bars 5..13, no premature reset.
        for (offset, state) in states[5..=13].iter().enumerate() {
            assert_eq!(state.setup_direction, Some(Direction::Buy));
            assert_eq!(state.setup_count, offset as u8 + 1);
        }
    }

    #[test]
    fn setup_count_saturates_at_nine() {
        let states = default_engine().compute(&deferral_fixture());
        // The condition still holds at bar 14, but the cycle ended at 9.
        assert_eq!(states[14].setup_count, 0);
        assert_eq!(states[14].setup_direction, None);
        assert!(states.iter().all(|s| s.setup_count <= 9));
    }

    #[test]
    fn setup_resets_on_first_violation_with_tie_break() {
        // Bar 7 closes level with the close four bars earlier: not a
        // continuation (strict), and its equality satisfies the non-strict
        // side of the bearish flip test on bar 8.
        let bars = bars_from_closes(&[
            100.0, 101.0, 102.0, 103.0, 104.0, 96.0, 95.0, 103.0, 94.0,
        ]);
        let states = default_engine().compute(&bars);

        assert_eq!(states[5].setup_count, 1);
        assert_eq!(states[6].setup_count, 2);
        assert_eq!(states[7].setup_count, 0);
        assert_eq!(states[7].setup_direction, None);
        // close[7] == close[3] counts as "not below", so bar 8 flips again.
        assert_eq!(states[8].price_flip, Some(PriceFlip::Bearish));
        assert_eq!(states[8].setup_count, 1);
    }

    #[test]
    fn completion_records_tdst_resistance() {
        let states = default_engine().compute(&deferral_fixture());

        assert_eq!(states[12].tdst_level, None);
        // Highest high across setup bars 5..=13: high of bar 5 = 96.5.
        assert_eq!(states[13].tdst_level, Some(96.5));
        // Persists until superseded.
        assert_eq!(states[33].tdst_level, Some(96.5));
    }

    #[test]
    fn completion_evaluates_perfection_from_lows() {
        let states = default_engine().compute(&deferral_fixture());
        // low[13] = 87.5 <= min(low[10], low[11]) = 89.5.
        assert!(states[13].setup_perfected);
        assert!(!states[12].setup_perfected);
    }

    #[test]
    fn imperfect_setup_stays_unperfected() {
        // Bars 8 and 9 of the setup hold above the lows of bars 6 and 7.
        let bars = bars_from_closes(&[
            100.0, 101.0, 102.0, 103.0, 104.0, 96.0, 95.0, 94.0, 93.0, 92.0, 91.0, 90.0, 90.5,
            90.4,
        ]);
        let states = default_engine().compute(&bars);
        assert_eq!(states[13].setup_count, 9);
        // min(low[10], low[11]) = 89.5; low[12] = 90.0, low[13] = 89.9.
        assert!(!states[13].setup_perfected);
    }

    #[test]
    fn countdown_starts_strictly_after_completion_bar() {
        let states = default_engine().compute(&deferral_fixture());
        // Armed on the completion bar but not yet counting.
        assert_eq!(states[13].countdown_direction, Some(Direction::Buy));
        assert_eq!(states[13].countdown_count, CountdownCount::Count(0));
        assert_eq!(states[14].countdown_count, CountdownCount::Count(1));
        // Nothing counts before completion.
        for state in &states[..13] {
            assert_eq!(state.countdown_count, CountdownCount::Count(0));
        }
    }

    #[test]
    fn countdown_bars_need_not_be_consecutive() {
        let states = default_engine().compute(&deferral_fixture());

        // Eight consecutive qualifying bars...
        for (offset, state) in states[14..=21].iter().enumerate() {
            assert_eq!(state.countdown_count, CountdownCount::Count(offset as u8 + 1));
        }
        // ...then a pullback that does not qualify but keeps the countdown alive...
        for state in &states[22..=25] {
            assert_eq!(state.countdown_count, CountdownCount::Count(0));
            assert_eq!(state.countdown_direction, Some(Direction::Buy));
        }
        // ...then counting resumes where it left off.
        assert_eq!(states[26].countdown_count, CountdownCount::Count(9));
        assert_eq!(states[29].countdown_count, CountdownCount::Count(12));
    }

    #[test]
    fn thirteenth_bar_defers_until_qualifier_passes() {
        let states = default_engine().compute(&deferral_fixture());

        // Bar-8 close is 79; bars 30 and 31 qualify but close above it.
        assert_eq!(states[30].countdown_count, CountdownCount::DeferredThirteen);
        assert_eq!(states[31].countdown_count, CountdownCount::DeferredThirteen);
        // Bar 32 does not qualify; nothing is emitted there.
        assert_eq!(states[32].countdown_count, CountdownCount::Count(0));
        // Bar 33 qualifies and closes at 75 <= 79: the countdown finalizes.
        assert_eq!(states[33].countdown_count, CountdownCount::Count(13));
        assert_eq!(states[33].countdown_direction, Some(Direction::Buy));
        assert!(!states[33].countdown_cancelled);
    }

    #[test]
    fn tdst_break_cancels_countdown_for_good() {
        // Same completion as the deferral fixture (resistance 96.5), then a
        // close above it on bar 15.
        let bars = bars_from_closes(&[
            100.0, 101.0, 102.0, 103.0, 104.0, 96.0, 95.0, 94.0, 93.0, 92.0, 91.0, 90.0, 89.0,
            88.0, 86.0, 97.0, 85.0, 84.0, 83.0,
        ]);
        let states = default_engine().compute(&bars);

        assert_eq!(states[14].countdown_count, CountdownCount::Count(1));
        assert!(states[15].countdown_cancelled);
        assert_eq!(states[15].countdown_direction, None);
        // Bars 16..18 would qualify, but the countdown is gone and no new
        // setup has completed.
        for state in &states[16..] {
            assert_eq!(state.countdown_count, CountdownCount::Count(0));
            assert_eq!(state.countdown_direction, None);
        }
    }

    #[test]
    fn opposite_setup_completion_cancels_and_rearms() {
        let bars = bars_from_closes(&[
            100.0, 101.0, 102.0, 103.0, 104.0, // preamble
            96.0, 95.0, 94.0, 93.0, 92.0, 91.0, 90.0, 89.0, 88.0, // buy setup 1..9
            86.0, 85.0, // buy countdown 1..2
            90.0, 91.0, 92.0, 93.0, 94.0, 95.0, 95.5, 96.0, 96.2, // sell setup 1..9
            97.0, // sell countdown 1
        ]);
        let states = default_engine().compute(&bars);

        assert_eq!(states[15].countdown_count, CountdownCount::Count(2));
        assert_eq!(states[16].price_flip, Some(PriceFlip::Bullish));

        // The sell setup completes at 24: buy countdown dies, sell side arms,
        // and the support level supersedes the old resistance.
        assert_eq!(states[24].setup_count, 9);
        assert_eq!(states[24].setup_direction, Some(Direction::Sell));
        assert!(states[24].countdown_cancelled);
        assert_eq!(states[24].countdown_direction, Some(Direction::Sell));
        // Lowest low across setup bars 16..=24: low of bar 16 = 89.5.
        assert_eq!(states[24].tdst_level, Some(89.5));

        // Sell countdown counts on the next qualifying bar.
        assert_eq!(states[25].countdown_count, CountdownCount::Count(1));
        assert_eq!(states[25].countdown_direction, Some(Direction::Sell));
    }

    #[test]
    fn countdown_never_exceeds_thirteen() {
        let states = default_engine().compute(&deferral_fixture());
        for state in &states {
            if let CountdownCount::Count(n) = state.countdown_count {
                assert!(n <= 13);
            }
        }
    }

    #[test]
    fn deferred_display_reads_thirteen_plus() {
        assert_eq!(CountdownCount::DeferredThirteen.to_string(), "13+");
        assert_eq!(CountdownCount::Count(9).to_string(), "9");
    }

    #[test]
    fn compute_is_deterministic() {
        let bars = deferral_fixture();
        let engine = default_engine();
        assert_eq!(engine.compute(&bars), engine.compute(&bars));
    }
}
