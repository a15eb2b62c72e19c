//! Candlelab Core — indicator computation engine for bar-series overlays.
//!
//! This crate contains the deterministic heart of the charting stack:
//! - Domain types (bars, the validated bar series)
//! - Heiken-Ashi smoothed-candle transform
//! - TD Sequential state machine (flips, setups, TDST levels, countdowns)
//! - Volatility band calculator
//! - Indicator pipeline merging per-bar outputs and recomputing on
//!   parameter changes
//!
//! Data acquisition, rendering, and UI orchestration are external
//! collaborators: bars come in validated and per-bar annotations go out,
//! nothing else crosses the boundary.

pub mod domain;
pub mod indicators;
pub mod pipeline;
