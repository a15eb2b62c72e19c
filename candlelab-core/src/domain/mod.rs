//! Domain types for candlelab

pub mod bar;
pub mod series;

pub use bar::Bar;
pub use series::{BarSeries, SeriesError};
