// Technical indicators module
// Moving averages used by the screener

pub mod moving_average;

pub use moving_average::{calculate_sma, pct_from_sma, sma_series};
