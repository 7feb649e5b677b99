use super::BarSource;
use crate::api::DataError;
use crate::models::PriceBar;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Starting prices for well-known names; anything else starts at 1000
const BASE_PRICES: &[(&str, f64)] = &[
    ("RELIANCE", 2500.0),
    ("TCS", 3500.0),
    ("HDFCBANK", 1600.0),
    ("INFY", 1400.0),
    ("HINDUNILVR", 2400.0),
    ("ICICIBANK", 1000.0),
    ("KOTAKBANK", 1800.0),
    ("BHARTIARTL", 900.0),
    ("ITC", 450.0),
    ("SBIN", 600.0),
    ("BAJFINANCE", 7000.0),
    ("ASIANPAINT", 3200.0),
    ("MARUTI", 10000.0),
    ("AXISBANK", 1100.0),
    ("LT", 3500.0),
];

/// Generates reproducible weekday OHLCV bars for demo runs and tests
///
/// Each symbol gets its own RNG stream derived from the seed, so output does
/// not depend on the order symbols are requested in.
#[derive(Debug, Clone)]
pub struct SyntheticBars {
    seed: u64,
    end: NaiveDate,
    base_volume: i64,
}

impl SyntheticBars {
    /// Create a generator whose series end today
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            end: Utc::now().date_naive(),
            base_volume: 100_000,
        }
    }

    /// Fix the last calendar day of every generated series
    pub fn with_end_date(mut self, end: NaiveDate) -> Self {
        self.end = end;
        self
    }

    pub fn base_price(symbol: &str) -> f64 {
        BASE_PRICES
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, p)| *p)
            .unwrap_or(1000.0)
    }

    /// Bars covering the last `days` calendar days, weekends skipped
    pub fn generate(&self, symbol: &str, days: i64) -> Vec<PriceBar> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ symbol_hash(symbol));
        let mut price = Self::base_price(symbol);
        let mut bars = Vec::with_capacity(days.max(0) as usize);

        for i in 0..days {
            let date = self.end - Duration::days(days - 1 - i);
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }

            // ±5% daily change
            let close = (price * (1.0 + rng.gen_range(-0.05..0.05))).max(0.01);
            let high = close * rng.gen_range(1.0..1.03);
            let low = close * rng.gen_range(0.97..1.0);
            let open = low + (high - low) * rng.gen::<f64>();
            let volume = self.base_volume * rng.gen_range(1..100);

            bars.push(PriceBar {
                symbol: symbol.to_string(),
                date,
                open: round2(open),
                high: round2(high),
                low: round2(low),
                close: round2(close),
                volume,
            });

            price = close;
        }

        bars
    }
}

#[async_trait]
impl BarSource for SyntheticBars {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch_bars(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>, DataError> {
        let days = period_days(period, self.end)
            .ok_or_else(|| DataError::InvalidPeriod(period.to_string()))?;
        Ok(self.generate(symbol, days))
    }
}

/// Calendar days covered by a chart range such as `3mo`
pub fn period_days(period: &str, today: NaiveDate) -> Option<i64> {
    let days = match period {
        "1d" => 1,
        "5d" => 7,
        "1mo" => 31,
        "3mo" => 92,
        "6mo" => 183,
        "1y" => 365,
        "2y" => 730,
        "5y" => 1826,
        "10y" | "max" => 3652,
        "ytd" => today.ordinal() as i64,
        _ => return None,
    };
    Some(days)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// FNV-1a, stable across runs and platforms
fn symbol_hash(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}
