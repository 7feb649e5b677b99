use chrono::{Duration, NaiveDate, Utc};

use crate::models::PriceBar;
use crate::Result;

/// Sanity checks for daily OHLCV bars
pub struct BarValidator;

impl BarValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a bar for correctness
    pub fn validate(&self, bar: &PriceBar) -> Result<()> {
        self.validate_prices(bar)?;
        self.validate_date(bar, Utc::now().date_naive())?;
        self.validate_ohlc_relationship(bar)?;
        Ok(())
    }

    fn validate_prices(&self, bar: &PriceBar) -> Result<()> {
        for (label, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("Invalid {} price for {}: {}", label, bar.symbol, value).into());
            }
        }
        // Zero volume happens on thin trading days
        if bar.volume < 0 {
            return Err(format!("Invalid volume for {}: {}", bar.symbol, bar.volume).into());
        }
        Ok(())
    }

    /// Exchange dates run ahead of UTC, so allow one day of slack
    fn validate_date(&self, bar: &PriceBar, today: NaiveDate) -> Result<()> {
        if bar.date > today + Duration::days(1) {
            return Err(format!(
                "Bar date is in the future: {} (today: {})",
                bar.date, today
            )
            .into());
        }
        Ok(())
    }

    fn validate_ohlc_relationship(&self, bar: &PriceBar) -> Result<()> {
        if bar.high < bar.low {
            return Err(format!("High ({}) is less than low ({})", bar.high, bar.low).into());
        }
        if bar.high < bar.open || bar.high < bar.close {
            return Err(format!(
                "High ({}) is less than open ({}) or close ({})",
                bar.high, bar.open, bar.close
            )
            .into());
        }
        if bar.low > bar.open || bar.low > bar.close {
            return Err(format!(
                "Low ({}) is greater than open ({}) or close ({})",
                bar.low, bar.open, bar.close
            )
            .into());
        }
        Ok(())
    }
}

impl Default for BarValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_bar() -> PriceBar {
        PriceBar {
            symbol: "SBIN".to_string(),
            date: Utc::now().date_naive() - Duration::days(1),
            open: 100.0,
            high: 102.0,
            low: 99.0,
            close: 101.0,
            volume: 1_000_000,
        }
    }

    #[test]
    fn test_validate_valid_bar() {
        assert!(BarValidator::new().validate(&make_valid_bar()).is_ok());
    }

    #[test]
    fn test_validate_negative_close() {
        let mut bar = make_valid_bar();
        bar.close = -101.0;

        let result = BarValidator::new().validate(&bar);
        assert!(result.unwrap_err().to_string().contains("Invalid close price"));
    }

    #[test]
    fn test_validate_nan_open() {
        let mut bar = make_valid_bar();
        bar.open = f64::NAN;
        assert!(BarValidator::new().validate(&bar).is_err());
    }

    #[test]
    fn test_validate_zero_volume_allowed() {
        let mut bar = make_valid_bar();
        bar.volume = 0;
        assert!(BarValidator::new().validate(&bar).is_ok());
    }

    #[test]
    fn test_validate_negative_volume() {
        let mut bar = make_valid_bar();
        bar.volume = -5;

        let result = BarValidator::new().validate(&bar);
        assert!(result.unwrap_err().to_string().contains("Invalid volume"));
    }

    #[test]
    fn test_validate_high_less_than_low() {
        let mut bar = make_valid_bar();
        bar.high = 98.0;

        let err = BarValidator::new().validate(&bar).unwrap_err().to_string();
        assert!(err.contains("less than low"));
    }

    #[test]
    fn test_validate_low_greater_than_close() {
        let mut bar = make_valid_bar();
        bar.close = 95.0;
        bar.low = 96.0;

        let err = BarValidator::new().validate(&bar).unwrap_err().to_string();
        assert!(err.contains("greater than open"));
    }

    #[test]
    fn test_validate_future_date() {
        let mut bar = make_valid_bar();
        bar.date = Utc::now().date_naive() + Duration::days(5);

        let err = BarValidator::new().validate(&bar).unwrap_err().to_string();
        assert!(err.contains("future"));
    }

    #[test]
    fn test_validate_all_prices_equal() {
        let mut bar = make_valid_bar();
        bar.open = 100.0;
        bar.high = 100.0;
        bar.low = 100.0;
        bar.close = 100.0;
        assert!(BarValidator::new().validate(&bar).is_ok());
    }
}
