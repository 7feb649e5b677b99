use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One daily OHLCV bar for an exchange symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A row of the exchange master equity list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListedStock {
    pub symbol: String,
    pub name: String,
    pub series: String,
    pub listing_date: Option<NaiveDate>,
    pub isin: Option<String>,
    pub face_value: Option<f64>,
}

/// Moving averages for a symbol on one day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
}

/// Latest bar of a symbol joined with its indicators and the previous trading day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub prev_date: Option<NaiveDate>,
    pub prev_open: Option<f64>,
    pub prev_high: Option<f64>,
    pub prev_close: Option<f64>,
    pub prev_sma_20: Option<f64>,
    pub prev_sma_50: Option<f64>,
}

impl SymbolSnapshot {
    pub fn sma(&self, period: SmaPeriod) -> Option<f64> {
        match period {
            SmaPeriod::Twenty => self.sma_20,
            SmaPeriod::Fifty => self.sma_50,
        }
    }

    pub fn prev_sma(&self, period: SmaPeriod) -> Option<f64> {
        match period {
            SmaPeriod::Twenty => self.prev_sma_20,
            SmaPeriod::Fifty => self.prev_sma_50,
        }
    }
}

/// The two moving-average windows the screener supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum SmaPeriod {
    #[default]
    Twenty,
    Fifty,
}

impl SmaPeriod {
    pub fn days(self) -> usize {
        match self {
            SmaPeriod::Twenty => 20,
            SmaPeriod::Fifty => 50,
        }
    }
}

impl TryFrom<u32> for SmaPeriod {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            20 => Ok(SmaPeriod::Twenty),
            50 => Ok(SmaPeriod::Fifty),
            other => Err(format!("unsupported SMA period {} (expected 20 or 50)", other)),
        }
    }
}

impl From<SmaPeriod> for u32 {
    fn from(period: SmaPeriod) -> Self {
        period.days() as u32
    }
}

impl fmt::Display for SmaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.days())
    }
}

/// Where a close sits relative to its SMA, compared with the previous day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakoutStatus {
    #[serde(rename = "Fresh Breakout Above")]
    FreshBreakoutAbove,
    #[serde(rename = "Holding Above")]
    HoldingAbove,
    #[serde(rename = "Fresh Breakdown Below")]
    FreshBreakdownBelow,
    #[serde(rename = "Holding Below")]
    HoldingBelow,
}

impl BreakoutStatus {
    pub fn label(self) -> &'static str {
        match self {
            BreakoutStatus::FreshBreakoutAbove => "Fresh Breakout Above",
            BreakoutStatus::HoldingAbove => "Holding Above",
            BreakoutStatus::FreshBreakdownBelow => "Fresh Breakdown Below",
            BreakoutStatus::HoldingBelow => "Holding Below",
        }
    }

    pub fn is_above(self) -> bool {
        matches!(
            self,
            BreakoutStatus::FreshBreakoutAbove | BreakoutStatus::HoldingAbove
        )
    }
}

impl fmt::Display for BreakoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Which symbols a fetch run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    All,
    PopularOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_period_conversion() {
        assert_eq!(SmaPeriod::try_from(20).unwrap(), SmaPeriod::Twenty);
        assert_eq!(SmaPeriod::try_from(50).unwrap(), SmaPeriod::Fifty);
        assert!(SmaPeriod::try_from(14).is_err());
        assert_eq!(u32::from(SmaPeriod::Fifty), 50);
    }

    #[test]
    fn test_sma_period_serde_as_number() {
        let json = serde_json::to_string(&SmaPeriod::Fifty).unwrap();
        assert_eq!(json, "50");

        let parsed: SmaPeriod = serde_json::from_str("20").unwrap();
        assert_eq!(parsed, SmaPeriod::Twenty);
        assert!(serde_json::from_str::<SmaPeriod>("30").is_err());
    }

    #[test]
    fn test_breakout_status_labels() {
        assert_eq!(
            serde_json::to_string(&BreakoutStatus::FreshBreakoutAbove).unwrap(),
            "\"Fresh Breakout Above\""
        );
        assert!(BreakoutStatus::HoldingAbove.is_above());
        assert!(!BreakoutStatus::FreshBreakdownBelow.is_above());
    }
}
