use crate::analysis::FetchOutcome;
use crate::models::{FetchMode, SmaPeriod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_price_limit() -> i64 {
    60
}

/// `?sma_period=20`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PeriodParams {
    pub sma_period: SmaPeriod,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AboveSmaParams {
    pub sma_period: SmaPeriod,
    pub min_pct: Option<f64>,
    pub max_pct: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NearSmaParams {
    pub sma_period: SmaPeriod,
    pub max_distance: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

/// `?symbols=TCS,INFY&limit=60`
#[derive(Debug, Deserialize)]
pub struct PriceParams {
    pub symbols: Option<String>,
    #[serde(default = "default_price_limit")]
    pub limit: i64,
}

impl PriceParams {
    /// Comma-separated symbols, trimmed, uppercased, blanks dropped
    pub fn symbol_list(&self) -> Vec<String> {
        self.symbols
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// `?symbol=TCS&limit=100` for the recent-rows table
#[derive(Debug, Deserialize)]
pub struct LatestPriceParams {
    pub symbol: Option<String>,
    #[serde(default = "default_price_limit")]
    pub limit: i64,
}

/// A filtered list plus how many rows matched before truncation
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn truncated(mut items: Vec<T>, limit: Option<usize>) -> Self {
        let total = items.len();
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Self { items, total }
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    #[serde(default)]
    pub mode: FetchMode,
    pub max_stocks: Option<usize>,
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    pub days: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchStatus {
    pub running: bool,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_outcome: Option<FetchOutcome>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_list_parsing() {
        let params = PriceParams {
            symbols: Some(" tcs, INFY,,reliance ".into()),
            limit: 10,
        };
        assert_eq!(params.symbol_list(), vec!["TCS", "INFY", "RELIANCE"]);

        let empty = PriceParams {
            symbols: None,
            limit: 10,
        };
        assert!(empty.symbol_list().is_empty());
    }

    #[test]
    fn test_list_response_keeps_total() {
        let list = ListResponse::truncated(vec![1, 2, 3, 4], Some(2));
        assert_eq!(list.items, vec![1, 2]);
        assert_eq!(list.total, 4);

        let all = ListResponse::truncated(vec![1, 2], None);
        assert_eq!(all.items.len(), 2);
    }
}
