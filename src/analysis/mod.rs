// Analysis engine: screening signals and the fetch → store pipeline

pub mod signals;

pub use signals::{
    classify, indicator_rows, is_open_high, open_high_patterns, stocks_above_sma,
    stocks_near_sma, summary, AboveSmaRow, ExtensionBand, NearSmaRow, OpenHighPattern,
    PatternType, StatusCounts, Summary,
};

use crate::api::NseClient;
use crate::cache::CachedStore;
use crate::db::CleanupStats;
use crate::fetcher::BulkFetcher;
use crate::models::{FetchMode, IndicatorRow, PriceBar, SmaPeriod};
use crate::settings::{default_popular_symbols, AnalysisSettings, Settings, UniverseSettings};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shortest retention window a cleanup may use
pub const MIN_RETENTION_DAYS: i64 = 30;

/// Which symbols to fetch and how much history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub mode: FetchMode,
    pub max_stocks: Option<usize>,
    pub period: Option<String>,
}

/// Result of a fetch → store run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub source: String,
    pub mode: FetchMode,
    pub period: String,
    pub symbols_requested: usize,
    pub symbols_stored: usize,
    pub symbols_failed: usize,
    /// Below the liquidity floor, not stored
    pub symbols_illiquid: usize,
    pub price_rows: usize,
    pub indicator_rows: usize,
    pub invalid_bars: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Orchestrates fetching, persistence and screening queries
pub struct Analyzer {
    data: CachedStore,
    fetcher: BulkFetcher,
    universe: UniverseSettings,
    analysis: AnalysisSettings,
    default_period: String,
    store_batch_size: usize,
}

impl Analyzer {
    pub fn new(data: CachedStore, fetcher: BulkFetcher, settings: &Settings) -> Self {
        Self {
            data,
            fetcher,
            universe: settings.universe.clone(),
            analysis: settings.analysis.clone(),
            default_period: settings.fetcher.period.clone(),
            store_batch_size: settings.fetcher.store_batch_size.max(1),
        }
    }

    pub fn data(&self) -> &CachedStore {
        &self.data
    }

    pub fn analysis_settings(&self) -> &AnalysisSettings {
        &self.analysis
    }

    /// Download the exchange equity list into the universe table
    pub async fn refresh_universe(&self, client: &NseClient) -> Result<usize> {
        let stocks = client.fetch_equity_list().await?;
        if stocks.is_empty() {
            return Err("equity list is empty".into());
        }
        self.data.upsert_universe(&stocks).await
    }

    /// Symbols for a fetch run, in universe order, truncated to `max_stocks`
    pub async fn resolve_symbols(
        &self,
        mode: FetchMode,
        max_stocks: Option<usize>,
    ) -> Result<Vec<String>> {
        let store = self.data.store();

        let mut symbols = match mode {
            FetchMode::All => store.universe_symbols(&self.universe.excluded_series).await?,
            FetchMode::PopularOnly => {
                let popular = if self.universe.popular.is_empty() {
                    default_popular_symbols()
                } else {
                    self.universe.popular.clone()
                };
                let found = store.popular_symbols_in_universe(&popular).await?;
                if found.is_empty() {
                    tracing::info!("Universe has none of the popular symbols, using curated list");
                    popular
                } else {
                    found
                }
            }
        };

        if let Some(max) = max_stocks {
            if symbols.len() > max {
                tracing::info!("Limiting to first {} of {} symbols", max, symbols.len());
                symbols.truncate(max);
            }
        }

        Ok(symbols)
    }

    /// Fetch bars, compute SMAs and persist both, `store_batch_size` symbols at a time
    pub async fn fetch_and_store(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        let started_at = Utc::now();
        let period = request
            .period
            .clone()
            .unwrap_or_else(|| self.default_period.clone());

        let symbols = self.resolve_symbols(request.mode, request.max_stocks).await?;
        if symbols.is_empty() {
            return Err("no symbols to fetch; refresh the universe first".into());
        }

        tracing::info!(
            "🚀 Fetching {} symbols ({} history) via {}",
            symbols.len(),
            period,
            self.fetcher.source_name()
        );

        let mut outcome = FetchOutcome {
            source: self.fetcher.source_name().to_string(),
            mode: request.mode,
            period: period.clone(),
            symbols_requested: symbols.len(),
            symbols_stored: 0,
            symbols_failed: 0,
            symbols_illiquid: 0,
            price_rows: 0,
            indicator_rows: 0,
            invalid_bars: 0,
            started_at,
            finished_at: started_at,
        };

        for (chunk_idx, chunk) in symbols.chunks(self.store_batch_size).enumerate() {
            let report = self.fetcher.fetch_many(chunk, &period).await;
            outcome.symbols_failed += report.failed;
            outcome.symbols_illiquid += report.illiquid;
            outcome.invalid_bars += report.invalid_bars;

            if report.bars.is_empty() {
                tracing::warn!("No data fetched for chunk {}", chunk_idx + 1);
                continue;
            }

            let mut prices = Vec::with_capacity(report.total_bars());
            let mut indicators = Vec::with_capacity(report.total_bars());

            for (symbol, bars) in &report.bars {
                let existing = self.data.store().price_history(symbol, None).await?;
                indicators.extend(indicators_for_new_bars(&existing, bars));
                prices.extend(bars.iter().cloned());
            }

            self.data.store_prices(&prices, &indicators).await?;

            outcome.symbols_stored += report.succeeded;
            outcome.price_rows += prices.len();
            outcome.indicator_rows += indicators.len();

            tracing::info!(
                "✓ Chunk {} stored: {} price rows for {} symbols",
                chunk_idx + 1,
                prices.len(),
                report.succeeded
            );
        }

        outcome.finished_at = Utc::now();
        tracing::info!(
            "✅ Stored {} price rows for {} symbols ({} failed, {} illiquid)",
            outcome.price_rows,
            outcome.symbols_stored,
            outcome.symbols_failed,
            outcome.symbols_illiquid
        );

        Ok(outcome)
    }

    // ============== Screening queries ==============

    pub async fn stocks_above_sma(
        &self,
        period: SmaPeriod,
        max_distance: Option<f64>,
    ) -> Result<Vec<AboveSmaRow>> {
        let snapshots = self.data.latest_snapshots().await?;
        Ok(stocks_above_sma(&snapshots, period, max_distance))
    }

    /// `max_distance` defaults to the configured near-SMA band
    pub async fn stocks_near_sma(
        &self,
        period: SmaPeriod,
        max_distance: Option<f64>,
    ) -> Result<Vec<NearSmaRow>> {
        let snapshots = self.data.latest_snapshots().await?;
        let max_distance = max_distance.unwrap_or(self.analysis.near_sma_max_distance);
        Ok(stocks_near_sma(&snapshots, period, max_distance))
    }

    pub async fn open_high_patterns(&self) -> Result<Vec<OpenHighPattern>> {
        let snapshots = self.data.latest_snapshots().await?;
        Ok(open_high_patterns(&snapshots, self.analysis.open_high_tolerance))
    }

    pub async fn summary(&self, period: SmaPeriod) -> Result<Summary> {
        let snapshots = self.data.latest_snapshots().await?;
        let patterns = open_high_patterns(&snapshots, self.analysis.open_high_tolerance);
        Ok(summary(&snapshots, period, patterns.len()))
    }

    /// Drop stored rows older than `days_to_keep` (at least 30)
    pub async fn cleanup_old_data(&self, days_to_keep: i64) -> Result<CleanupStats> {
        if days_to_keep < MIN_RETENTION_DAYS {
            return Err(format!(
                "retention must be at least {} days, got {}",
                MIN_RETENTION_DAYS, days_to_keep
            )
            .into());
        }
        self.data.cleanup_old_data(days_to_keep).await
    }
}

/// Indicator rows for the dates in `fetched`, computed over stored history
/// with the fetched bars taking precedence
fn indicators_for_new_bars(existing: &[PriceBar], fetched: &[PriceBar]) -> Vec<IndicatorRow> {
    let Some(first_new) = fetched.iter().map(|bar| bar.date).min() else {
        return Vec::new();
    };

    let mut merged: BTreeMap<NaiveDate, PriceBar> = existing
        .iter()
        .map(|bar| (bar.date, bar.clone()))
        .collect();
    for bar in fetched {
        merged.insert(bar.date, bar.clone());
    }

    let history: Vec<PriceBar> = merged.into_values().collect();
    indicator_rows(&history)
        .into_iter()
        .filter(|row| row.date >= first_new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::SqliteStore;
    use crate::fetcher::SyntheticBars;
    use crate::models::ListedStock;
    use crate::settings::FetcherSettings;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.fetcher = FetcherSettings {
            request_delay_ms: 0,
            batch_pause_ms: 0,
            store_batch_size: 2,
            ..FetcherSettings::default()
        };
        settings
    }

    async fn analyzer(settings: &Settings) -> Analyzer {
        let store = SqliteStore::in_memory().await.unwrap();
        let data = CachedStore::new(store, Arc::new(MemoryCache::new()), Duration::from_secs(300));
        let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        let source = SyntheticBars::new(11).with_end_date(end);
        let fetcher = BulkFetcher::new(Arc::new(source), &settings.fetcher);
        Analyzer::new(data, fetcher, settings)
    }

    fn listed(symbol: &str, series: &str) -> ListedStock {
        ListedStock {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            series: series.to_string(),
            listing_date: None,
            isin: None,
            face_value: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_symbols_popular_fallback() {
        let settings = test_settings();
        let analyzer = analyzer(&settings).await;

        // Empty universe: curated list is used
        let symbols = analyzer
            .resolve_symbols(FetchMode::PopularOnly, Some(5))
            .await
            .unwrap();
        assert_eq!(symbols, vec!["RELIANCE", "TCS", "HDFCBANK", "INFY", "HINDUNILVR"]);

        assert!(analyzer
            .resolve_symbols(FetchMode::All, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_resolve_symbols_excludes_series() {
        let settings = test_settings();
        let analyzer = analyzer(&settings).await;
        analyzer
            .data()
            .upsert_universe(&[listed("TCS", "EQ"), listed("JUNK", "BE"), listed("ITC", "EQ")])
            .await
            .unwrap();

        let all = analyzer.resolve_symbols(FetchMode::All, None).await.unwrap();
        assert_eq!(all, vec!["ITC", "TCS"]);

        let popular = analyzer
            .resolve_symbols(FetchMode::PopularOnly, None)
            .await
            .unwrap();
        assert_eq!(popular, vec!["ITC", "TCS"]);
    }

    #[tokio::test]
    async fn test_fetch_and_store_with_synthetic_source() {
        let settings = test_settings();
        let analyzer = analyzer(&settings).await;

        let outcome = analyzer
            .fetch_and_store(&FetchRequest {
                mode: FetchMode::PopularOnly,
                max_stocks: Some(3),
                period: Some("6mo".into()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.source, "synthetic");
        assert_eq!(outcome.symbols_requested, 3);
        assert_eq!(outcome.symbols_stored, 3);
        assert_eq!(outcome.price_rows, outcome.indicator_rows);

        let summary = analyzer.summary(SmaPeriod::Twenty).await.unwrap();
        assert_eq!(summary.total_stocks, 3);
        assert!(summary.above_sma_20 <= 3);

        // 6 months of weekdays is enough for SMA(50) on the latest bar
        let snapshots = analyzer.data().latest_snapshots().await.unwrap();
        assert!(snapshots.iter().all(|s| s.sma_50.is_some() && s.prev_date.is_some()));
    }

    #[tokio::test]
    async fn test_fetch_with_empty_universe_fails() {
        let settings = test_settings();
        let analyzer = analyzer(&settings).await;
        let err = analyzer
            .fetch_and_store(&FetchRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no symbols"));
    }

    #[tokio::test]
    async fn test_cleanup_minimum_retention() {
        let settings = test_settings();
        let analyzer = analyzer(&settings).await;
        assert!(analyzer.cleanup_old_data(7).await.is_err());
        assert!(analyzer.cleanup_old_data(30).await.is_ok());
    }

    #[test]
    fn test_indicators_use_stored_history() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bar = |i: i64, close: f64| PriceBar {
            symbol: "LT".into(),
            date: start + ChronoDuration::days(i),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        };

        let existing: Vec<_> = (0..19).map(|i| bar(i, 10.0)).collect();
        // Day 18 gets revised, day 19 is new
        let fetched = vec![bar(18, 20.0), bar(19, 30.0)];

        let rows = indicators_for_new_bars(&existing, &fetched);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, start + ChronoDuration::days(18));
        assert!(rows[0].sma_20.is_none());
        // 18 tens, one 20, one 30
        assert_eq!(rows[1].sma_20, Some(11.5));
    }
}
