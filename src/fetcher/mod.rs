// Bulk price fetching with batching and politeness delays

pub mod synthetic;
pub mod validator;

pub use synthetic::SyntheticBars;
pub use validator::BarValidator;

use crate::api::{DataError, YahooClient};
use crate::models::PriceBar;
use crate::settings::FetcherSettings;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Anything that can produce daily bars for an exchange symbol
#[async_trait]
pub trait BarSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_bars(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>, DataError>;
}

#[async_trait]
impl BarSource for YahooClient {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_bars(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>, DataError> {
        self.get_daily_bars(symbol, period).await
    }
}

/// Outcome of a bulk fetch
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    /// Validated bars per symbol, oldest first
    #[serde(skip)]
    pub bars: BTreeMap<String, Vec<PriceBar>>,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Fetched fine but traded below the liquidity floor
    pub illiquid: usize,
    pub invalid_bars: usize,
}

/// Mean of close × volume, in lakh rupees (1 lakh = 100,000)
pub fn average_daily_value_lakhs(bars: &[PriceBar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let total: f64 = bars.iter().map(|bar| bar.close * bar.volume as f64).sum();
    Some(total / bars.len() as f64 / 100_000.0)
}

impl FetchReport {
    pub fn total_bars(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }
}

/// Fetches many symbols from a `BarSource`, in batches
pub struct BulkFetcher {
    source: Arc<dyn BarSource>,
    validator: BarValidator,
    batch_size: usize,
    request_delay: Duration,
    batch_pause: Duration,
    min_bars: usize,
    min_daily_value_lakhs: f64,
}

impl BulkFetcher {
    pub fn new(source: Arc<dyn BarSource>, settings: &FetcherSettings) -> Self {
        Self {
            source,
            validator: BarValidator::new(),
            batch_size: settings.batch_size.max(1),
            request_delay: settings.request_delay(),
            batch_pause: settings.batch_pause(),
            min_bars: settings.min_bars,
            min_daily_value_lakhs: settings.min_daily_value_lakhs,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch every symbol; individual failures are counted, never fatal
    pub async fn fetch_many(&self, symbols: &[String], period: &str) -> FetchReport {
        let total = symbols.len();
        let mut report = FetchReport {
            requested: total,
            ..FetchReport::default()
        };

        tracing::info!(
            "📊 Fetching {} symbols from {} ({} per batch)",
            total,
            self.source.name(),
            self.batch_size
        );

        for (batch_idx, batch) in symbols.chunks(self.batch_size).enumerate() {
            let batch_start = batch_idx * self.batch_size;
            let batch_end = batch_start + batch.len();
            tracing::info!(
                "Processing batch {}: symbols {}-{}",
                batch_idx + 1,
                batch_start + 1,
                batch_end
            );

            for (i, symbol) in batch.iter().enumerate() {
                let progress = batch_start + i + 1;
                tracing::debug!("Progress: {}/{} - {}", progress, total, symbol);

                match self.fetch_one(symbol, period, &mut report.invalid_bars).await {
                    Some(bars) if !self.is_liquid(symbol, &bars) => report.illiquid += 1,
                    Some(bars) => {
                        report.succeeded += 1;
                        report.bars.insert(symbol.clone(), bars);
                    }
                    None => report.failed += 1,
                }

                if progress < total {
                    tokio::time::sleep(self.request_delay).await;
                }
            }

            if batch_end < total {
                tracing::debug!("Batch completed, pausing {:?}", self.batch_pause);
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        tracing::info!(
            "✓ Fetch completed: {}/{} ok, {} failed, {} illiquid, {} invalid bars dropped",
            report.succeeded,
            total,
            report.failed,
            report.illiquid,
            report.invalid_bars
        );

        report
    }

    async fn fetch_one(
        &self,
        symbol: &str,
        period: &str,
        invalid_bars: &mut usize,
    ) -> Option<Vec<PriceBar>> {
        let mut bars = match self.source.fetch_bars(symbol, period).await {
            Ok(bars) => bars,
            Err(e) => {
                tracing::debug!("✗ {}: {}", symbol, e);
                return None;
            }
        };

        let before = bars.len();
        bars.retain(|bar| match self.validator.validate(bar) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping invalid bar: {}", e);
                false
            }
        });
        *invalid_bars += before - bars.len();

        bars.sort_by_key(|bar| bar.date);
        bars.dedup_by_key(|bar| bar.date);

        if bars.len() < self.min_bars {
            tracing::debug!(
                "✗ {}: insufficient data ({} trading days, need {})",
                symbol,
                bars.len(),
                self.min_bars
            );
            return None;
        }

        tracing::debug!("✓ Fetched {} bars for {}", bars.len(), symbol);
        Some(bars)
    }

    fn is_liquid(&self, symbol: &str, bars: &[PriceBar]) -> bool {
        if self.min_daily_value_lakhs <= 0.0 {
            return true;
        }
        match average_daily_value_lakhs(bars) {
            Some(value) if value < self.min_daily_value_lakhs => {
                tracing::debug!(
                    "✗ {}: avg daily value {:.2}L below {:.2}L",
                    symbol,
                    value,
                    self.min_daily_value_lakhs
                );
                false
            }
            _ => true,
        }
    }
}
