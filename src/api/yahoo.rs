use super::error::DataError;
use crate::models::PriceBar;
use crate::settings::ProviderSettings;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Ranges accepted by the chart endpoint
pub const VALID_PERIODS: &[&str] = &[
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

type ChartRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

// ============== Implementation ==============

/// Client for the Yahoo Finance v8 chart API (daily bars)
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    symbol_suffix: String,
    rate_limiter: Arc<ChartRateLimiter>,
    max_retries: u32,
    backoff_base: Duration,
}

impl YahooClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        let rpm = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            symbol_suffix: settings.symbol_suffix.clone(),
            rate_limiter,
            max_retries: settings.max_retries.max(1),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
        })
    }

    /// Point the client at a different host (used by tests against a mock server)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Exchange symbol → provider symbol (`RELIANCE` → `RELIANCE.NS`)
    pub fn provider_symbol(&self, symbol: &str) -> String {
        if self.symbol_suffix.is_empty() || symbol.ends_with(&self.symbol_suffix) {
            symbol.to_string()
        } else {
            format!("{}{}", symbol, self.symbol_suffix)
        }
    }

    fn chart_url(&self, provider_symbol: &str, period: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range={}&interval=1d&includePrePost=false",
            self.base_url, provider_symbol, period
        )
    }

    /// Make a rate-limited request with retry on 429, 5xx and network errors
    async fn make_request(&self, url: &str, symbol: &str) -> Result<reqwest::Response, DataError> {
        let mut rate_limited = false;

        for attempt in 1..=self.max_retries {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Err(DataError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                        if attempt < self.max_retries {
                            let backoff = retry_backoff(self.backoff_base, attempt);
                            tracing::warn!(
                                "HTTP {} for {}, retrying in {:?} (attempt {}/{})",
                                status,
                                symbol,
                                backoff,
                                attempt,
                                self.max_retries
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(DataError::Http {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < self.max_retries => {
                    let backoff = retry_backoff(self.backoff_base, attempt);
                    tracing::warn!(
                        "Network error for {}: {}, retrying in {:?} (attempt {}/{})",
                        symbol,
                        e,
                        backoff,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(DataError::Network(e)),
            }
        }

        if rate_limited {
            Err(DataError::RateLimited {
                attempts: self.max_retries,
            })
        } else {
            Err(DataError::RetriesExhausted(self.max_retries))
        }
    }

    /// Fetch daily bars for an exchange symbol over a Yahoo range such as `3mo`
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        period: &str,
    ) -> Result<Vec<PriceBar>, DataError> {
        if !VALID_PERIODS.contains(&period) {
            return Err(DataError::InvalidPeriod(period.to_string()));
        }

        let provider_symbol = self.provider_symbol(symbol);
        let url = self.chart_url(&provider_symbol, period);

        tracing::debug!("Fetching {} daily bars for {}", period, provider_symbol);

        let response = self.make_request(&url, symbol).await?;
        let chart: ChartResponse = response.json().await.map_err(|e| {
            DataError::ResponseFormat(format!("failed to parse chart for {}: {}", symbol, e))
        })?;

        let bars = parse_chart(symbol, chart)?;
        tracing::debug!("Fetched {} bars for {}", bars.len(), symbol);

        Ok(bars)
    }
}

/// `base * 2^attempt`, saturating instead of overflowing
fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Turn a chart response into bars, labelled with the exchange symbol
fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, DataError> {
    let result = match resp.chart.result {
        Some(result) => result,
        None => {
            return Err(match resp.chart.error {
                Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
                Some(err) => {
                    DataError::ResponseFormat(format!("{}: {}", err.code, err.description))
                }
                None => DataError::ResponseFormat("empty result with no error".into()),
            })
        }
    };

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| DataError::ResponseFormat("result array is empty".into()))?;

    // No timestamps means no trading in the requested range
    let timestamps = data.timestamp.unwrap_or_default();
    let gmtoffset = data.meta.map(|m| m.gmtoffset).unwrap_or(0);

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| DataError::ResponseFormat("no quote data".into()))?;

    let mut bars = Vec::with_capacity(timestamps.len());

    for (i, &ts) in timestamps.iter().enumerate() {
        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        // Holidays come back as all-null rows; partial rows are unusable too
        let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
            continue;
        };

        let date = chrono::DateTime::from_timestamp(ts + gmtoffset, 0)
            .map(|dt| dt.naive_utc().date())
            .ok_or_else(|| DataError::ResponseFormat(format!("invalid timestamp: {}", ts)))?;

        bars.push(PriceBar {
            symbol: symbol.to_string(),
            date,
            open,
            high,
            low,
            close,
            volume: volume.unwrap_or(0),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_settings() -> ProviderSettings {
        ProviderSettings {
            backoff_base_ms: 1,
            max_retries: 3,
            ..ProviderSettings::default()
        }
    }

    fn chart_body() -> String {
        // 2024-01-01 03:45 UTC, 2024-01-02 03:45 UTC (holiday row), 2024-01-03 03:45 UTC
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": { "gmtoffset": 19800 },
                    "timestamp": [1704080700, 1704167100, 1704253500],
                    "indicators": {
                        "quote": [{
                            "open":   [100.0, null, 102.0],
                            "high":   [105.0, null, 106.0],
                            "low":    [99.0,  null, 101.0],
                            "close":  [104.0, null, 105.5],
                            "volume": [120000, null, 98000]
                        }]
                    }
                }],
                "error": null
            }
        })
        .to_string()
    }

    #[test]
    fn test_provider_symbol_suffix() {
        let client = YahooClient::new(&test_settings()).unwrap();
        assert_eq!(client.provider_symbol("RELIANCE"), "RELIANCE.NS");
        assert_eq!(client.provider_symbol("TCS.NS"), "TCS.NS");
    }

    #[test]
    fn test_parse_chart_skips_null_rows() {
        let chart: ChartResponse = serde_json::from_str(&chart_body()).unwrap();
        let bars = parse_chart("INFY", chart).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].symbol, "INFY");
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(bars[0].close, 104.0);
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(bars[1].volume, 98000);
    }

    #[test]
    fn test_parse_chart_uses_exchange_local_date() {
        // 2024-01-01 20:00 UTC is 2024-01-02 01:30 IST
        let body = serde_json::json!({
            "chart": {
                "result": [{
                    "meta": { "gmtoffset": 19800 },
                    "timestamp": [1704139200],
                    "indicators": {
                        "quote": [{
                            "open": [100.0], "high": [101.0], "low": [99.0],
                            "close": [100.5], "volume": [1000]
                        }]
                    }
                }],
                "error": null
            }
        });
        let chart: ChartResponse = serde_json::from_value(body).unwrap();
        let bars = parse_chart("SBIN", chart).unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_retry_backoff_saturates() {
        let base = Duration::from_millis(1000);
        assert_eq!(retry_backoff(base, 1), Duration::from_secs(2));
        assert_eq!(retry_backoff(base, 3), Duration::from_secs(8));
        // 2^40 saturates to u32::MAX rather than overflowing
        assert_eq!(
            retry_backoff(base, 40),
            Duration::from_millis(1000 * u64::from(u32::MAX))
        );
        assert_eq!(retry_backoff(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_parse_chart_not_found_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let chart: ChartResponse = serde_json::from_str(body).unwrap();
        let err = parse_chart("GONE", chart).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_daily_bars_from_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v8/finance/chart/INFY.NS")
            .match_query(mockito::Matcher::UrlEncoded("range".into(), "3mo".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chart_body())
            .create_async()
            .await;

        let client = YahooClient::new(&test_settings())
            .unwrap()
            .with_base_url(&server.url());
        let bars = client.get_daily_bars("INFY", "3mo").await.unwrap();

        mock.assert_async().await;
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn test_retries_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("^/v8/finance/chart/TCS.NS".into()))
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = YahooClient::new(&test_settings())
            .unwrap()
            .with_base_url(&server.url());
        let err = client.get_daily_bars("TCS", "3mo").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DataError::RetriesExhausted(3)));
    }

    #[tokio::test]
    async fn test_rate_limited_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex("^/v8/finance/chart/ITC.NS".into()))
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let client = YahooClient::new(&test_settings())
            .unwrap()
            .with_base_url(&server.url());
        let err = client.get_daily_bars("ITC", "1mo").await.unwrap_err();

        assert!(matches!(err, DataError::RateLimited { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("^/v8/finance/chart/NOPE.NS".into()))
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = YahooClient::new(&test_settings())
            .unwrap()
            .with_base_url(&server.url());
        let err = client.get_daily_bars("NOPE", "3mo").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("^/v8/finance/chart/WIPRO.NS".into()))
            .with_status(403)
            .with_body("Forbidden")
            .expect(1)
            .create_async()
            .await;

        let client = YahooClient::new(&test_settings())
            .unwrap()
            .with_base_url(&server.url());
        let err = client.get_daily_bars("WIPRO", "3mo").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DataError::Http { status: 403, ref body } if body == "Forbidden"));
    }

    #[tokio::test]
    async fn test_invalid_period_rejected_without_request() {
        let client = YahooClient::new(&test_settings())
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = client.get_daily_bars("SBIN", "3weeks").await.unwrap_err();
        assert!(matches!(err, DataError::InvalidPeriod(_)));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_live_reliance_bars() {
        let client = YahooClient::new(&ProviderSettings::default()).unwrap();
        let bars = client.get_daily_bars("RELIANCE", "1mo").await.unwrap();
        assert!(bars.len() > 10, "Expected >10 bars, got {}", bars.len());
    }
}
