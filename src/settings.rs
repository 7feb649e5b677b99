//! Layered application settings.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `config/base.toml` (optional)
//! 3. `config/{APP_ENVIRONMENT}.toml` (optional)
//! 4. environment variables such as `SCREENER__DATABASE__URL`

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub provider: ProviderSettings,
    pub fetcher: FetcherSettings,
    pub cache: CacheSettings,
    pub server: ServerSettings,
    pub universe: UniverseSettings,
    pub analysis: AnalysisSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://tradable_stocks.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub symbol_suffix: String,
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com".to_string(),
            symbol_suffix: ".NS".to_string(),
            requests_per_minute: 600,
            max_retries: 3,
            backoff_base_ms: 1000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    pub batch_size: usize,
    pub request_delay_ms: u64,
    pub batch_pause_ms: u64,
    pub min_bars: usize,
    pub period: String,
    pub store_batch_size: usize,
    /// Minimum average daily traded value (close × volume) in lakh rupees;
    /// 0 keeps every symbol
    pub min_daily_value_lakhs: f64,
}

impl FetcherSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            request_delay_ms: 50,
            batch_pause_ms: 1000,
            min_bars: 5,
            period: "3mo".to_string(),
            store_batch_size: 100,
            min_daily_value_lakhs: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    /// When set, query results are cached in Redis instead of process memory
    pub redis_url: Option<String>,
    pub key_prefix: String,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            redis_url: None,
            key_prefix: "screener".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UniverseSettings {
    pub equity_list_url: String,
    pub fallback_list_url: String,
    pub excluded_series: Vec<String>,
    pub popular: Vec<String>,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            equity_list_url: "https://archives.nseindia.com/content/equities/EQUITY_L.csv"
                .to_string(),
            fallback_list_url: "https://archives.nseindia.com/products/content/sec_bhavdata_full.csv"
                .to_string(),
            excluded_series: vec!["BE".to_string(), "BZ".to_string()],
            popular: default_popular_symbols(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub near_sma_max_distance: f64,
    pub open_high_tolerance: f64,
    pub cleanup_days: i64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            near_sma_max_distance: 5.0,
            open_high_tolerance: 0.001,
            cleanup_days: 90,
        }
    }
}

/// Large, liquid NSE names that reliably have chart data
pub fn default_popular_symbols() -> Vec<String> {
    [
        "RELIANCE", "TCS", "HDFCBANK", "INFY", "HINDUNILVR", "ICICIBANK", "KOTAKBANK",
        "BHARTIARTL", "ITC", "SBIN", "BAJFINANCE", "ASIANPAINT", "MARUTI", "AXISBANK", "LT",
        "TITAN", "NESTLEIND", "ULTRACEMCO", "WIPRO", "ONGC", "TECHM", "SUNPHARMA", "POWERGRID",
        "NTPC", "COALINDIA", "TATAMOTORS", "BAJAJFINSV", "HCLTECH", "DRREDDY", "BRITANNIA",
        "EICHERMOT", "ADANIPORTS", "JSWSTEEL", "GRASIM", "CIPLA", "TATASTEEL", "BPCL",
        "HEROMOTOCO", "DIVISLAB", "INDUSINDBK", "ADANIENT", "APOLLOHOSP", "TATACONSUM",
        "BAJAJ-AUTO", "HINDALCO", "SHREECEM", "UPL", "SBILIFE", "HDFCLIFE", "PIDILITIND",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Load settings from files and environment
pub fn load_settings() -> Result<Settings, SettingsError> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name("config/base").required(false))
        .add_source(File::with_name(&format!("config/{}", environment)).required(false))
        .add_source(
            Environment::with_prefix("SCREENER")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("universe.excluded_series")
                .with_list_parse_key("universe.popular")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.fetcher.batch_size, 50);
        assert_eq!(settings.fetcher.request_delay(), Duration::from_millis(50));
        assert_eq!(settings.fetcher.batch_pause(), Duration::from_secs(1));
        assert_eq!(settings.fetcher.min_bars, 5);
        assert_eq!(settings.fetcher.min_daily_value_lakhs, 10.0);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(300));
        assert_eq!(settings.universe.excluded_series, vec!["BE", "BZ"]);
        assert_eq!(settings.universe.popular.len(), 50);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                "[fetcher]\nbatch_size = 10\n[server]\nport = 9000\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.fetcher.batch_size, 10);
        assert_eq!(settings.fetcher.request_delay_ms, 50);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert!(settings.cache.redis_url.is_none());
    }
}
