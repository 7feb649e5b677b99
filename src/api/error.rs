use thiserror::Error;

/// Failures talking to an external data provider
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limited by provider after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("invalid period '{0}' (expected one of 1d,5d,1mo,3mo,6mo,1y,2y,5y,10y,ytd,max)")]
    InvalidPeriod(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed after {0} retries")]
    RetriesExhausted(u32),
}
