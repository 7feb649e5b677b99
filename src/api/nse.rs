use super::error::DataError;
use crate::models::ListedStock;
use chrono::NaiveDate;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Downloads the exchange master equity list
pub struct NseClient {
    client: Client,
    primary_url: String,
    fallback_url: String,
}

impl NseClient {
    pub fn new(primary_url: &str, fallback_url: &str) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
        })
    }

    /// Fetch the equity list, trying the fallback URL when the primary fails
    pub async fn fetch_equity_list(&self) -> Result<Vec<ListedStock>, DataError> {
        match self.download(&self.primary_url).await {
            Ok(stocks) => Ok(stocks),
            Err(e) => {
                tracing::warn!(
                    "Primary equity list failed ({}), trying {}",
                    e,
                    self.fallback_url
                );
                self.download(&self.fallback_url).await
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<ListedStock>, DataError> {
        tracing::info!("📥 Downloading equity list from {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let stocks = parse_equity_csv(&text)?;

        tracing::info!("✓ Parsed {} listed stocks", stocks.len());
        Ok(stocks)
    }
}

/// Header → snake_case: trim, collapse runs of whitespace, `-`, `.` and `&`
/// into `_`, lowercase, strip stray underscores.
pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.trim().chars() {
        if ch.is_whitespace() || matches!(ch, '-' | '.' | '&' | '_') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }

    out
}

/// Parse `DD-MON-YYYY` (case-insensitive month) or ISO dates
pub fn parse_listing_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(raw, "%d-%b-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Parse an equity list or bhav copy CSV into listed stocks
///
/// Only `symbol` and `series` are required. Duplicate symbols keep their
/// first row.
pub fn parse_equity_csv(text: &str) -> Result<Vec<ListedStock>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_column_name)
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);

    let symbol_idx = column("symbol")
        .ok_or_else(|| DataError::ResponseFormat("equity list has no SYMBOL column".into()))?;
    let series_idx = column("series")
        .ok_or_else(|| DataError::ResponseFormat("equity list has no SERIES column".into()))?;
    let name_idx = column("name_of_company");
    let listing_idx = column("date_of_listing");
    let isin_idx = column("isin_number");
    let face_idx = column("face_value");

    let mut seen = HashSet::new();
    let mut stocks = Vec::new();

    for record in reader.records() {
        let record = record?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let Some(symbol) = field(Some(symbol_idx)) else {
            continue;
        };
        if !seen.insert(symbol.to_string()) {
            continue;
        }

        stocks.push(ListedStock {
            symbol: symbol.to_string(),
            name: field(name_idx).unwrap_or(symbol).to_string(),
            series: field(Some(series_idx)).unwrap_or_default().to_string(),
            listing_date: field(listing_idx).and_then(parse_listing_date),
            isin: field(isin_idx).map(str::to_string),
            face_value: field(face_idx).and_then(|v| v.parse().ok()),
        });
    }

    Ok(stocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EQUITY_L: &str = "\
SYMBOL,NAME OF COMPANY, SERIES, DATE OF LISTING, PAID UP VALUE, MARKET LOT, ISIN NUMBER, FACE VALUE
20MICRONS,20 Microns Limited,EQ,06-OCT-2008,5,1,INE144J01027,5
RELIANCE,Reliance Industries Limited,EQ,29-NOV-1995,10,1,INE002A01018,10
ZZBAD,Some Limited,BE,not-a-date,1,1,INE000000000,
";

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name(" NAME OF COMPANY"), "name_of_company");
        assert_eq!(normalize_column_name("ISIN NUMBER "), "isin_number");
        assert_eq!(normalize_column_name("M&A - Value."), "m_a_value");
        assert_eq!(normalize_column_name("__Already_Snake__"), "already_snake");
    }

    #[test]
    fn test_parse_listing_date() {
        assert_eq!(
            parse_listing_date("06-OCT-2008"),
            NaiveDate::from_ymd_opt(2008, 10, 6)
        );
        assert_eq!(
            parse_listing_date("2004-08-25"),
            NaiveDate::from_ymd_opt(2004, 8, 25)
        );
        assert_eq!(parse_listing_date("garbage"), None);
        assert_eq!(parse_listing_date(""), None);
    }

    #[test]
    fn test_parse_equity_csv() {
        let stocks = parse_equity_csv(EQUITY_L).unwrap();
        assert_eq!(stocks.len(), 3);

        let reliance = &stocks[1];
        assert_eq!(reliance.symbol, "RELIANCE");
        assert_eq!(reliance.name, "Reliance Industries Limited");
        assert_eq!(reliance.series, "EQ");
        assert_eq!(reliance.listing_date, NaiveDate::from_ymd_opt(1995, 11, 29));
        assert_eq!(reliance.isin.as_deref(), Some("INE002A01018"));
        assert_eq!(reliance.face_value, Some(10.0));

        let bad = &stocks[2];
        assert_eq!(bad.series, "BE");
        assert!(bad.listing_date.is_none());
        assert!(bad.face_value.is_none());
    }

    #[test]
    fn test_parse_bhav_style_csv_dedupes_symbols() {
        let bhav = "SYMBOL, SERIES, DATE1, CLOSE_PRICE\nTCS, EQ, 17-Oct-2026, 4000\nTCS, BL, 17-Oct-2026, 4001\n";
        let stocks = parse_equity_csv(bhav).unwrap();
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].name, "TCS");
        assert_eq!(stocks[0].series, "EQ");
    }

    #[test]
    fn test_missing_symbol_column_is_format_error() {
        let err = parse_equity_csv("TICKER,SERIES\nABC,EQ\n").unwrap_err();
        assert!(matches!(err, DataError::ResponseFormat(_)));
    }

    #[tokio::test]
    async fn test_fallback_url_used_when_primary_fails() {
        let mut server = mockito::Server::new_async().await;
        let _primary = server
            .mock("GET", "/EQUITY_L.csv")
            .with_status(403)
            .create_async()
            .await;
        let fallback = server
            .mock("GET", "/bhav.csv")
            .with_status(200)
            .with_body("SYMBOL,SERIES\nINFY,EQ\n")
            .create_async()
            .await;

        let client = NseClient::new(
            &format!("{}/EQUITY_L.csv", server.url()),
            &format!("{}/bhav.csv", server.url()),
        )
        .unwrap();
        let stocks = client.fetch_equity_list().await.unwrap();

        fallback.assert_async().await;
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].symbol, "INFY");
    }
}
