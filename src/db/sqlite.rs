use crate::models::{IndicatorRow, ListedStock, PriceBar, SymbolSnapshot};
use crate::Result;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;

/// Rows removed by a retention cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub prices_deleted: u64,
    pub indicators_deleted: u64,
}

/// SQLite store for the universe, daily prices and indicators
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and run migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database; lives as long as the store
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("SQLite schema up to date");
        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ============== Universe ==============

    /// Insert or replace listed stocks keyed by symbol
    pub async fn upsert_universe(&self, stocks: &[ListedStock]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for stock in stocks {
            sqlx::query(
                r#"
                INSERT INTO tradable_stocks (symbol, name, series, listing_date, isin, face_value)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (symbol) DO UPDATE SET
                    name = excluded.name,
                    series = excluded.series,
                    listing_date = excluded.listing_date,
                    isin = excluded.isin,
                    face_value = excluded.face_value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&stock.symbol)
            .bind(&stock.name)
            .bind(&stock.series)
            .bind(stock.listing_date)
            .bind(&stock.isin)
            .bind(stock.face_value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!("Upserted {} listed stocks", stocks.len());

        Ok(stocks.len())
    }

    /// Universe symbols outside the excluded series, alphabetical
    pub async fn universe_symbols(&self, excluded_series: &[String]) -> Result<Vec<String>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT DISTINCT symbol FROM tradable_stocks");

        if !excluded_series.is_empty() {
            builder.push(" WHERE series NOT IN (");
            let mut separated = builder.separated(", ");
            for series in excluded_series {
                separated.push_bind(series);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY symbol");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }

    /// The curated symbols that are present in the universe, alphabetical
    pub async fn popular_symbols_in_universe(&self, popular: &[String]) -> Result<Vec<String>> {
        if popular.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT DISTINCT symbol FROM tradable_stocks WHERE symbol IN (");
        let mut separated = builder.separated(", ");
        for symbol in popular {
            separated.push_bind(symbol);
        }
        separated.push_unseparated(") ORDER BY symbol");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }

    pub async fn universe_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM tradable_stocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    // ============== Prices ==============

    /// Insert bars, updating OHLCV in place for existing (symbol, date) rows
    pub async fn upsert_prices(&self, bars: &[PriceBar]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO stock_prices (symbol, date, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (symbol, date) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(&bar.symbol)
            .bind(bar.date)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Upserted {} price rows", bars.len());

        Ok(bars.len())
    }

    /// Most recent `limit` bars of a symbol, oldest first; `None` returns all
    pub async fn price_history(&self, symbol: &str, limit: Option<i64>) -> Result<Vec<PriceBar>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, date, open, high, low, close, volume
            FROM stock_prices
            WHERE symbol = ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        let mut bars: Vec<PriceBar> = rows.iter().map(price_from_row).collect();
        bars.reverse();
        Ok(bars)
    }

    /// Newest rows first, optionally for one symbol
    pub async fn latest_prices(&self, symbol: Option<&str>, limit: i64) -> Result<Vec<PriceBar>> {
        let rows = match symbol {
            Some(symbol) => {
                sqlx::query(
                    r#"
                    SELECT symbol, date, open, high, low, close, volume
                    FROM stock_prices
                    WHERE symbol = ?
                    ORDER BY date DESC
                    LIMIT ?
                    "#,
                )
                .bind(symbol)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT symbol, date, open, high, low, close, volume
                    FROM stock_prices
                    ORDER BY date DESC, symbol
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(price_from_row).collect())
    }

    /// Symbols that have at least one stored bar, alphabetical
    pub async fn symbols_with_data(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM stock_prices ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }

    pub async fn count_symbols_with_data(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(DISTINCT symbol) AS count FROM stock_prices")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    pub async fn latest_data_date(&self) -> Result<Option<NaiveDate>> {
        let row = sqlx::query("SELECT MAX(date) AS latest FROM stock_prices")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("latest"))
    }

    // ============== Indicators ==============

    /// Same upsert semantics as prices
    pub async fn upsert_indicators(&self, rows: &[IndicatorRow]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO stock_indicators (symbol, date, sma_20, sma_50)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (symbol, date) DO UPDATE SET
                    sma_20 = excluded.sma_20,
                    sma_50 = excluded.sma_50
                "#,
            )
            .bind(&row.symbol)
            .bind(row.date)
            .bind(row.sma_20)
            .bind(row.sma_50)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Upserted {} indicator rows", rows.len());

        Ok(rows.len())
    }

    /// Latest bar per symbol with its SMAs and the previous trading row
    pub async fn latest_snapshots(&self) -> Result<Vec<SymbolSnapshot>> {
        let rows = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT p.symbol, p.date, p.open, p.high, p.low, p.close, p.volume,
                       i.sma_20, i.sma_50,
                       ROW_NUMBER() OVER (PARTITION BY p.symbol ORDER BY p.date DESC) AS rn
                FROM stock_prices p
                LEFT JOIN stock_indicators i ON i.symbol = p.symbol AND i.date = p.date
            )
            SELECT t.symbol, t.date, t.open, t.high, t.low, t.close, t.volume,
                   t.sma_20, t.sma_50,
                   y.date AS prev_date, y.open AS prev_open, y.high AS prev_high,
                   y.close AS prev_close, y.sma_20 AS prev_sma_20, y.sma_50 AS prev_sma_50
            FROM ranked t
            LEFT JOIN ranked y ON y.symbol = t.symbol AND y.rn = 2
            WHERE t.rn = 1
            ORDER BY t.symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SymbolSnapshot {
                symbol: row.get("symbol"),
                date: row.get("date"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
                volume: row.get("volume"),
                sma_20: row.get("sma_20"),
                sma_50: row.get("sma_50"),
                prev_date: row.get("prev_date"),
                prev_open: row.get("prev_open"),
                prev_high: row.get("prev_high"),
                prev_close: row.get("prev_close"),
                prev_sma_20: row.get("prev_sma_20"),
                prev_sma_50: row.get("prev_sma_50"),
            })
            .collect())
    }

    // ============== Maintenance ==============

    /// Delete price and indicator rows older than `days_to_keep` days
    pub async fn cleanup_old_data(&self, days_to_keep: i64) -> Result<CleanupStats> {
        let cutoff = Utc::now().date_naive() - Duration::days(days_to_keep);
        self.cleanup_before(cutoff).await
    }

    /// Delete rows dated strictly before `cutoff`
    pub async fn cleanup_before(&self, cutoff: NaiveDate) -> Result<CleanupStats> {
        let mut tx = self.pool.begin().await?;

        let prices = sqlx::query("DELETE FROM stock_prices WHERE date < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        let indicators = sqlx::query("DELETE FROM stock_indicators WHERE date < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let stats = CleanupStats {
            prices_deleted: prices.rows_affected(),
            indicators_deleted: indicators.rows_affected(),
        };

        tracing::info!(
            "🧹 Cleaned up {} price records and {} indicator records older than {}",
            stats.prices_deleted,
            stats.indicators_deleted,
            cutoff
        );

        Ok(stats)
    }
}

fn price_from_row(row: &SqliteRow) -> PriceBar {
    PriceBar {
        symbol: row.get("symbol"),
        date: row.get("date"),
        open: row.get("open"),
        high: row.get("high"),
        low: row.get("low"),
        close: row.get("close"),
        volume: row.get("volume"),
    }
}
