//! `screener`: NSE stock screener CLI.
//!
//! Commands:
//! - `system-check`: database, provider and cache connectivity
//! - `refresh-universe`: download the exchange equity list
//! - `fetch`: pull daily bars, compute SMAs, store
//! - `cleanup`: drop rows past the retention window
//! - `screen`: print screening tables
//! - `export`: write screening results as CSV
//! - `serve`: run the web dashboard

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stock_screener::analysis::{Analyzer, FetchRequest};
use stock_screener::api::{NseClient, YahooClient};
use stock_screener::cache::{build_cache, CachedStore};
use stock_screener::dashboard::{self, AppState};
use stock_screener::db::SqliteStore;
use stock_screener::export::save_exports;
use stock_screener::fetcher::{BarSource, BulkFetcher, SyntheticBars};
use stock_screener::models::{FetchMode, SmaPeriod};
use stock_screener::settings::{load_settings, Settings};

const DEMO_SEED: u64 = 42;

#[derive(Parser)]
#[command(name = "screener", about = "NSE stock screener: SMA breakouts and open=high setups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check database, data provider and cache connectivity.
    SystemCheck,
    /// Download the exchange equity list into the universe table.
    RefreshUniverse,
    /// Fetch daily bars, compute moving averages and store them.
    Fetch {
        /// Only fetch the curated list of large, liquid stocks.
        #[arg(long, default_value_t = false)]
        popular_only: bool,

        /// Fetch at most this many symbols.
        #[arg(long)]
        limit: Option<usize>,

        /// History to request (1mo, 3mo, 6mo, 1y, ...).
        #[arg(long)]
        period: Option<String>,

        /// Use generated bars instead of the network.
        #[arg(long, default_value_t = false)]
        demo: bool,
    },
    /// Delete stored rows older than the retention window.
    Cleanup {
        /// Days of history to keep (minimum 30).
        #[arg(long)]
        days: Option<i64>,
    },
    /// Print stocks above / near their SMA and open=high breakouts.
    Screen {
        /// 20 or 50.
        #[arg(long, default_value = "20", value_parser = parse_sma_period)]
        sma_period: SmaPeriod,

        /// Near-SMA band in percent.
        #[arg(long)]
        max_distance: Option<f64>,

        /// Rows per table.
        #[arg(long, default_value_t = 25)]
        top: usize,
    },
    /// Write screening results as CSV files.
    Export {
        #[arg(long, default_value = "exports")]
        out: PathBuf,

        #[arg(long, default_value = "20", value_parser = parse_sma_period)]
        sma_period: SmaPeriod,
    },
    /// Run the web dashboard.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_sma_period(raw: &str) -> std::result::Result<SmaPeriod, String> {
    let days: u32 = raw
        .parse()
        .map_err(|_| format!("not a number: {}", raw))?;
    SmaPeriod::try_from(days)
}

fn boxed(err: Box<dyn std::error::Error + Send + Sync>) -> anyhow::Error {
    anyhow!(err)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = load_settings().context("failed to load settings")?;

    match cli.command {
        Commands::SystemCheck => system_check(&settings).await,
        Commands::RefreshUniverse => refresh_universe(&settings).await,
        Commands::Fetch {
            popular_only,
            limit,
            period,
            demo,
        } => {
            let mode = if popular_only {
                FetchMode::PopularOnly
            } else {
                FetchMode::All
            };
            fetch(&settings, mode, limit, period, demo).await
        }
        Commands::Cleanup { days } => {
            cleanup(&settings, days.unwrap_or(settings.analysis.cleanup_days)).await
        }
        Commands::Screen {
            sma_period,
            max_distance,
            top,
        } => screen(&settings, sma_period, max_distance, top).await,
        Commands::Export { out, sma_period } => export(&settings, &out, sma_period).await,
        Commands::Serve { host, port } => {
            let mut server = settings.server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            let analyzer = build_analyzer(&settings, false).await?;
            dashboard::run(&server, AppState::new(Arc::new(analyzer))).await
        }
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("stock_screener=info,screener=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::connect(&settings.database.url, settings.database.max_connections)
        .await
        .map_err(boxed)
        .with_context(|| format!("failed to open database {}", settings.database.url))
}

async fn build_analyzer(settings: &Settings, demo: bool) -> Result<Analyzer> {
    let store = connect_store(settings).await?;
    let cache = build_cache(&settings.cache).await;
    let data = CachedStore::new(store, cache, settings.cache.ttl());

    let source: Arc<dyn BarSource> = if demo {
        tracing::info!("🧪 Demo mode: generating synthetic bars");
        Arc::new(SyntheticBars::new(DEMO_SEED))
    } else {
        Arc::new(YahooClient::new(&settings.provider)?)
    };

    let fetcher = BulkFetcher::new(source, &settings.fetcher);
    Ok(Analyzer::new(data, fetcher, settings))
}

async fn system_check(settings: &Settings) -> Result<()> {
    tracing::info!("🔧 System check");
    tracing::info!("  Database: {}", settings.database.url);
    tracing::info!("  Provider: {}", settings.provider.base_url);
    tracing::info!(
        "  Batches: {} symbols, {}ms between requests, {}ms between batches",
        settings.fetcher.batch_size,
        settings.fetcher.request_delay_ms,
        settings.fetcher.batch_pause_ms
    );
    tracing::info!(
        "  Cache: {} (ttl {}s)",
        settings.cache.redis_url.as_deref().unwrap_or("in-memory"),
        settings.cache.ttl_secs
    );

    let mut failures = 0;

    match connect_store(settings).await {
        Ok(store) => {
            store.ping().await.map_err(boxed)?;
            let universe = store.universe_count().await.map_err(boxed)?;
            let with_data = store.count_symbols_with_data().await.map_err(boxed)?;
            let latest = store.latest_data_date().await.map_err(boxed)?;
            tracing::info!(
                "✓ Database OK: {} listed, {} with prices, latest {}",
                universe,
                with_data,
                latest.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
            );
        }
        Err(e) => {
            tracing::error!("✗ Database: {:#}", e);
            failures += 1;
        }
    }

    let provider = YahooClient::new(&settings.provider)?;
    match provider.get_daily_bars("RELIANCE", "5d").await {
        Ok(bars) => tracing::info!("✓ Provider OK: {} bars for RELIANCE", bars.len()),
        Err(e) => {
            tracing::error!("✗ Provider: {}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} check(s) failed", failures));
    }
    tracing::info!("✅ All checks passed");
    Ok(())
}

async fn refresh_universe(settings: &Settings) -> Result<()> {
    let analyzer = build_analyzer(settings, false).await?;
    let client = NseClient::new(
        &settings.universe.equity_list_url,
        &settings.universe.fallback_list_url,
    )?;

    let count = analyzer
        .refresh_universe(&client)
        .await
        .map_err(boxed)
        .context("universe refresh failed")?;
    tracing::info!("✅ Universe updated: {} stocks", count);
    Ok(())
}

async fn fetch(
    settings: &Settings,
    mode: FetchMode,
    max_stocks: Option<usize>,
    period: Option<String>,
    demo: bool,
) -> Result<()> {
    let analyzer = build_analyzer(settings, demo).await?;
    let outcome = analyzer
        .fetch_and_store(&FetchRequest {
            mode,
            max_stocks,
            period,
        })
        .await
        .map_err(boxed)
        .context("fetch failed")?;

    let elapsed = outcome.finished_at - outcome.started_at;
    println!(
        "Fetched {}/{} symbols ({} failed, {} illiquid), {} rows, {} bad bars, {}s",
        outcome.symbols_stored,
        outcome.symbols_requested,
        outcome.symbols_failed,
        outcome.symbols_illiquid,
        outcome.price_rows,
        outcome.invalid_bars,
        elapsed.num_seconds()
    );
    Ok(())
}

async fn cleanup(settings: &Settings, days: i64) -> Result<()> {
    let analyzer = build_analyzer(settings, false).await?;
    let stats = analyzer.cleanup_old_data(days).await.map_err(boxed)?;
    println!(
        "Removed {} price rows and {} indicator rows older than {} days",
        stats.prices_deleted, stats.indicators_deleted, days
    );
    Ok(())
}

async fn screen(
    settings: &Settings,
    period: SmaPeriod,
    max_distance: Option<f64>,
    top: usize,
) -> Result<()> {
    let analyzer = build_analyzer(settings, false).await?;

    let summary = analyzer.summary(period).await.map_err(boxed)?;
    if summary.total_stocks == 0 {
        println!("No price data stored yet. Run `screener fetch` first.");
        return Ok(());
    }

    println!(
        "\n📊 {} stocks as of {} | above SMA20: {} | above SMA50: {} | open=high: {} | momentum {:.1}%",
        summary.total_stocks,
        summary
            .latest_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
        summary.above_sma_20,
        summary.above_sma_50,
        summary.open_high_patterns,
        summary.momentum_pct
    );

    let above = analyzer.stocks_above_sma(period, None).await.map_err(boxed)?;
    println!("\n🚀 Above SMA {} ({} total)", period, above.len());
    println!(
        "{:<14} {:>10} {:>10} {:>8}  {:<22} {}",
        "SYMBOL", "CLOSE", "SMA", "%ABOVE", "STATUS", "BAND"
    );
    for row in above.iter().take(top) {
        println!(
            "{:<14} {:>10.2} {:>10.2} {:>8.2}  {:<22} {:?}",
            row.symbol, row.close, row.sma, row.pct_above_sma, row.status, row.band
        );
    }

    let near = analyzer
        .stocks_near_sma(period, max_distance)
        .await
        .map_err(boxed)?;
    println!("\n🎯 Near SMA {} ({} total)", period, near.len());
    println!(
        "{:<14} {:>10} {:>10} {:>8}  {}",
        "SYMBOL", "CLOSE", "SMA", "DIST%", "STATUS"
    );
    for row in near.iter().take(top) {
        println!(
            "{:<14} {:>10.2} {:>10.2} {:>8.2}  {}",
            row.symbol, row.close, row.sma, row.pct_from_sma, row.status
        );
    }

    let patterns = analyzer.open_high_patterns().await.map_err(boxed)?;
    println!("\n📈 Open=High breakouts ({} total)", patterns.len());
    println!(
        "{:<14} {:<34} {:>10} {:>10} {:>8}",
        "SYMBOL", "PATTERN", "HIGH", "CLOSE", "BREAK%"
    );
    for p in patterns.iter().take(top) {
        println!(
            "{:<14} {:<34} {:>10.2} {:>10.2} {:>8.2}",
            p.symbol,
            format!("{:?}", p.pattern_type),
            p.reference_high,
            p.today_close,
            p.breakout_pct
        );
    }

    Ok(())
}

async fn export(settings: &Settings, out: &Path, period: SmaPeriod) -> Result<()> {
    let analyzer = build_analyzer(settings, false).await?;

    let above = analyzer.stocks_above_sma(period, None).await.map_err(boxed)?;
    let near = analyzer.stocks_near_sma(period, None).await.map_err(boxed)?;
    let patterns = analyzer.open_high_patterns().await.map_err(boxed)?;

    let written = save_exports(out, period, Utc::now().date_naive(), &above, &near, &patterns)?;
    if written.is_empty() {
        println!("Nothing to export. Run `screener fetch` first.");
    }
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
