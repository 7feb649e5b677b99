//! CSV export of screening results.
//!
//! The same writers back the dashboard download endpoints and the
//! `export` CLI command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::analysis::{AboveSmaRow, ExtensionBand, NearSmaRow, OpenHighPattern, PatternType};
use crate::models::SmaPeriod;

/// The downloadable result sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    AboveSma,
    NearSma,
    Patterns,
}

impl ExportKind {
    /// `stocks_above_20_sma_20240614.csv` and friends
    pub fn filename(self, period: SmaPeriod, date: NaiveDate) -> String {
        let stamp = date.format("%Y%m%d");
        match self {
            ExportKind::AboveSma => format!("stocks_above_{}_sma_{}.csv", period, stamp),
            ExportKind::NearSma => format!("near_{}_sma_{}.csv", period, stamp),
            ExportKind::Patterns => format!("breakout_patterns_{}.csv", stamp),
        }
    }
}

/// Prices and percentages are written with two decimals
fn two_dp<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{:.2}", value))
}

fn two_dp_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => two_dp(v, serializer),
        None => serializer.serialize_none(),
    }
}

const ABOVE_SMA_HEADER: [&str; 8] = [
    "symbol",
    "date",
    "close",
    "sma",
    "sma_period",
    "pct_above_sma",
    "status",
    "band",
];

const NEAR_SMA_HEADER: [&str; 8] = [
    "symbol",
    "date",
    "close",
    "sma",
    "sma_period",
    "pct_from_sma",
    "prev_close",
    "status",
];

const PATTERNS_HEADER: [&str; 8] = [
    "symbol",
    "pattern_type",
    "reference_date",
    "reference_open",
    "reference_high",
    "today_date",
    "today_close",
    "breakout_pct",
];

#[derive(Debug, Serialize)]
struct AboveSmaRecord<'a> {
    symbol: &'a str,
    date: NaiveDate,
    #[serde(serialize_with = "two_dp")]
    close: f64,
    #[serde(serialize_with = "two_dp")]
    sma: f64,
    sma_period: SmaPeriod,
    #[serde(serialize_with = "two_dp")]
    pct_above_sma: f64,
    status: &'static str,
    band: ExtensionBand,
}

impl<'a> From<&'a AboveSmaRow> for AboveSmaRecord<'a> {
    fn from(r: &'a AboveSmaRow) -> Self {
        Self {
            symbol: &r.symbol,
            date: r.date,
            close: r.close,
            sma: r.sma,
            sma_period: r.sma_period,
            pct_above_sma: r.pct_above_sma,
            status: r.status.label(),
            band: r.band,
        }
    }
}

#[derive(Debug, Serialize)]
struct NearSmaRecord<'a> {
    symbol: &'a str,
    date: NaiveDate,
    #[serde(serialize_with = "two_dp")]
    close: f64,
    #[serde(serialize_with = "two_dp")]
    sma: f64,
    sma_period: SmaPeriod,
    #[serde(serialize_with = "two_dp")]
    pct_from_sma: f64,
    #[serde(serialize_with = "two_dp_opt")]
    prev_close: Option<f64>,
    status: &'static str,
}

impl<'a> From<&'a NearSmaRow> for NearSmaRecord<'a> {
    fn from(r: &'a NearSmaRow) -> Self {
        Self {
            symbol: &r.symbol,
            date: r.date,
            close: r.close,
            sma: r.sma,
            sma_period: r.sma_period,
            pct_from_sma: r.pct_from_sma,
            prev_close: r.prev_close,
            status: r.status.label(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PatternRecord<'a> {
    symbol: &'a str,
    pattern_type: PatternType,
    reference_date: NaiveDate,
    #[serde(serialize_with = "two_dp")]
    reference_open: f64,
    #[serde(serialize_with = "two_dp")]
    reference_high: f64,
    today_date: NaiveDate,
    #[serde(serialize_with = "two_dp")]
    today_close: f64,
    #[serde(serialize_with = "two_dp")]
    breakout_pct: f64,
}

impl<'a> From<&'a OpenHighPattern> for PatternRecord<'a> {
    fn from(r: &'a OpenHighPattern) -> Self {
        Self {
            symbol: &r.symbol,
            pattern_type: r.pattern_type,
            reference_date: r.reference_date,
            reference_open: r.reference_open,
            reference_high: r.reference_high,
            today_date: r.today_date,
            today_close: r.today_close,
            breakout_pct: r.breakout_pct,
        }
    }
}

/// Serialize `records` under `header`; an empty set still gets the header line
fn write_csv<T, I>(header: &[&str], records: I) -> Result<String>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut records = records.into_iter().peekable();
    if records.peek().is_none() {
        wtr.write_record(header)?;
    }
    for record in records {
        wtr.serialize(record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: symbol, date, close, sma, sma_period, pct_above_sma, status, band
pub fn above_sma_csv(rows: &[AboveSmaRow]) -> Result<String> {
    write_csv(&ABOVE_SMA_HEADER, rows.iter().map(AboveSmaRecord::from))
}

/// Columns: symbol, date, close, sma, sma_period, pct_from_sma, prev_close, status
pub fn near_sma_csv(rows: &[NearSmaRow]) -> Result<String> {
    write_csv(&NEAR_SMA_HEADER, rows.iter().map(NearSmaRecord::from))
}

/// Columns: symbol, pattern_type, reference_date, reference_open,
/// reference_high, today_date, today_close, breakout_pct
pub fn patterns_csv(rows: &[OpenHighPattern]) -> Result<String> {
    write_csv(&PATTERNS_HEADER, rows.iter().map(PatternRecord::from))
}

/// Write every non-empty result set into `output_dir`; returns the files written
pub fn save_exports(
    output_dir: &Path,
    period: SmaPeriod,
    date: NaiveDate,
    above: &[AboveSmaRow],
    near: &[NearSmaRow],
    patterns: &[OpenHighPattern],
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create export dir: {}", output_dir.display()))?;

    let mut written = Vec::new();
    let sets = [
        (ExportKind::AboveSma, above.is_empty(), above_sma_csv(above)?),
        (ExportKind::NearSma, near.is_empty(), near_sma_csv(near)?),
        (ExportKind::Patterns, patterns.is_empty(), patterns_csv(patterns)?),
    ];

    for (kind, empty, csv) in sets {
        if empty {
            tracing::info!("Nothing to export for {:?}", kind);
            continue;
        }
        let path = output_dir.join(kind.filename(period, date));
        std::fs::write(&path, csv)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("✓ Exported {}", path.display());
        written.push(path);
    }

    Ok(written)
}
