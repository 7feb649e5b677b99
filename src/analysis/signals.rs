use crate::indicators::{pct_from_sma, sma_series};
use crate::models::{BreakoutStatus, IndicatorRow, PriceBar, SmaPeriod, SymbolSnapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// SMA(20) and SMA(50) for every bar, sorted by date
pub fn indicator_rows(bars: &[PriceBar]) -> Vec<IndicatorRow> {
    let mut sorted: Vec<&PriceBar> = bars.iter().collect();
    sorted.sort_by_key(|bar| bar.date);

    let closes: Vec<f64> = sorted.iter().map(|bar| bar.close).collect();
    let sma_20 = sma_series(&closes, SmaPeriod::Twenty.days());
    let sma_50 = sma_series(&closes, SmaPeriod::Fifty.days());

    sorted
        .iter()
        .zip(sma_20)
        .zip(sma_50)
        .map(|((bar, sma_20), sma_50)| IndicatorRow {
            symbol: bar.symbol.clone(),
            date: bar.date,
            sma_20,
            sma_50,
        })
        .collect()
}

/// Side of the SMA today vs the previous trading day
///
/// A missing previous value is treated as being on the same side as today.
pub fn classify(
    prev_close: Option<f64>,
    prev_sma: Option<f64>,
    close: f64,
    sma: f64,
) -> BreakoutStatus {
    let above_now = close > sma;
    let above_before = match (prev_close, prev_sma) {
        (Some(prev_close), Some(prev_sma)) => prev_close > prev_sma,
        _ => above_now,
    };

    match (above_now, above_before) {
        (true, false) => BreakoutStatus::FreshBreakoutAbove,
        (true, true) => BreakoutStatus::HoldingAbove,
        (false, true) => BreakoutStatus::FreshBreakdownBelow,
        (false, false) => BreakoutStatus::HoldingBelow,
    }
}

/// How stretched a stock above its SMA is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionBand {
    /// ≤ 3% above
    Fresh,
    /// 3-8% above
    Moderate,
    /// > 8% above
    Extended,
}

impl ExtensionBand {
    pub fn from_pct(pct_above: f64) -> Self {
        if pct_above <= 3.0 {
            ExtensionBand::Fresh
        } else if pct_above <= 8.0 {
            ExtensionBand::Moderate
        } else {
            ExtensionBand::Extended
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AboveSmaRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub sma: f64,
    pub sma_period: SmaPeriod,
    pub pct_above_sma: f64,
    pub status: BreakoutStatus,
    pub band: ExtensionBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearSmaRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub sma: f64,
    pub sma_period: SmaPeriod,
    pub pct_from_sma: f64,
    pub prev_close: Option<f64>,
    pub prev_sma: Option<f64>,
    pub status: BreakoutStatus,
}

/// Latest close above its SMA, optionally capped at `max_distance` percent above
///
/// Sorted by distance above the SMA, largest first.
pub fn stocks_above_sma(
    snapshots: &[SymbolSnapshot],
    period: SmaPeriod,
    max_distance: Option<f64>,
) -> Vec<AboveSmaRow> {
    let mut rows: Vec<AboveSmaRow> = snapshots
        .iter()
        .filter_map(|snap| {
            let sma = snap.sma(period)?;
            if snap.close <= sma {
                return None;
            }

            let pct = pct_from_sma(snap.close, sma);
            if max_distance.is_some_and(|max| pct > max) {
                return None;
            }

            Some(AboveSmaRow {
                symbol: snap.symbol.clone(),
                date: snap.date,
                close: snap.close,
                sma,
                sma_period: period,
                pct_above_sma: pct,
                status: classify(snap.prev_close, snap.prev_sma(period), snap.close, sma),
                band: ExtensionBand::from_pct(pct),
            })
        })
        .collect();

    rows.sort_by(|a, b| b.pct_above_sma.total_cmp(&a.pct_above_sma));
    rows
}

/// Stocks within `max_distance` percent of their SMA on either side
///
/// Fresh breakouts come first, then everything else by closeness to the SMA.
pub fn stocks_near_sma(
    snapshots: &[SymbolSnapshot],
    period: SmaPeriod,
    max_distance: f64,
) -> Vec<NearSmaRow> {
    let mut rows: Vec<NearSmaRow> = snapshots
        .iter()
        .filter_map(|snap| {
            let sma = snap.sma(period)?;
            let pct = pct_from_sma(snap.close, sma);
            if pct.abs() > max_distance {
                return None;
            }

            let prev_sma = snap.prev_sma(period);
            Some(NearSmaRow {
                symbol: snap.symbol.clone(),
                date: snap.date,
                close: snap.close,
                sma,
                sma_period: period,
                pct_from_sma: pct,
                prev_close: snap.prev_close,
                prev_sma,
                status: classify(snap.prev_close, prev_sma, snap.close, sma),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        let a_fresh = a.status == BreakoutStatus::FreshBreakoutAbove;
        let b_fresh = b.status == BreakoutStatus::FreshBreakoutAbove;
        match b_fresh.cmp(&a_fresh) {
            Ordering::Equal => a.pct_from_sma.abs().total_cmp(&b.pct_from_sma.abs()),
            other => other,
        }
    });
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Previous session opened at its high; today closed above that high
    YesterdayOpenHighTodayAbove,
    /// Today opened at its high and is trading above it
    TodayOpenHighNowAbove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenHighPattern {
    pub symbol: String,
    pub pattern_type: PatternType,
    /// Session whose open matched its high
    pub reference_date: NaiveDate,
    pub reference_open: f64,
    pub reference_high: f64,
    pub today_date: NaiveDate,
    pub today_close: f64,
    pub breakout_pct: f64,
}

/// `|open - high| < high * tolerance`
pub fn is_open_high(open: f64, high: f64, tolerance: f64) -> bool {
    (open - high).abs() < high * tolerance
}

/// Open=high setups on the latest two trading rows, strongest breakout first
pub fn open_high_patterns(snapshots: &[SymbolSnapshot], tolerance: f64) -> Vec<OpenHighPattern> {
    let mut patterns = Vec::new();

    for snap in snapshots {
        if let (Some(prev_date), Some(prev_open), Some(prev_high)) =
            (snap.prev_date, snap.prev_open, snap.prev_high)
        {
            if is_open_high(prev_open, prev_high, tolerance) && snap.close > prev_high {
                patterns.push(OpenHighPattern {
                    symbol: snap.symbol.clone(),
                    pattern_type: PatternType::YesterdayOpenHighTodayAbove,
                    reference_date: prev_date,
                    reference_open: prev_open,
                    reference_high: prev_high,
                    today_date: snap.date,
                    today_close: snap.close,
                    breakout_pct: (snap.close - prev_high) / prev_high * 100.0,
                });
            }
        }

        if is_open_high(snap.open, snap.high, tolerance) && snap.close > snap.high {
            patterns.push(OpenHighPattern {
                symbol: snap.symbol.clone(),
                pattern_type: PatternType::TodayOpenHighNowAbove,
                reference_date: snap.date,
                reference_open: snap.open,
                reference_high: snap.high,
                today_date: snap.date,
                today_close: snap.close,
                breakout_pct: (snap.close - snap.high) / snap.high * 100.0,
            });
        }
    }

    patterns.sort_by(|a, b| b.breakout_pct.total_cmp(&a.breakout_pct));
    patterns
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub fresh_breakout_above: usize,
    pub holding_above: usize,
    pub fresh_breakdown_below: usize,
    pub holding_below: usize,
}

impl StatusCounts {
    fn record(&mut self, status: BreakoutStatus) {
        match status {
            BreakoutStatus::FreshBreakoutAbove => self.fresh_breakout_above += 1,
            BreakoutStatus::HoldingAbove => self.holding_above += 1,
            BreakoutStatus::FreshBreakdownBelow => self.fresh_breakdown_below += 1,
            BreakoutStatus::HoldingBelow => self.holding_below += 1,
        }
    }
}

/// Dashboard headline numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub sma_period: SmaPeriod,
    pub latest_date: Option<NaiveDate>,
    pub total_stocks: usize,
    pub above_sma_20: usize,
    pub above_sma_50: usize,
    /// Above the selected period's SMA
    pub above_selected: usize,
    pub open_high_patterns: usize,
    /// Share of stocks above SMA(20), in percent
    pub momentum_pct: f64,
    pub pattern_pct: f64,
    pub status_counts: StatusCounts,
}

pub fn summary(snapshots: &[SymbolSnapshot], period: SmaPeriod, pattern_count: usize) -> Summary {
    let above = |p: SmaPeriod| {
        snapshots
            .iter()
            .filter(|s| s.sma(p).is_some_and(|sma| s.close > sma))
            .count()
    };

    let mut status_counts = StatusCounts::default();
    for snap in snapshots {
        if let Some(sma) = snap.sma(period) {
            status_counts.record(classify(snap.prev_close, snap.prev_sma(period), snap.close, sma));
        }
    }

    let total = snapshots.len();
    let above_sma_20 = above(SmaPeriod::Twenty);
    let pct = |n: usize| {
        if total == 0 {
            0.0
        } else {
            n as f64 / total as f64 * 100.0
        }
    };

    Summary {
        sma_period: period,
        latest_date: snapshots.iter().map(|s| s.date).max(),
        total_stocks: total,
        above_sma_20,
        above_sma_50: above(SmaPeriod::Fifty),
        above_selected: above(period),
        open_high_patterns: pattern_count,
        momentum_pct: pct(above_sma_20),
        pattern_pct: pct(pattern_count),
        status_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn snap(symbol: &str, close: f64, sma_20: Option<f64>) -> SymbolSnapshot {
        SymbolSnapshot {
            symbol: symbol.to_string(),
            date: date(10),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1000,
            sma_20,
            sma_50: None,
            prev_date: Some(date(7)),
            prev_open: Some(close * 0.99),
            prev_high: Some(close * 1.02),
            prev_close: Some(close),
            prev_sma_20: sma_20,
            prev_sma_50: None,
        }
    }

    #[test]
    fn test_classify_all_states() {
        assert_eq!(
            classify(Some(99.0), Some(100.0), 101.0, 100.0),
            BreakoutStatus::FreshBreakoutAbove
        );
        assert_eq!(
            classify(Some(102.0), Some(100.0), 101.0, 100.0),
            BreakoutStatus::HoldingAbove
        );
        assert_eq!(
            classify(Some(101.0), Some(100.0), 99.0, 100.0),
            BreakoutStatus::FreshBreakdownBelow
        );
        assert_eq!(
            classify(Some(98.0), Some(100.0), 99.0, 100.0),
            BreakoutStatus::HoldingBelow
        );
    }

    #[test]
    fn test_classify_close_equal_to_sma_is_not_above() {
        assert_eq!(
            classify(Some(101.0), Some(100.0), 100.0, 100.0),
            BreakoutStatus::FreshBreakdownBelow
        );
        assert_eq!(
            classify(Some(100.0), Some(100.0), 101.0, 100.0),
            BreakoutStatus::FreshBreakoutAbove
        );
    }

    #[test]
    fn test_classify_without_previous_is_holding() {
        assert_eq!(classify(None, None, 101.0, 100.0), BreakoutStatus::HoldingAbove);
        assert_eq!(classify(Some(90.0), None, 99.0, 100.0), BreakoutStatus::HoldingBelow);
    }

    #[test]
    fn test_indicator_rows_sorted_with_warmup() {
        let start = date(1);
        let mut bars: Vec<PriceBar> = (0..25)
            .map(|i| PriceBar {
                symbol: "TCS".into(),
                date: start + Duration::days(i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: (i + 1) as f64,
                volume: 0,
            })
            .collect();
        bars.reverse();

        let rows = indicator_rows(&bars);
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0].date, start);
        assert!(rows[18].sma_20.is_none());
        // mean of 1..=20
        assert_eq!(rows[19].sma_20, Some(10.5));
        assert!(rows.iter().all(|r| r.sma_50.is_none()));
    }

    #[test]
    fn test_stocks_above_sma_sorted_and_capped() {
        let snapshots = vec![
            snap("A", 102.0, Some(100.0)),
            snap("B", 110.0, Some(100.0)),
            snap("C", 95.0, Some(100.0)),
            snap("D", 104.0, Some(100.0)),
            snap("E", 200.0, None),
        ];

        let rows = stocks_above_sma(&snapshots, SmaPeriod::Twenty, None);
        let symbols: Vec<_> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["B", "D", "A"]);
        assert_eq!(rows[0].band, ExtensionBand::Extended);
        assert_eq!(rows[1].band, ExtensionBand::Moderate);
        assert_eq!(rows[2].band, ExtensionBand::Fresh);

        let capped = stocks_above_sma(&snapshots, SmaPeriod::Twenty, Some(5.0));
        assert_eq!(capped.len(), 2);

        assert!(stocks_above_sma(&snapshots, SmaPeriod::Fifty, None).is_empty());
    }

    #[test]
    fn test_stocks_near_sma_fresh_first() {
        let mut fresh = snap("FRESH", 104.0, Some(100.0));
        fresh.prev_close = Some(99.0);

        let snapshots = vec![
            snap("FAR", 120.0, Some(100.0)),
            snap("CLOSE", 100.5, Some(100.0)),
            snap("BELOW", 97.0, Some(100.0)),
            fresh,
        ];

        let rows = stocks_near_sma(&snapshots, SmaPeriod::Twenty, 5.0);
        let symbols: Vec<_> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["FRESH", "CLOSE", "BELOW"]);
        assert_eq!(rows[0].status, BreakoutStatus::FreshBreakoutAbove);
        assert_eq!(rows[2].status, BreakoutStatus::HoldingBelow);
    }

    #[test]
    fn test_is_open_high_tolerance() {
        assert!(is_open_high(100.0, 100.05, 0.001));
        assert!(!is_open_high(99.8, 100.0, 0.001));
    }

    #[test]
    fn test_yesterday_open_high_pattern() {
        let mut s = snap("SBIN", 612.0, None);
        s.prev_open = Some(600.0);
        s.prev_high = Some(600.0);

        let patterns = open_high_patterns(&[s], 0.001);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::YesterdayOpenHighTodayAbove);
        assert_eq!(patterns[0].reference_date, date(7));
        assert!((patterns[0].breakout_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_yesterday_pattern_requires_close_above_high() {
        let mut s = snap("SBIN", 599.0, None);
        s.prev_open = Some(600.0);
        s.prev_high = Some(600.0);
        assert!(open_high_patterns(&[s], 0.001).is_empty());
    }

    #[test]
    fn test_today_open_high_pattern() {
        let mut s = snap("ITC", 452.0, None);
        s.open = 450.0;
        s.high = 450.2;
        s.prev_date = None;
        s.prev_open = None;
        s.prev_high = None;

        let patterns = open_high_patterns(&[s], 0.001);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, PatternType::TodayOpenHighNowAbove);
        assert_eq!(patterns[0].reference_date, patterns[0].today_date);
    }

    #[test]
    fn test_summary_counts() {
        let mut fresh = snap("FRESH", 104.0, Some(100.0));
        fresh.prev_close = Some(99.0);
        let snapshots = vec![
            snap("UP", 110.0, Some(100.0)),
            snap("DOWN", 90.0, Some(100.0)),
            snap("NOSMA", 90.0, None),
            fresh,
        ];

        let s = summary(&snapshots, SmaPeriod::Twenty, 1);
        assert_eq!(s.total_stocks, 4);
        assert_eq!(s.above_sma_20, 2);
        assert_eq!(s.above_sma_50, 0);
        assert_eq!(s.above_selected, 2);
        assert_eq!(s.open_high_patterns, 1);
        assert!((s.momentum_pct - 50.0).abs() < 1e-9);
        assert!((s.pattern_pct - 25.0).abs() < 1e-9);
        assert_eq!(s.status_counts.fresh_breakout_above, 1);
        assert_eq!(s.status_counts.holding_above, 1);
        assert_eq!(s.status_counts.holding_below, 1);
        assert_eq!(s.latest_date, Some(date(10)));
    }

    #[test]
    fn test_summary_empty() {
        let s = summary(&[], SmaPeriod::Fifty, 0);
        assert_eq!(s.total_stocks, 0);
        assert_eq!(s.momentum_pct, 0.0);
        assert!(s.latest_date.is_none());
    }
}
