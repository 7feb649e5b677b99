/// Calculate Simple Moving Average (SMA) of the most recent `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Rolling SMA over a whole price series
///
/// Element `i` is the mean of `prices[i + 1 - period..=i]`, or `None` while
/// fewer than `period` prices are available.
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    if period == 0 {
        out.resize(prices.len(), None);
        return out;
    }

    let mut window_sum = 0.0;
    for (i, price) in prices.iter().enumerate() {
        window_sum += price;
        if i >= period {
            window_sum -= prices[i - period];
        }

        if i + 1 >= period {
            out.push(Some(window_sum / period as f64));
        } else {
            out.push(None);
        }
    }

    out
}

/// Percentage distance of `close` from `sma`
pub fn pct_from_sma(close: f64, sma: f64) -> f64 {
    (close - sma) / sma * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_sma_uses_latest_window() {
        let prices = vec![1.0, 2.0, 3.0, 10.0, 20.0];
        assert_eq!(calculate_sma(&prices, 2), Some(15.0));
    }

    #[test]
    fn test_sma_series_warmup() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let series = sma_series(&prices, 3);

        assert_eq!(series.len(), 5);
        assert_eq!(series[0], None);
        assert_eq!(series[1], None);
        assert_eq!(series[2], Some(2.0));
        assert_eq!(series[3], Some(3.0));
        assert_eq!(series[4], Some(4.0));
    }

    #[test]
    fn test_sma_series_matches_point_sma() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let series = sma_series(&prices, 20);

        for end in 20..=prices.len() {
            let expected = calculate_sma(&prices[..end], 20).unwrap();
            let actual = series[end - 1].unwrap();
            assert!((expected - actual).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pct_from_sma() {
        assert!((pct_from_sma(105.0, 100.0) - 5.0).abs() < 1e-12);
        assert!((pct_from_sma(95.0, 100.0) + 5.0).abs() < 1e-12);
    }
}
