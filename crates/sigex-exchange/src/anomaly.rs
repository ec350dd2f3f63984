use sigex_types::Candle;

/// Drops candles whose typical price deviates from the batch's median
/// typical price by more than `threshold_factor`. Below
/// `min_candles_for_median` candles there isn't a meaningful median to
/// compare against, so the whole batch passes through unfiltered.
pub fn apply_anomaly_guard(
    candles: Vec<Candle>,
    threshold_factor: f64,
    min_candles_for_median: u32,
) -> Vec<Candle> {
    if candles.len() < min_candles_for_median as usize {
        return candles;
    }

    let mut typical_prices: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
    let median = median_of(&mut typical_prices);
    if median == 0.0 || !median.is_finite() {
        return candles;
    }

    candles
        .into_iter()
        .filter(|candle| {
            let deviation = (candle.typical_price() - median).abs() / median;
            deviation <= threshold_factor
        })
        .collect()
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = values.len();
    if len % 2 == 0 {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    } else {
        values[len / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(typical: f64) -> Candle {
        Candle {
            timestamp_ms: 0,
            open: typical,
            high: typical,
            low: typical,
            close: typical,
            volume: 1.0,
        }
    }

    #[test]
    fn below_minimum_passes_through_unfiltered() {
        let candles = vec![candle(100.0), candle(1_000_000.0)];
        let filtered = apply_anomaly_guard(candles.clone(), 1.0, 5);
        assert_eq!(filtered.len(), candles.len());
    }

    #[test]
    fn outlier_dropped_above_threshold() {
        let candles = vec![
            candle(100.0),
            candle(101.0),
            candle(99.0),
            candle(102.0),
            candle(1_000_000.0),
        ];
        let filtered = apply_anomaly_guard(candles, 1.0, 5);
        assert_eq!(filtered.len(), 4);
        assert!(filtered.iter().all(|c| c.typical_price() < 1000.0));
    }

    #[test]
    fn within_threshold_all_kept() {
        let candles = vec![
            candle(100.0),
            candle(101.0),
            candle(99.0),
            candle(102.0),
            candle(103.0),
        ];
        let filtered = apply_anomaly_guard(candles.clone(), 1000.0, 5);
        assert_eq!(filtered.len(), candles.len());
    }
}
