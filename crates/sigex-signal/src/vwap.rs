use sigex_types::Candle;

/// Volume-weighted average typical price over a candle window. Returns `None` on an empty window; falls back to a plain mean of
/// typical prices if every candle in the window reports zero volume (a
/// degenerate fixture, not a real market condition, but one that should
/// still produce a usable reference price rather than stalling the tick).
pub fn compute_vwap(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let total_volume: f64 = candles.iter().map(|c| c.volume).sum();
    if total_volume <= 0.0 {
        let sum: f64 = candles.iter().map(Candle::typical_price).sum();
        return Some(sum / candles.len() as f64);
    }
    let weighted: f64 = candles.iter().map(|c| c.typical_price() * c.volume).sum();
    Some(weighted / total_volume)
}
