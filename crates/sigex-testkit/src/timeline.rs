use sigex_exchange::PaperExchange;
use sigex_types::Candle;

fn candle(ts_ms: i64, price: f64) -> Candle {
    Candle {
        timestamp_ms: ts_ms,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 1.0,
    }
}

/// `n` flat candles at `price`, one per minute, ending at `end_ts_ms`.
pub fn flat_candles(end_ts_ms: i64, minute_ms: i64, n: i64, price: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| candle(end_ts_ms - (n - 1 - i) * minute_ms, price))
        .collect()
}

/// `n` candles stepping linearly from `start_price` to `end_price`, one per
/// minute starting at `start_ts_ms` — for scenarios that need price to cross
/// a level at a known minute rather than jump there.
pub fn ramp_candles(
    start_ts_ms: i64,
    minute_ms: i64,
    n: i64,
    start_price: f64,
    end_price: f64,
) -> Vec<Candle> {
    if n <= 1 {
        return vec![candle(start_ts_ms, start_price)];
    }
    let step = (end_price - start_price) / (n - 1) as f64;
    (0..n)
        .map(|i| candle(start_ts_ms + i * minute_ms, start_price + step * i as f64))
        .collect()
}

/// Seeds `exchange` with a 5-candle flat history ending at `base`, the
/// shape every `SignalMachine` scenario test needs before its first tick so
/// the VWAP window is well-defined.
pub fn seed_flat_history(
    exchange: &PaperExchange,
    symbol: &str,
    base: i64,
    minute_ms: i64,
    price: f64,
) {
    for candle in flat_candles(base, minute_ms, 5, price) {
        exchange.push(symbol, candle);
    }
}
