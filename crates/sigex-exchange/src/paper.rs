use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use sigex_types::Candle;

use crate::adapter::{Exchange, ExchangeError};

/// Deterministic in-memory exchange adapter: candles are pre-seeded by the
/// caller (a fixture or a backtest loader), keyed by symbol and timestamp,
/// and served back with no
/// randomness or wall-clock dependence — every call is reproducible.
#[derive(Default)]
pub struct PaperExchange {
    candles: Mutex<BTreeMap<String, BTreeMap<i64, Candle>>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        PaperExchange::default()
    }

    /// Seeds one symbol's full candle history. Idempotent: a later call with
    /// the same symbol replaces the prior set.
    pub fn seed(&self, symbol: impl Into<String>, candles: impl IntoIterator<Item = Candle>) {
        let map = candles
            .into_iter()
            .map(|candle| (candle.timestamp_ms, candle))
            .collect();
        self.candles.lock().unwrap().insert(symbol.into(), map);
    }

    pub fn push(&self, symbol: impl Into<String>, candle: Candle) {
        self.candles
            .lock()
            .unwrap()
            .entry(symbol.into())
            .or_default()
            .insert(candle.timestamp_ms, candle);
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_candles(
        &self,
        symbol: &str,
        _interval: &str,
        since_ts_ms: i64,
        limit: u32,
        _backtest: bool,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let guard = self.candles.lock().unwrap();
        let Some(series) = guard.get(symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        };
        let mut out: Vec<Candle> = series
            .range(..=since_ts_ms)
            .map(|(_, candle)| *candle)
            .collect();
        if out.len() > limit as usize {
            out = out.split_off(out.len() - limit as usize);
        }
        Ok(out)
    }

    async fn get_next_candles(
        &self,
        symbol: &str,
        _interval: &str,
        since_ts_ms: i64,
        limit: u32,
        _backtest: bool,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let guard = self.candles.lock().unwrap();
        let Some(series) = guard.get(symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        };
        let out: Vec<Candle> = series
            .range(since_ts_ms..)
            .take(limit as usize)
            .map(|(_, candle)| *candle)
            .collect();
        Ok(out)
    }
}
