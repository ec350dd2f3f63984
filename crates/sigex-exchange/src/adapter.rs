use async_trait::async_trait;

use sigex_types::Candle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    Unavailable(String),
    UnknownSymbol(String),
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::Unavailable(msg) => write!(f, "exchange unavailable: {msg}"),
            ExchangeError::UnknownSymbol(symbol) => write!(f, "unknown symbol: {symbol}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// The exchange-data adapter contract. Only the contract is in scope —
/// the actual HTTP/DB-backed implementation behind it is a Non-goal; this
/// crate ships the trait plus a deterministic in-memory implementation for
/// tests and backtests (see [`crate::paper::PaperExchange`]).
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Candles strictly before or at `since_ts_ms`, most recent `limit`.
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        since_ts_ms: i64,
        limit: u32,
        backtest: bool,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Candles at or after `since_ts_ms`. In live mode this is equivalent to
    /// `get_candles` with `since = now()`.
    async fn get_next_candles(
        &self,
        symbol: &str,
        interval: &str,
        since_ts_ms: i64,
        limit: u32,
        backtest: bool,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Exchange-precision price formatting, default 2 decimals if the
    /// implementation has no symbol-specific rule.
    fn format_price(&self, symbol: &str, value: f64, backtest: bool) -> String {
        let _ = (symbol, backtest);
        format!("{value:.2}")
    }

    /// Exchange-precision quantity formatting, default 8 decimals.
    fn format_quantity(&self, symbol: &str, value: f64, backtest: bool) -> String {
        let _ = (symbol, backtest);
        format!("{value:.8}")
    }

    /// Optional passive order-book read, consumed by user strategy code only
    /// — the core never calls this itself.
    async fn get_order_book(
        &self,
        _symbol: &str,
        _depth: u32,
        _from_ts_ms: i64,
        _to_ts_ms: i64,
        _backtest: bool,
    ) -> Result<Vec<(f64, f64)>, ExchangeError> {
        Ok(Vec::new())
    }
}
