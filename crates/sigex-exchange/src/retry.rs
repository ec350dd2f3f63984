use std::time::Duration;

use tracing::warn;

use sigex_config::SignalConfig;
use sigex_types::Candle;

use crate::adapter::{Exchange, ExchangeError};
use crate::anomaly::apply_anomaly_guard;

/// Fetches candles with the configured retry budget, then
/// applies the anomaly guard to whatever batch finally comes back. A
/// recoverable exchange failure surfaces only once every attempt has
/// been exhausted.
#[allow(clippy::too_many_arguments)]
pub async fn get_candles_with_retry(
    exchange: &dyn Exchange,
    symbol: &str,
    interval: &str,
    since_ts_ms: i64,
    limit: u32,
    backtest: bool,
    cfg: &SignalConfig,
) -> Result<Vec<Candle>, ExchangeError> {
    let mut last_err = None;
    for attempt in 0..=cfg.get_candles_retry_count {
        match exchange
            .get_candles(symbol, interval, since_ts_ms, limit, backtest)
            .await
        {
            Ok(candles) => {
                return Ok(apply_anomaly_guard(
                    candles,
                    cfg.get_candles_price_anomaly_threshold_factor,
                    cfg.get_candles_min_candles_for_median,
                ))
            }
            Err(err) => {
                warn!(symbol, attempt, error = %err, "get_candles attempt failed");
                last_err = Some(err);
                if attempt < cfg.get_candles_retry_count {
                    tokio::time::sleep(Duration::from_millis(cfg.get_candles_retry_delay_ms)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or(ExchangeError::Unavailable("no attempts made".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyThenOk {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
    }

    #[async_trait]
    impl Exchange for FlakyThenOk {
        async fn get_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _since_ts_ms: i64,
            _limit: u32,
            _backtest: bool,
        ) -> Result<Vec<Candle>, ExchangeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(ExchangeError::Unavailable("flaky".into()))
            } else {
                Ok(vec![])
            }
        }

        async fn get_next_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _since_ts_ms: i64,
            _limit: u32,
            _backtest: bool,
        ) -> Result<Vec<Candle>, ExchangeError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let cfg = SignalConfig {
            get_candles_retry_count: 3,
            get_candles_retry_delay_ms: 1,
            ..Default::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let exchange = FlakyThenOk {
            calls: calls.clone(),
            fail_times: 2,
        };
        let result = get_candles_with_retry(&exchange, "BTCUSDT", "1m", 0, 10, true, &cfg).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_budget_and_reports_error() {
        let cfg = SignalConfig {
            get_candles_retry_count: 1,
            get_candles_retry_delay_ms: 1,
            ..Default::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let exchange = FlakyThenOk {
            calls: calls.clone(),
            fail_times: 100,
        };
        let result = get_candles_with_retry(&exchange, "BTCUSDT", "1m", 0, 10, true, &cfg).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
