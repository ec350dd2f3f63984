use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sigex_types::SignalDto;

/// The strategy adapter contract consumed by `tick()`: given a symbol
/// and the current evaluation time, return the signal to open next, or
/// `None` if there is nothing to do this tick.
///
/// `get_signal` is an explicit suspension point — it may call out to
/// arbitrary user code, so `StrategyHost` is the only caller allowed to
/// invoke it, and always does so under a timeout.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn get_signal(&self, symbol: &str, when: DateTime<Utc>) -> Option<SignalDto>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyHostError {
    NoStrategyRegistered,
    Timeout { seconds: u64 },
}

impl std::fmt::Display for StrategyHostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyHostError::NoStrategyRegistered => {
                write!(f, "no strategy registered on this host")
            }
            StrategyHostError::Timeout { seconds } => {
                write!(f, "getSignal exceeded the {seconds}s budget")
            }
        }
    }
}

impl std::error::Error for StrategyHostError {}

/// Owns exactly one [`Strategy`] implementation under a single-registration
/// rule: a host is built for one (symbol, strategy, exchange) combination
/// and never swaps strategies mid-flight. Registering
/// twice is a programmer error, not a recoverable one, so it panics — same
/// posture as the Tier-A "exactly one strategy" rule it's grounded on.
pub struct StrategyHost {
    strategy: Option<Arc<dyn Strategy>>,
    timeout: Duration,
}

impl StrategyHost {
    pub fn new(timeout: Duration) -> Self {
        StrategyHost {
            strategy: None,
            timeout,
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        assert!(
            self.strategy.is_none(),
            "StrategyHost already has a strategy registered"
        );
        self.strategy = Some(strategy);
    }

    pub fn is_registered(&self) -> bool {
        self.strategy.is_some()
    }

    /// Calls the registered strategy's `get_signal`, bounded by
    /// `CC_MAX_SIGNAL_GENERATION_SECONDS`. A timeout is reported as an
    /// error rather than silently treated as "no signal" — callers decide
    /// whether that's recoverable.
    pub async fn get_signal(
        &self,
        symbol: &str,
        when: DateTime<Utc>,
    ) -> Result<Option<SignalDto>, StrategyHostError> {
        let strategy = self
            .strategy
            .as_ref()
            .ok_or(StrategyHostError::NoStrategyRegistered)?;

        match tokio::time::timeout(self.timeout, strategy.get_signal(symbol, when)).await {
            Ok(dto) => Ok(dto),
            Err(_) => Err(StrategyHostError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigex_types::Direction;
    use tokio::time::sleep;

    struct Fixed(Option<SignalDto>);

    #[async_trait]
    impl Strategy for Fixed {
        async fn get_signal(&self, _symbol: &str, _when: DateTime<Utc>) -> Option<SignalDto> {
            self.0.clone()
        }
    }

    struct Slow;

    #[async_trait]
    impl Strategy for Slow {
        async fn get_signal(&self, _symbol: &str, _when: DateTime<Utc>) -> Option<SignalDto> {
            sleep(Duration::from_millis(50)).await;
            None
        }
    }

    fn dto() -> SignalDto {
        SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: 52000.0,
            price_stop_loss: 49000.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        }
    }

    #[tokio::test]
    async fn no_strategy_registered_errors() {
        let host = StrategyHost::new(Duration::from_secs(1));
        let err = host.get_signal("BTCUSDT", Utc::now()).await.unwrap_err();
        assert_eq!(err, StrategyHostError::NoStrategyRegistered);
    }

    #[tokio::test]
    async fn returns_registered_strategy_output() {
        let mut host = StrategyHost::new(Duration::from_secs(1));
        host.register(Arc::new(Fixed(Some(dto()))));
        let signal = host.get_signal("BTCUSDT", Utc::now()).await.unwrap();
        assert!(signal.is_some());
    }

    #[tokio::test]
    async fn times_out_past_budget() {
        let mut host = StrategyHost::new(Duration::from_millis(5));
        host.register(Arc::new(Slow));
        let err = host.get_signal("BTCUSDT", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StrategyHostError::Timeout { .. }));
    }

    #[tokio::test]
    #[should_panic(expected = "already has a strategy registered")]
    async fn double_registration_panics() {
        let mut host = StrategyHost::new(Duration::from_secs(1));
        host.register(Arc::new(Fixed(None)));
        host.register(Arc::new(Fixed(None)));
    }
}
