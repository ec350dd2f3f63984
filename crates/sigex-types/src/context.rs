use serde::{Deserialize, Serialize};

/// The (symbol, strategy, exchange, frame) identity a `SignalMachine` is
/// instantiated for. Frame is only meaningful in backtest; live machines
/// carry an empty frame name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalContext {
    pub symbol: String,
    pub strategy: String,
    pub exchange: String,
    pub frame: String,
    /// The risk profile this context's signals are checked against.
    pub risk: String,
}

impl SignalContext {
    pub fn new(
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        exchange: impl Into<String>,
        frame: impl Into<String>,
        risk: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
            exchange: exchange.into(),
            frame: frame.into(),
            risk: risk.into(),
        }
    }

    /// RiskGate active-position key: `"{strategy}:{exchange}:{symbol}"`.
    pub fn position_key(&self) -> String {
        format!("{}:{}:{}", self.strategy, self.exchange, self.symbol)
    }

    /// Persistence entity-directory key: `"{symbol}_{strategy}_{exchange}"`.
    pub fn entity_key(&self) -> String {
        format!("{}_{}_{}", self.symbol, self.strategy, self.exchange)
    }
}
