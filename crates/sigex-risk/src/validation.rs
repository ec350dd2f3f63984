use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use sigex_types::{ActivePosition, SignalDto};

/// A risk-validation rejection: either a structured `{id, note}` or
/// the shorthand bare string a validation function may return instead —
/// normalized here to one shape so `RiskGate` doesn't need to special-case
/// either form.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskRejection {
    pub id: Option<String>,
    pub note: String,
}

impl From<&str> for RiskRejection {
    fn from(note: &str) -> Self {
        RiskRejection {
            id: None,
            note: note.to_string(),
        }
    }
}

impl From<String> for RiskRejection {
    fn from(note: String) -> Self {
        RiskRejection { id: None, note }
    }
}

/// Everything a validation function needs to decide, per the `validate(...)`
/// contract.
pub struct ValidationArgs<'a> {
    pub symbol: &'a str,
    pub strategy: &'a str,
    pub exchange: &'a str,
    pub risk: &'a str,
    pub frame: &'a str,
    pub pending_signal: &'a SignalDto,
    pub current_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl<'a> ValidationArgs<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: &'a str,
        strategy: &'a str,
        exchange: &'a str,
        risk: &'a str,
        frame: &'a str,
        pending_signal: &'a SignalDto,
        current_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        ValidationArgs {
            symbol,
            strategy,
            exchange,
            risk,
            frame,
            pending_signal,
            current_price,
            timestamp,
        }
    }

    pub fn position_key(&self) -> String {
        format!("{}:{}:{}", self.strategy, self.exchange, self.symbol)
    }
}

/// One configured validation function, invoked in registration order with
/// short-circuit-on-first-rejection semantics. Held as a boxed trait
/// object — selected once at risk-profile setup, cached for the life of
/// the `RiskGate`.
pub type ValidationFn = Arc<
    dyn Fn(
            &ValidationArgs<'_>,
            usize,
            &HashMap<String, ActivePosition>,
        ) -> Result<(), RiskRejection>
        + Send
        + Sync,
>;
