use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::Direction;

/// A position RiskGate tracks as open, from `Opened` until `Closed`.
/// Keyed externally by `SignalContext::position_key()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePosition {
    pub strategy: String,
    pub exchange: String,
    pub frame: String,
    pub symbol: String,
    pub direction: Direction,
    pub price_open: f64,
    pub price_stop_loss: f64,
    pub price_take_profit: f64,
    pub minute_estimated_time: u32,
    pub open_timestamp: DateTime<Utc>,
}
