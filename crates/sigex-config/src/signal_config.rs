use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed, defaulted view of the `CC_*` configuration keys. The core
/// never reads environment variables itself — a host resolves `CC_*` keys
/// from its own environment/secrets layer and constructs this struct, or
/// deserializes it out of a [`crate::loader::LoadedConfig`]'s merged JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub schedule_await_minutes: u32,
    pub avg_price_candles_count: u32,
    pub percent_slippage: f64,
    pub percent_fee: f64,
    pub min_takeprofit_distance_percent: f64,
    pub min_stoploss_distance_percent: f64,
    pub max_stoploss_distance_percent: f64,
    pub max_signal_lifetime_minutes: u32,
    pub max_signal_generation_seconds: u32,
    pub get_candles_retry_count: u32,
    pub get_candles_retry_delay_ms: u64,
    pub max_candles_per_request: u32,
    pub get_candles_price_anomaly_threshold_factor: f64,
    pub get_candles_min_candles_for_median: u32,
    pub breakeven_threshold: f64,
    pub order_book_time_offset_minutes: u32,
    pub order_book_max_depth_levels: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            schedule_await_minutes: 120,
            avg_price_candles_count: 5,
            percent_slippage: 0.1,
            percent_fee: 0.1,
            min_takeprofit_distance_percent: 0.5,
            min_stoploss_distance_percent: 0.5,
            max_stoploss_distance_percent: 20.0,
            max_signal_lifetime_minutes: 1440,
            max_signal_generation_seconds: 180,
            get_candles_retry_count: 3,
            get_candles_retry_delay_ms: 5000,
            max_candles_per_request: 1000,
            get_candles_price_anomaly_threshold_factor: 1000.0,
            get_candles_min_candles_for_median: 5,
            breakeven_threshold: 0.2,
            order_book_time_offset_minutes: 10,
            order_book_max_depth_levels: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `CC_MIN_TAKEPROFIT_DISTANCE_PERCENT` must exceed `2*(slippage+fee)` or
    /// every immediate signal would be unprofitable after costs by
    /// construction.
    TakeProfitDistanceTooTight,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TakeProfitDistanceTooTight => write!(
                f,
                "CC_MIN_TAKEPROFIT_DISTANCE_PERCENT must exceed 2*(slippage+fee)"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SignalConfig {
    /// Startup validation: run once when a config is finalized, before
    /// any `SignalMachine` is constructed with it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cost_floor = 2.0 * (self.percent_slippage + self.percent_fee);
        if self.min_takeprofit_distance_percent <= cost_floor {
            return Err(ConfigError::TakeProfitDistanceTooTight);
        }
        Ok(())
    }

    /// Breakeven activation threshold: cost-covering buffer plus the
    /// configured extra margin.
    pub fn breakeven_activation_threshold(&self) -> f64 {
        2.0 * (self.percent_slippage + self.percent_fee) + self.breakeven_threshold
    }
}
