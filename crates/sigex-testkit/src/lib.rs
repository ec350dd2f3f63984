//! Shared scenario-test fixtures: a deterministic strategy adapter
//! plus candle-fixture builders, so `sigex-backtest`/`sigex-live` scenario
//! tests never touch the real filesystem or wall clock beyond what
//! `tempfile`/an explicit `DateTime` already isolate. `sigex-exchange`'s
//! `PaperExchange` is the in-memory exchange adapter used alongside these.

mod scripted_strategy;
mod timeline;

pub use scripted_strategy::ScriptedStrategy;
pub use timeline::{flat_candles, ramp_candles, seed_flat_history};
