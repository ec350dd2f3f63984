//! Historical strategy execution: fast-forwards a `SignalMachine`
//! through a `Frame`'s timeline instead of ticking it timestamp by
//! timestamp in real time.

mod facade;
mod orchestrator;

pub use facade::Backtest;
pub use orchestrator::BacktestOrchestrator;
