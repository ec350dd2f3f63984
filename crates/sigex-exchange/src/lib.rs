//! Exchange-data adapter contract plus a deterministic in-memory
//! implementation for tests and backtests. The real HTTP/DB-backed adapter
//! implementation is a Non-goal — only the contract it must satisfy lives
//! here.

mod adapter;
mod anomaly;
mod paper;
mod retry;

pub use adapter::{Exchange, ExchangeError};
pub use anomaly::apply_anomaly_guard;
pub use paper::PaperExchange;
pub use retry::get_candles_with_retry;
