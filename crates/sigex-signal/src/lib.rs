//! The signal lifecycle state machine: the core of this workspace.
//! A `SignalMachine` owns one pending-or-scheduled signal at a time for a
//! given (symbol, strategy, exchange, frame) and advances it one `tick` at a
//! time; `sigex-backtest`/`sigex-live` drive it from an orchestrator loop.

mod evaluate;
mod machine;
mod partial_close;
mod pnl;
mod trailing;
mod vwap;

pub use evaluate::{entry_reached, progress_percent, sl_crossed, tp_crossed};
pub use machine::{SignalApiError, SignalMachine};
pub use partial_close::{apply_partial_close, PartialCloseRejection};
pub use pnl::{
    adjusted_close, adjusted_open, pnl_percent, raw_move_percent, weighted_realized_pnl,
};
pub use trailing::{apply_trailing, TrailingKind, TrailingRejection};
pub use vwap::compute_vwap;
