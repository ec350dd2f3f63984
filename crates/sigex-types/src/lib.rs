//! Shared domain types for the signal lifecycle core.
//!
//! Every other crate in this workspace depends on this one; it carries no
//! behavior, only the data shapes the signal machine, the risk gate, the
//! orchestrators, and the persistence layer all agree on.

mod candle;
mod context;
mod frame;
mod position;
mod signal;
mod tick;

pub use candle::Candle;
pub use context::SignalContext;
pub use frame::{Frame, FrameInterval};
pub use position::ActivePosition;
pub use signal::{Direction, PartialCloseError, PartialKind, PartialLogEntry, Signal, SignalDto};
pub use tick::{CancelReason, CloseReason, TickResult};
