use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::context::SignalContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short — the sign used throughout the PnL formulas.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// What a strategy's `getSignal` call returns: either nothing, or a proposal
/// for a new signal. `price_open` present means "scheduled" (entry-price
/// hint); absent means "immediate" (open at next tick's VWAP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDto {
    pub direction: Direction,
    pub price_open: Option<f64>,
    pub price_take_profit: f64,
    pub price_stop_loss: f64,
    pub minute_estimated_time: u32,
    pub note: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialKind {
    Profit,
    Loss,
}

/// One entry in a signal's `_partial` log — the source of truth for every
/// partial close. `_tpClosed`/`_slClosed`/`_totalClosed` are derived from
/// this log, never stored independently; see `Signal::tp_closed` etc.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialLogEntry {
    pub kind: PartialKind,
    pub percent: f64,
    pub price: f64,
}

/// Raised by `Signal::append_partial` when a partial close would violate an
/// invariant. Kept local to this type, as a small transition-error enum
/// living beside the state it governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialCloseError {
    PercentOutOfRange,
    ExceedsTotal,
}

impl fmt::Display for PartialCloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialCloseError::PercentOutOfRange => {
                write!(f, "partial close percent must be in (0, 100]")
            }
            PartialCloseError::ExceedsTotal => {
                write!(f, "partial close would push total closed above 100%")
            }
        }
    }
}

impl std::error::Error for PartialCloseError {}

/// The central entity: a signal in one of its pending-or-scheduled states.
/// `Signal` itself only carries data and the invariants that are purely a
/// function of its own fields (partial-log bookkeeping, effective SL/TP);
/// the tick evaluation order and every cross-entity rule (RiskGate,
/// trailing acceptance, breakeven) live in `sigex-signal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub context: SignalContext,
    pub direction: Direction,

    pub price_open: f64,
    pub price_take_profit: f64,
    pub price_stop_loss: f64,

    /// Preserved for reporting even after `trailing_*` mutations.
    pub original_take_profit: f64,
    pub original_stop_loss: f64,

    pub trailing_stop_loss: Option<f64>,
    pub trailing_take_profit: Option<f64>,

    pub minute_estimated_time: u32,

    pub scheduled_at: DateTime<Utc>,
    pub pending_at: DateTime<Utc>,

    /// `true` until the scheduled signal activates (promotes to pending).
    pub is_scheduled: bool,

    pub partial_log: Vec<PartialLogEntry>,
}

impl Signal {
    pub fn new(
        context: SignalContext,
        dto: &SignalDto,
        when: DateTime<Utc>,
        entry_price: f64,
    ) -> Self {
        let is_scheduled = dto.price_open.is_some();
        Signal {
            id: Uuid::new_v4(),
            context,
            direction: dto.direction,
            price_open: entry_price,
            price_take_profit: dto.price_take_profit,
            price_stop_loss: dto.price_stop_loss,
            original_take_profit: dto.price_take_profit,
            original_stop_loss: dto.price_stop_loss,
            trailing_stop_loss: None,
            trailing_take_profit: None,
            minute_estimated_time: dto.minute_estimated_time,
            scheduled_at: when,
            pending_at: when,
            is_scheduled,
            partial_log: Vec::new(),
        }
    }

    pub fn effective_stop_loss(&self) -> f64 {
        self.trailing_stop_loss.unwrap_or(self.price_stop_loss)
    }

    pub fn effective_take_profit(&self) -> f64 {
        self.trailing_take_profit.unwrap_or(self.price_take_profit)
    }

    pub fn tp_closed(&self) -> f64 {
        self.partial_log
            .iter()
            .filter(|e| e.kind == PartialKind::Profit)
            .map(|e| e.percent)
            .sum()
    }

    pub fn sl_closed(&self) -> f64 {
        self.partial_log
            .iter()
            .filter(|e| e.kind == PartialKind::Loss)
            .map(|e| e.percent)
            .sum()
    }

    pub fn total_closed(&self) -> f64 {
        self.tp_closed() + self.sl_closed()
    }

    /// Public alias per the data model: `totalExecuted == _totalClosed`.
    pub fn total_executed(&self) -> f64 {
        self.total_closed()
    }

    /// Append a partial close entry, enforcing the `_totalClosed <= 100`
    /// invariant. Percent-range and price-direction checks that depend on
    /// current market price are the caller's responsibility (`sigex-signal`)
    /// since they need the current price, which this type does not carry.
    pub fn append_partial(
        &mut self,
        kind: PartialKind,
        percent: f64,
        price: f64,
    ) -> Result<(), PartialCloseError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(PartialCloseError::PercentOutOfRange);
        }
        if self.total_closed() + percent > 100.0 {
            return Err(PartialCloseError::ExceedsTotal);
        }
        self.partial_log.push(PartialLogEntry {
            kind,
            percent,
            price,
        });
        Ok(())
    }
}
