use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TimeExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Timeout,
    PriceReject,
    User,
}

/// The discriminated union `tick(when)` resolves to. Exactly one variant per
/// evaluation — never more than one terminal event per signal lifecycle
/// (enforced by construction: a signal is removed from the machine the same
/// tick `Closed`/`Cancelled` is produced).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TickResult {
    /// No pending or scheduled signal and the stop-flag is set, so
    /// `getSignal` was not called this tick. The only other throttle on
    /// `getSignal` call frequency is the orchestrator's own tick cadence
    /// (one call per tick, by construction) — there is no separate timer
    /// inside the machine.
    Idle,
    /// A scheduled signal is waiting for activation; emitted once per tick
    /// while waiting (paired with a scheduled-ping bus event).
    Scheduled {
        signal_id: Uuid,
        when: DateTime<Utc>,
    },
    /// A signal was just opened this tick (immediate, or promoted from
    /// scheduled).
    Opened {
        signal_id: Uuid,
        when: DateTime<Utc>,
    },
    /// A pending signal is being monitored; no terminal condition this tick.
    Active {
        signal_id: Uuid,
        when: DateTime<Utc>,
        progress_percent: f64,
        unrealized_pnl_percent: f64,
    },
    /// Terminal: the pending signal closed.
    Closed {
        signal_id: Uuid,
        reason: CloseReason,
        when: DateTime<Utc>,
        pnl_percentage: f64,
    },
    /// Terminal: the scheduled signal was cancelled before activation.
    Cancelled {
        signal_id: Uuid,
        reason: CancelReason,
        when: DateTime<Utc>,
    },
}

impl TickResult {
    /// `true` for the two terminal variants backtest yields exclusively.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TickResult::Closed { .. } | TickResult::Cancelled { .. }
        )
    }

    /// `true` for the variants the live orchestrator yields (`Opened` and
    /// `Closed` only).
    pub fn is_live_yield(&self) -> bool {
        matches!(self, TickResult::Opened { .. } | TickResult::Closed { .. })
    }

    pub fn close_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            TickResult::Closed { when, .. } | TickResult::Cancelled { when, .. } => Some(*when),
            _ => None,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            TickResult::Idle => "idle",
            TickResult::Scheduled { .. } => "scheduled",
            TickResult::Opened { .. } => "opened",
            TickResult::Active { .. } => "active",
            TickResult::Closed { .. } => "closed",
            TickResult::Cancelled { .. } => "cancelled",
        }
    }
}
