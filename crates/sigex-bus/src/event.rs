use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigex_types::{CancelReason, CloseReason};
use uuid::Uuid;

/// Which orchestrator a signal event came from. Covers the all/live-only/
/// backtest-only topic variants without needing three
/// separate channels — a subscriber that only wants one scope filters on
/// this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Live,
    Backtest,
}

/// Every message type the bus carries. Registration/report-generator topics
/// (walker-*, optimizer-progress) are not modeled here: the walker and
/// optimizer are explicitly out of scope and no component in this
/// workspace would ever publish them — see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusEvent {
    Opened {
        scope: Scope,
        signal_id: Uuid,
        context_key: String,
        when: DateTime<Utc>,
    },
    Active {
        scope: Scope,
        signal_id: Uuid,
        context_key: String,
        when: DateTime<Utc>,
        progress_percent: f64,
        unrealized_pnl_percent: f64,
    },
    Closed {
        scope: Scope,
        signal_id: Uuid,
        context_key: String,
        when: DateTime<Utc>,
        reason: CloseReason,
        pnl_percentage: f64,
    },
    Scheduled {
        scope: Scope,
        signal_id: Uuid,
        context_key: String,
        when: DateTime<Utc>,
    },
    Cancelled {
        scope: Scope,
        signal_id: Uuid,
        context_key: String,
        when: DateTime<Utc>,
        reason: CancelReason,
    },
    ScheduledPing {
        signal_id: Uuid,
        when: DateTime<Utc>,
    },
    PartialProfit {
        signal_id: Uuid,
        level: u32,
        when: DateTime<Utc>,
    },
    PartialLoss {
        signal_id: Uuid,
        level: u32,
        when: DateTime<Utc>,
    },
    Breakeven {
        signal_id: Uuid,
        when: DateTime<Utc>,
    },
    RiskRejection {
        context_key: String,
        note: String,
        when: DateTime<Utc>,
    },
    BacktestProgress {
        fraction: f64,
    },
    BacktestDone {
        context_key: String,
    },
    LiveDone {
        context_key: String,
    },
    /// Recoverable errors: routed here, the affected tick is skipped.
    Error {
        message: String,
    },
    /// Fatal errors: the background task that emits this is about to
    /// terminate.
    Exit {
        message: String,
    },
    /// Validation errors: the signal/risk check failed, execution
    /// continues.
    Validation {
        message: String,
    },
    Performance {
        metric: String,
        value: f64,
    },
}
