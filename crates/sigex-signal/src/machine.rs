//! `SignalMachine`: owns the pending+scheduled signal for one
//! (symbol, strategy, exchange, frame) combination and evaluates it one
//! `tick` at a time — a single-entity state machine behind a lock, with
//! per-module concrete error enums rather than a shared catch-all.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use sigex_bus::{BusEvent, EventBus, Scope};
use sigex_config::SignalConfig;
use sigex_exchange::{get_candles_with_retry, Exchange};
use sigex_risk::{RiskGate, ValidationArgs};
use sigex_store::{PersistError, SignalStore};
use sigex_strategy::{validate_dto, Strategy, StrategyHost};
use sigex_tracker::{BreakevenTracker, PartialTracker};
use sigex_types::{
    ActivePosition, CancelReason, Candle, CloseReason, Direction, PartialKind, Signal,
    SignalContext, SignalDto, TickResult,
};

use crate::evaluate::{entry_reached, progress_percent, sl_crossed, tp_crossed};
use crate::partial_close::{apply_partial_close, PartialCloseRejection};
use crate::pnl::{raw_move_percent, weighted_realized_pnl};
use crate::trailing::{apply_trailing, TrailingKind, TrailingRejection};
use crate::vwap::compute_vwap;

/// Why a direct SL/TP/partial-close API call was refused. Distinct from the
/// tick-internal error handling, which never surfaces a `Result` to a
/// caller — these are synchronous API calls a host makes against a live
/// pending signal, so a `Result` is the right shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalApiError {
    NoPendingSignal,
    Trailing(TrailingRejection),
    Partial(PartialCloseRejection),
}

impl std::fmt::Display for SignalApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalApiError::NoPendingSignal => write!(f, "no pending signal on this machine"),
            SignalApiError::Trailing(e) => write!(f, "{e}"),
            SignalApiError::Partial(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SignalApiError {}

impl From<TrailingRejection> for SignalApiError {
    fn from(e: TrailingRejection) -> Self {
        SignalApiError::Trailing(e)
    }
}

impl From<PartialCloseRejection> for SignalApiError {
    fn from(e: PartialCloseRejection) -> Self {
        SignalApiError::Partial(e)
    }
}

struct MachineState {
    pending: Option<Signal>,
    scheduled: Option<Signal>,
    partial: Option<PartialTracker>,
    breakeven: Option<BreakevenTracker>,
    stopped: bool,
    cancel_requested: bool,
}

impl MachineState {
    fn new() -> Self {
        MachineState {
            pending: None,
            scheduled: None,
            partial: None,
            breakeven: None,
            stopped: false,
            cancel_requested: false,
        }
    }
}

/// One per (symbol, strategy, exchange, frame). Shared
/// `RiskGate`/`EventBus` handles are cloned in at construction, resolving the
/// SignalMachine-RiskGate cyclic reference.
pub struct SignalMachine {
    context: SignalContext,
    config: SignalConfig,
    exchange: Arc<dyn Exchange>,
    strategy: StrategyHost,
    risk: Arc<RiskGate>,
    store: Option<Arc<SignalStore>>,
    bus: EventBus,
    backtest: bool,
    initialized: OnceCell<()>,
    state: Mutex<MachineState>,
}

fn scope(backtest: bool) -> Scope {
    if backtest {
        Scope::Backtest
    } else {
        Scope::Live
    }
}

impl SignalMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SignalContext,
        config: SignalConfig,
        exchange: Arc<dyn Exchange>,
        risk: Arc<RiskGate>,
        store: Option<Arc<SignalStore>>,
        bus: EventBus,
        backtest: bool,
    ) -> Self {
        let timeout = std::time::Duration::from_secs(config.max_signal_generation_seconds as u64);
        SignalMachine {
            context,
            config,
            exchange,
            strategy: StrategyHost::new(timeout),
            risk,
            store,
            bus,
            backtest,
            initialized: OnceCell::new(),
            state: Mutex::new(MachineState::new()),
        }
    }

    pub fn register_strategy(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategy.register(strategy);
    }

    pub fn context(&self) -> &SignalContext {
        &self.context
    }

    /// Crash recovery: loads the persisted pending/scheduled signal
    /// and reconstructs the partial and breakeven trackers. A no-op in
    /// backtest mode (persistence is skipped entirely) and idempotent across
    /// calls via the internal one-shot gate.
    pub async fn wait_for_init(&self) -> Result<(), PersistError> {
        self.initialized
            .get_or_try_init(|| async {
                if self.backtest {
                    return Ok(());
                }
                if let Some(store) = &self.store {
                    let entity_key = self.context.entity_key();
                    let mut guard = self.state.lock().await;
                    guard.pending = store
                        .load_pending(&entity_key, &self.context.symbol)
                        .await?;
                    guard.scheduled = store
                        .load_scheduled(&entity_key, &self.context.symbol)
                        .await?;
                    if let Some(signal) = &guard.pending {
                        let record = store
                            .load_partial(&entity_key, &signal.id.to_string())
                            .await?;
                        guard.partial = Some(PartialTracker::from_record(record));
                        // BreakevenState has no persisted domain of its own; reconstruct from the one observable
                        // side effect breakeven leaves on the signal itself.
                        guard.breakeven = Some(BreakevenTracker::from_reached(
                            signal.trailing_stop_loss == Some(signal.price_open),
                        ));
                    }
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }

    pub async fn request_stop(&self) {
        self.state.lock().await.stopped = true;
    }

    pub async fn request_cancel(&self) {
        self.state.lock().await.cancel_requested = true;
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.stopped
    }

    /// `minuteEstimatedTime` of the currently-pending signal, if any — used
    /// by the backtest orchestrator to size its fast-forward candle fetch
    /// after a tick resolves to `Opened`.
    pub async fn pending_minute_estimate(&self) -> Option<u32> {
        self.state
            .lock()
            .await
            .pending
            .as_ref()
            .map(|s| s.minute_estimated_time)
    }

    /// Mirror of [`Self::pending_minute_estimate`] for the scheduled slot,
    /// used after a tick resolves to `Scheduled`.
    pub async fn scheduled_minute_estimate(&self) -> Option<u32> {
        self.state
            .lock()
            .await
            .scheduled
            .as_ref()
            .map(|s| s.minute_estimated_time)
    }

    async fn fetch_window(
        &self,
        when: DateTime<Utc>,
    ) -> Result<Vec<Candle>, sigex_exchange::ExchangeError> {
        get_candles_with_retry(
            self.exchange.as_ref(),
            &self.context.symbol,
            "1m",
            when.timestamp_millis(),
            self.config.avg_price_candles_count,
            self.backtest,
            &self.config,
        )
        .await
    }

    /// Volume-weighted average typical price over the last N 1-minute
    /// candles ending at `when`.
    pub async fn current_vwap(&self, when: DateTime<Utc>) -> Option<f64> {
        match self.fetch_window(when).await {
            Ok(candles) => compute_vwap(&candles),
            Err(e) => {
                warn!(error = %e, "candle fetch failed while computing vwap");
                None
            }
        }
    }

    /// The single evaluation unit, steps run in order until one matches. Never lets an
    /// internal error escape — every failure converts to the matching bus
    /// topic and this resolves to `Idle` (or whatever partial progress
    /// was already committed).
    pub async fn tick(&self, when: DateTime<Utc>) -> TickResult {
        let mut guard = match self.state.try_lock() {
            Ok(guard) => guard,
            // A second concurrent tick on the same machine is rejected
            // rather than queued.
            Err(_) => {
                debug!(symbol = %self.context.symbol, "tick rejected: already evaluating");
                return TickResult::Idle;
            }
        };

        let candles = match self.fetch_window(when).await {
            Ok(candles) => candles,
            Err(e) => {
                self.bus.publish(BusEvent::Error {
                    message: format!("candle fetch failed: {e}"),
                });
                warn!(error = %e, "candle fetch failed, skipping tick");
                return TickResult::Idle;
            }
        };

        if guard.pending.is_some() {
            let price = match compute_vwap(&candles) {
                Some(p) => p,
                None => return TickResult::Idle,
            };
            return self.evaluate_pending(&mut guard, when, price).await;
        }

        if guard.scheduled.is_some() {
            let price = match compute_vwap(&candles) {
                Some(p) => p,
                None => return TickResult::Idle,
            };
            return self.evaluate_scheduled(&mut guard, when, price).await;
        }

        if guard.stopped {
            return TickResult::Idle;
        }

        let dto = match self.strategy.get_signal(&self.context.symbol, when).await {
            Ok(Some(dto)) => dto,
            Ok(None) => return TickResult::Idle,
            Err(e) => {
                self.bus.publish(BusEvent::Error {
                    message: format!("getSignal failed: {e}"),
                });
                warn!(error = %e, "getSignal failed");
                return TickResult::Idle;
            }
        };

        let reference_price = match dto.price_open {
            Some(p) => p,
            None => match compute_vwap(&candles) {
                Some(p) => p,
                None => return TickResult::Idle,
            },
        };

        if let Err(e) = validate_dto(&dto, reference_price, &self.config) {
            self.bus.publish(BusEvent::Validation {
                message: format!("signal DTO rejected: {e}"),
            });
            return TickResult::Idle;
        }

        if dto.price_open.is_some() {
            self.open_scheduled(&mut guard, when, reference_price, &dto)
                .await
        } else {
            self.open_immediate(&mut guard, when, reference_price, &dto)
                .await
        }
    }

    async fn open_scheduled(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        entry_price: f64,
        dto: &SignalDto,
    ) -> TickResult {
        let signal = Signal::new(self.context.clone(), dto, when, entry_price);
        if !self.backtest {
            if let Some(store) = &self.store {
                let entity_key = self.context.entity_key();
                if let Err(e) = store
                    .save_scheduled(&entity_key, &self.context.symbol, &signal)
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to persist scheduled signal: {e}"),
                    });
                }
            }
        }
        let result = TickResult::Scheduled {
            signal_id: signal.id,
            when,
        };
        self.bus.publish(BusEvent::Scheduled {
            scope: scope(self.backtest),
            signal_id: signal.id,
            context_key: self.context.position_key(),
            when,
        });
        info!(symbol = %self.context.symbol, signal_id = %signal.id, "signal scheduled");
        guard.scheduled = Some(signal);
        result
    }

    async fn open_immediate(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        entry_price: f64,
        dto: &SignalDto,
    ) -> TickResult {
        let args = ValidationArgs::new(
            &self.context.symbol,
            &self.context.strategy,
            &self.context.exchange,
            &self.context.risk,
            &self.context.frame,
            dto,
            entry_price,
            when,
        );
        if !self.risk.check_signal(args).await {
            return TickResult::Idle;
        }

        let signal = Signal::new(self.context.clone(), dto, when, entry_price);
        if !self.backtest {
            if let Some(store) = &self.store {
                let entity_key = self.context.entity_key();
                if let Err(e) = store
                    .save_pending(&entity_key, &self.context.symbol, &signal)
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to persist pending signal: {e}"),
                    });
                }
            }
        }
        let position = ActivePosition {
            strategy: self.context.strategy.clone(),
            exchange: self.context.exchange.clone(),
            frame: self.context.frame.clone(),
            symbol: self.context.symbol.clone(),
            direction: signal.direction,
            price_open: signal.price_open,
            price_stop_loss: signal.price_stop_loss,
            price_take_profit: signal.price_take_profit,
            minute_estimated_time: signal.minute_estimated_time,
            open_timestamp: when,
        };
        if let Err(e) = self
            .risk
            .add_signal(self.context.position_key(), position, self.backtest)
            .await
        {
            self.bus.publish(BusEvent::Error {
                message: format!("failed to persist active position: {e}"),
            });
        }

        let result = TickResult::Opened {
            signal_id: signal.id,
            when,
        };
        self.bus.publish(BusEvent::Opened {
            scope: scope(self.backtest),
            signal_id: signal.id,
            context_key: self.context.position_key(),
            when,
        });
        info!(symbol = %self.context.symbol, signal_id = %signal.id, "signal opened");
        guard.pending = Some(signal);
        result
    }

    async fn evaluate_pending(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        price: f64,
    ) -> TickResult {
        let signal = guard.pending.as_ref().expect("pending checked by caller");

        if tp_crossed(signal, price) {
            return self
                .close_pending(guard, when, price, CloseReason::TakeProfit)
                .await;
        }
        if sl_crossed(signal, price) {
            return self
                .close_pending(guard, when, price, CloseReason::StopLoss)
                .await;
        }

        let cap_minutes = signal
            .minute_estimated_time
            .min(self.config.max_signal_lifetime_minutes);
        let deadline = signal.pending_at + ChronoDuration::minutes(cap_minutes as i64);
        if when >= deadline {
            return self
                .close_pending(guard, when, price, CloseReason::TimeExpired)
                .await;
        }

        self.run_trackers(guard, when, price).await;

        let signal = guard.pending.as_ref().expect("pending checked by caller");
        let progress = progress_percent(signal, price);
        let unrealized = weighted_realized_pnl(
            signal,
            price,
            self.config.percent_slippage,
            self.config.percent_fee,
        );
        let result = TickResult::Active {
            signal_id: signal.id,
            when,
            progress_percent: progress,
            unrealized_pnl_percent: unrealized,
        };
        self.bus.publish(BusEvent::Active {
            scope: scope(self.backtest),
            signal_id: signal.id,
            context_key: self.context.position_key(),
            when,
            progress_percent: progress,
            unrealized_pnl_percent: unrealized,
        });
        result
    }

    /// Partial-milestone emission plus breakeven activation: side-effecting, always run once per non-terminal tick
    /// on a pending signal.
    async fn run_trackers(&self, guard: &mut MachineState, when: DateTime<Utc>, price: f64) {
        if guard.partial.is_none() {
            guard.partial = Some(PartialTracker::new());
        }
        if guard.breakeven.is_none() {
            guard.breakeven = Some(BreakevenTracker::new());
        }

        let signal = guard.pending.as_ref().expect("pending checked by caller");
        let raw_move = raw_move_percent(signal.direction, signal.price_open, price);
        let signal_id = signal.id;

        let tracker = guard.partial.as_mut().expect("initialized above");
        let (new_profit, new_loss) = if raw_move > 0.0 {
            (tracker.profit(raw_move), Vec::new())
        } else if raw_move < 0.0 {
            (Vec::new(), tracker.loss(-raw_move))
        } else {
            (Vec::new(), Vec::new())
        };

        for level in &new_profit {
            self.bus.publish(BusEvent::PartialProfit {
                signal_id,
                level: *level,
                when,
            });
        }
        for level in &new_loss {
            self.bus.publish(BusEvent::PartialLoss {
                signal_id,
                level: *level,
                when,
            });
        }

        let partial_changed = !new_profit.is_empty() || !new_loss.is_empty();
        if partial_changed && !self.backtest {
            if let Some(store) = &self.store {
                let entity_key = self.context.entity_key();
                let record = guard
                    .partial
                    .as_ref()
                    .expect("initialized above")
                    .to_record();
                if let Err(e) = store
                    .save_partial(&entity_key, &signal_id.to_string(), &record)
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to persist partial state: {e}"),
                    });
                }
            }
        }

        let threshold = self.config.breakeven_activation_threshold();
        let mut breakeven_fired = false;
        if raw_move >= threshold {
            let tracker = guard.breakeven.as_mut().expect("initialized above");
            if tracker.mark_reached() {
                breakeven_fired = true;
                let signal = guard.pending.as_mut().expect("pending checked by caller");
                signal.trailing_stop_loss = Some(signal.price_open);
            }
        }

        if breakeven_fired {
            self.bus.publish(BusEvent::Breakeven { signal_id, when });
            if !self.backtest {
                if let Some(store) = &self.store {
                    let entity_key = self.context.entity_key();
                    let signal = guard.pending.as_ref().expect("pending checked by caller");
                    if let Err(e) = store
                        .save_pending(&entity_key, &self.context.symbol, signal)
                        .await
                    {
                        self.bus.publish(BusEvent::Error {
                            message: format!("failed to persist breakeven update: {e}"),
                        });
                    }
                }
            }
        }
    }

    async fn close_pending(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        price: f64,
        reason: CloseReason,
    ) -> TickResult {
        let signal = guard.pending.take().expect("pending checked by caller");
        guard.partial = None;
        guard.breakeven = None;

        let pnl = weighted_realized_pnl(
            &signal,
            price,
            self.config.percent_slippage,
            self.config.percent_fee,
        );

        if !self.backtest {
            if let Some(store) = &self.store {
                let entity_key = self.context.entity_key();
                if let Err(e) = store.clear_pending(&entity_key, &self.context.symbol).await {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to clear pending signal: {e}"),
                    });
                }
                if let Err(e) = store
                    .clear_partial(&entity_key, &signal.id.to_string())
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to clear partial state: {e}"),
                    });
                }
            }
        }
        if let Err(e) = self
            .risk
            .remove_signal(&self.context.position_key(), self.backtest)
            .await
        {
            self.bus.publish(BusEvent::Error {
                message: format!("failed to remove active position: {e}"),
            });
        }

        self.bus.publish(BusEvent::Closed {
            scope: scope(self.backtest),
            signal_id: signal.id,
            context_key: self.context.position_key(),
            when,
            reason,
            pnl_percentage: pnl,
        });
        info!(symbol = %self.context.symbol, signal_id = %signal.id, ?reason, pnl, "signal closed");

        TickResult::Closed {
            signal_id: signal.id,
            reason,
            when,
            pnl_percentage: pnl,
        }
    }

    async fn evaluate_scheduled(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        price: f64,
    ) -> TickResult {
        if guard.cancel_requested {
            guard.cancel_requested = false;
            return self.cancel_scheduled(guard, when, CancelReason::User).await;
        }

        let signal = guard
            .scheduled
            .as_ref()
            .expect("scheduled checked by caller");
        if sl_crossed(signal, price) {
            return self
                .cancel_scheduled(guard, when, CancelReason::PriceReject)
                .await;
        }

        let awaited = when - signal.scheduled_at;
        if awaited >= ChronoDuration::minutes(self.config.schedule_await_minutes as i64) {
            return self
                .cancel_scheduled(guard, when, CancelReason::Timeout)
                .await;
        }

        if entry_reached(signal, price) {
            return self.promote_scheduled(guard, when, price).await;
        }

        let signal_id = signal.id;
        self.bus
            .publish(BusEvent::ScheduledPing { signal_id, when });
        let result = TickResult::Scheduled { signal_id, when };
        self.bus.publish(BusEvent::Scheduled {
            scope: scope(self.backtest),
            signal_id,
            context_key: self.context.position_key(),
            when,
        });
        result
    }

    async fn cancel_scheduled(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        reason: CancelReason,
    ) -> TickResult {
        let signal = guard.scheduled.take().expect("scheduled checked by caller");
        if !self.backtest {
            if let Some(store) = &self.store {
                let entity_key = self.context.entity_key();
                if let Err(e) = store
                    .clear_scheduled(&entity_key, &self.context.symbol)
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to clear scheduled signal: {e}"),
                    });
                }
            }
        }
        self.bus.publish(BusEvent::Cancelled {
            scope: scope(self.backtest),
            signal_id: signal.id,
            context_key: self.context.position_key(),
            when,
            reason,
        });
        info!(symbol = %self.context.symbol, signal_id = %signal.id, ?reason, "signal cancelled");
        TickResult::Cancelled {
            signal_id: signal.id,
            reason,
            when,
        }
    }

    async fn promote_scheduled(
        &self,
        guard: &mut MachineState,
        when: DateTime<Utc>,
        price: f64,
    ) -> TickResult {
        let signal = guard
            .scheduled
            .as_ref()
            .expect("scheduled checked by caller");
        let dto = SignalDto {
            direction: signal.direction,
            price_open: Some(signal.price_open),
            price_take_profit: signal.price_take_profit,
            price_stop_loss: signal.price_stop_loss,
            minute_estimated_time: signal.minute_estimated_time,
            note: None,
            id: None,
        };
        let args = ValidationArgs::new(
            &self.context.symbol,
            &self.context.strategy,
            &self.context.exchange,
            &self.context.risk,
            &self.context.frame,
            &dto,
            price,
            when,
        );
        if !self.risk.check_signal(args).await {
            // Rejected at promotion: no CancelReason models this, so the
            // signal stays scheduled and is retried on a later tick.
            let signal_id = signal.id;
            let result = TickResult::Scheduled { signal_id, when };
            self.bus.publish(BusEvent::Scheduled {
                scope: scope(self.backtest),
                signal_id,
                context_key: self.context.position_key(),
                when,
            });
            return result;
        }

        let mut signal = guard.scheduled.take().expect("scheduled checked by caller");
        signal.is_scheduled = false;
        signal.pending_at = when;

        if !self.backtest {
            if let Some(store) = &self.store {
                let entity_key = self.context.entity_key();
                if let Err(e) = store
                    .clear_scheduled(&entity_key, &self.context.symbol)
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to clear scheduled signal: {e}"),
                    });
                }
                if let Err(e) = store
                    .save_pending(&entity_key, &self.context.symbol, &signal)
                    .await
                {
                    self.bus.publish(BusEvent::Error {
                        message: format!("failed to persist promoted signal: {e}"),
                    });
                }
            }
        }

        let position = ActivePosition {
            strategy: self.context.strategy.clone(),
            exchange: self.context.exchange.clone(),
            frame: self.context.frame.clone(),
            symbol: self.context.symbol.clone(),
            direction: signal.direction,
            price_open: signal.price_open,
            price_stop_loss: signal.price_stop_loss,
            price_take_profit: signal.price_take_profit,
            minute_estimated_time: signal.minute_estimated_time,
            open_timestamp: when,
        };
        if let Err(e) = self
            .risk
            .add_signal(self.context.position_key(), position, self.backtest)
            .await
        {
            self.bus.publish(BusEvent::Error {
                message: format!("failed to persist active position: {e}"),
            });
        }

        let result = TickResult::Opened {
            signal_id: signal.id,
            when,
        };
        self.bus.publish(BusEvent::Opened {
            scope: scope(self.backtest),
            signal_id: signal.id,
            context_key: self.context.position_key(),
            when,
        });
        info!(symbol = %self.context.symbol, signal_id = %signal.id, "scheduled signal promoted to opened");
        guard.pending = Some(signal);
        result
    }

    /// Fast-forward: walks `candles` computing a
    /// rolling VWAP, returning the first `Closed`/`Cancelled`. Never yields
    /// `Active`/`Scheduled` to the caller — those are intermediate states
    /// consumed internally while walking.
    pub async fn fast_forward(&self, candles: &[Candle]) -> TickResult {
        let mut guard = self.state.lock().await;
        if guard.pending.is_none() && guard.scheduled.is_none() {
            return TickResult::Idle;
        }

        let window_size = self.config.avg_price_candles_count as usize;
        let mut last_when = None;

        for i in 0..candles.len() {
            let start = (i + 1).saturating_sub(window_size.max(1));
            let window = &candles[start..=i];
            let price = compute_vwap(window).unwrap_or_else(|| candles[i].typical_price());
            let when =
                DateTime::from_timestamp_millis(candles[i].timestamp_ms).unwrap_or_else(Utc::now);
            last_when = Some(when);

            if guard.pending.is_some() {
                let result = self.evaluate_pending(&mut guard, when, price).await;
                if result.is_terminal() {
                    return result;
                }
                continue;
            }
            if guard.scheduled.is_some() {
                let result = self.evaluate_scheduled(&mut guard, when, price).await;
                if result.is_terminal() {
                    return result;
                }
                continue;
            }
            break;
        }

        let last_when = last_when.unwrap_or_else(Utc::now);
        if guard.pending.is_some() {
            let last_price = candles.last().map(Candle::typical_price).unwrap_or(0.0);
            return self
                .close_pending(&mut guard, last_when, last_price, CloseReason::TimeExpired)
                .await;
        }
        if guard.scheduled.is_some() {
            // Exhausted without activation: never opened, so this cancels
            // rather than closes.
            return self
                .cancel_scheduled(&mut guard, last_when, CancelReason::Timeout)
                .await;
        }
        TickResult::Idle
    }

    pub async fn trailing_stop(
        &self,
        percent_shift: f64,
        current_price: f64,
    ) -> Result<f64, SignalApiError> {
        let mut guard = self.state.lock().await;
        let signal = guard
            .pending
            .as_mut()
            .ok_or(SignalApiError::NoPendingSignal)?;
        let level = apply_trailing(signal, TrailingKind::StopLoss, percent_shift, current_price)?;
        self.persist_pending_locked(&guard).await;
        Ok(level)
    }

    pub async fn trailing_take_profit(
        &self,
        percent_shift: f64,
        current_price: f64,
    ) -> Result<f64, SignalApiError> {
        let mut guard = self.state.lock().await;
        let signal = guard
            .pending
            .as_mut()
            .ok_or(SignalApiError::NoPendingSignal)?;
        let level = apply_trailing(
            signal,
            TrailingKind::TakeProfit,
            percent_shift,
            current_price,
        )?;
        self.persist_pending_locked(&guard).await;
        Ok(level)
    }

    pub async fn partial_profit(&self, percent: f64, price: f64) -> Result<(), SignalApiError> {
        let mut guard = self.state.lock().await;
        let signal_id = {
            let signal = guard
                .pending
                .as_mut()
                .ok_or(SignalApiError::NoPendingSignal)?;
            apply_partial_close(signal, PartialKind::Profit, percent, price)?;
            signal.id
        };
        self.persist_pending_locked(&guard).await;
        let _ = signal_id;
        Ok(())
    }

    pub async fn partial_loss(&self, percent: f64, price: f64) -> Result<(), SignalApiError> {
        let mut guard = self.state.lock().await;
        {
            let signal = guard
                .pending
                .as_mut()
                .ok_or(SignalApiError::NoPendingSignal)?;
            apply_partial_close(signal, PartialKind::Loss, percent, price)?;
        }
        self.persist_pending_locked(&guard).await;
        Ok(())
    }

    /// `breakeven(currentPrice)`: idempotent after first success.
    pub async fn breakeven(
        &self,
        current_price: f64,
        when: DateTime<Utc>,
    ) -> Result<bool, SignalApiError> {
        let mut guard = self.state.lock().await;
        if guard.pending.is_none() {
            return Err(SignalApiError::NoPendingSignal);
        }
        if guard.breakeven.is_none() {
            guard.breakeven = Some(BreakevenTracker::new());
        }

        let signal = guard.pending.as_ref().expect("checked above");
        let raw_move = raw_move_percent(signal.direction, signal.price_open, current_price);
        let threshold = self.config.breakeven_activation_threshold();
        if raw_move < threshold {
            return Ok(false);
        }

        let tracker = guard.breakeven.as_mut().expect("initialized above");
        if !tracker.mark_reached() {
            return Ok(false);
        }

        let signal_id = {
            let signal = guard.pending.as_mut().expect("checked above");
            signal.trailing_stop_loss = Some(signal.price_open);
            signal.id
        };
        self.persist_pending_locked(&guard).await;
        self.bus.publish(BusEvent::Breakeven { signal_id, when });
        Ok(true)
    }

    async fn persist_pending_locked(&self, guard: &MachineState) {
        if self.backtest {
            return;
        }
        let (Some(store), Some(signal)) = (&self.store, &guard.pending) else {
            return;
        };
        let entity_key = self.context.entity_key();
        if let Err(e) = store
            .save_pending(&entity_key, &self.context.symbol, signal)
            .await
        {
            self.bus.publish(BusEvent::Error {
                message: format!("failed to persist pending signal: {e}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sigex_bus::EventBus;
    use sigex_exchange::PaperExchange;

    fn long_dto(price_open: Option<f64>) -> SignalDto {
        SignalDto {
            direction: Direction::Long,
            price_open,
            price_take_profit: 52000.0,
            price_stop_loss: 49000.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        }
    }

    struct OneShot {
        dto: std::sync::Mutex<Option<SignalDto>>,
    }

    #[async_trait]
    impl Strategy for OneShot {
        async fn get_signal(&self, _symbol: &str, _when: DateTime<Utc>) -> Option<SignalDto> {
            self.dto.lock().unwrap().take()
        }
    }

    fn context() -> SignalContext {
        SignalContext::new("BTCUSDT", "trend", "paper", "", "default")
    }

    fn seeded_exchange(entries: &[(i64, f64, f64)]) -> Arc<PaperExchange> {
        let exchange = Arc::new(PaperExchange::new());
        for (ts, price, volume) in entries {
            exchange.push(
                "BTCUSDT",
                Candle {
                    timestamp_ms: *ts,
                    open: *price,
                    high: *price,
                    low: *price,
                    close: *price,
                    volume: *volume,
                },
            );
        }
        exchange
    }

    async fn new_machine(
        exchange: Arc<PaperExchange>,
        strategy_dto: Option<SignalDto>,
    ) -> SignalMachine {
        let bus = EventBus::new();
        let risk = Arc::new(RiskGate::new("default_paper", vec![], None, bus.clone()));
        let mut machine = SignalMachine::new(
            context(),
            SignalConfig::default(),
            exchange,
            risk,
            None,
            bus,
            true,
        );
        machine.register_strategy(Arc::new(OneShot {
            dto: std::sync::Mutex::new(strategy_dto),
        }));
        machine
    }

    #[tokio::test]
    async fn immediate_long_opens_then_hits_take_profit() {
        let base = 1_700_000_000_000i64;
        let minute = 60_000i64;
        let exchange = seeded_exchange(&[
            (base - 4 * minute, 50000.0, 1.0),
            (base - 3 * minute, 50000.0, 1.0),
            (base - 2 * minute, 50000.0, 1.0),
            (base - minute, 50000.0, 1.0),
            (base, 50000.0, 1.0),
        ]);
        let machine = new_machine(exchange.clone(), Some(long_dto(None))).await;

        let when = DateTime::from_timestamp_millis(base).unwrap();
        let opened = machine.tick(when).await;
        assert!(matches!(opened, TickResult::Opened { .. }));

        for i in 1..=5 {
            exchange.push(
                "BTCUSDT",
                Candle {
                    timestamp_ms: base + i * minute,
                    open: 52500.0,
                    high: 52500.0,
                    low: 52500.0,
                    close: 52500.0,
                    volume: 1.0,
                },
            );
        }
        let when2 = DateTime::from_timestamp_millis(base + minute).unwrap();
        let closed = machine.tick(when2).await;
        match closed {
            TickResult::Closed { reason, .. } => assert_eq!(reason, CloseReason::TakeProfit),
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_tick_is_rejected_not_queued() {
        let exchange = seeded_exchange(&[(0, 50000.0, 1.0)]);
        let machine = new_machine(exchange, Some(long_dto(None))).await;
        let guard = machine.state.try_lock().unwrap();
        let when = DateTime::from_timestamp_millis(0).unwrap();
        let result = machine.tick(when).await;
        assert!(matches!(result, TickResult::Idle));
        drop(guard);
    }

    #[tokio::test]
    async fn trailing_stop_api_rejects_without_pending_signal() {
        let exchange = seeded_exchange(&[(0, 50000.0, 1.0)]);
        let machine = new_machine(exchange, None).await;
        let result = machine.trailing_stop(-5.0, 51000.0).await;
        assert_eq!(result, Err(SignalApiError::NoPendingSignal));
    }
}
