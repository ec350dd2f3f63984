use std::sync::Arc;
use std::time::Instant;

use chrono::Duration as ChronoDuration;
use futures_util::Stream;
use tracing::{debug, info, warn};

use sigex_bus::{BusEvent, CancelToken, EventBus};
use sigex_config::SignalConfig;
use sigex_exchange::Exchange;
use sigex_signal::SignalMachine;
use sigex_types::{Frame, TickResult};

/// Extra history before a signal's open time so the rolling VWAP window
/// is well-defined from the very first fast-forward candle.
fn history_buffer_minutes(cfg: &SignalConfig) -> i64 {
    (cfg.avg_price_candles_count as i64 - 1).max(0)
}

/// The backtest orchestrator: walks a `Frame`'s timeline tick by
/// tick, and on every `Scheduled`/`Opened` result fetches a candle batch
/// sized for that signal class and fast-forwards the machine through it to
/// a terminal state, skipping the outer walk ahead past the close so the
/// next tick never re-evaluates inside the window of a signal that already
/// resolved. Agnostic to signal class beyond `fetchSpan` sizing.
pub struct BacktestOrchestrator {
    symbol: String,
    frame: Frame,
    machine: Arc<SignalMachine>,
    exchange: Arc<dyn Exchange>,
    config: SignalConfig,
    bus: EventBus,
}

impl BacktestOrchestrator {
    pub fn new(
        symbol: impl Into<String>,
        frame: Frame,
        machine: Arc<SignalMachine>,
        exchange: Arc<dyn Exchange>,
        config: SignalConfig,
        bus: EventBus,
    ) -> Self {
        BacktestOrchestrator {
            symbol: symbol.into(),
            frame,
            machine,
            exchange,
            config,
            bus,
        }
    }

    /// Runs the walk, yielding only `Closed`/`Cancelled` results. A consumer that stops polling this stream
    /// halts the walk at its current position — no further candles are
    /// fetched (early termination).
    pub fn run(self: Arc<Self>, cancel: CancelToken) -> impl Stream<Item = TickResult> {
        async_stream::stream! {
         let timeframes = self.frame.get_timeframe();
         let len = timeframes.len();
         let run_started = Instant::now();
         self.bus.publish(BusEvent::BacktestProgress { fraction: 0.0 });

         let mut i = 0usize;
         let mut timeframe_ticks: u64 = 0;
         let mut signals_resolved: u64 = 0;

         while i < len {
         self.bus.publish(BusEvent::BacktestProgress {
         fraction: i as f64 / len as f64,
         });
         if self.machine.is_stopped().await || cancel.is_cancelled() {
         debug!(symbol = %self.symbol, i, "backtest orchestrator stopped");
         break;
         }

         let when = timeframes[i];
         let tick_started = Instant::now();
         let result = self.machine.tick(when).await;
         timeframe_ticks += 1;
         self.bus.publish(BusEvent::Performance {
         metric: "backtest_timeframe".to_string(),
         value: tick_started.elapsed().as_secs_f64(),
         });

         let fetch_span = match &result {
         TickResult::Idle | TickResult::Active {.. } => {
         i += 1;
         continue;
         }
         TickResult::Scheduled {.. } => {
         let minutes = self.machine.scheduled_minute_estimate().await.unwrap_or(0);
         history_buffer_minutes(&self.config)
         + self.config.schedule_await_minutes as i64
         + minutes as i64
         + 1
         }
         TickResult::Opened {.. } => {
         let minutes = self.machine.pending_minute_estimate().await.unwrap_or(0);
         history_buffer_minutes(&self.config) + minutes as i64
         }
         // `tick` never yields a terminal result directly, but if a future evaluation
         // path ever did, pass it straight through rather than
         // re-entering `fast_forward` with nothing to walk.
         TickResult::Closed {.. } | TickResult::Cancelled {.. } => {
         signals_resolved += 1;
         yield result.clone();
         i += 1;
         continue;
         }
         };

         let since = when - ChronoDuration::minutes(history_buffer_minutes(&self.config));
         let candles = match self
        .exchange
        .get_next_candles(
         &self.symbol,
         "1m",
         since.timestamp_millis(),
         fetch_span.max(1) as u32,
         true,
         )
        .await
         {
         Ok(candles) => candles,
         Err(e) => {
         self.bus.publish(BusEvent::Error {
         message: format!("candle fetch failed during fast-forward: {e}"),
         });
         warn!(error = %e, "fast-forward candle fetch failed");
         i += 1;
         continue;
         }
         };
         if candles.is_empty() {
         i += 1;
         continue;
         }

         let forward_started = Instant::now();
         let closed = self.machine.fast_forward(&candles).await;
         signals_resolved += 1;
         self.bus.publish(BusEvent::Performance {
         metric: "backtest_signal".to_string(),
         value: forward_started.elapsed().as_secs_f64(),
         });

         if let Some(close_ts) = closed.close_timestamp() {
         while i < len && timeframes[i] < close_ts {
         i += 1;
         }
         }
         yield closed;
         i += 1;
         }

         self.bus.publish(BusEvent::BacktestProgress { fraction: 1.0 });
         self.bus.publish(BusEvent::Performance {
         metric: "backtest_total".to_string(),
         value: run_started.elapsed().as_secs_f64(),
         });
         self.bus.publish(BusEvent::BacktestDone {
         context_key: self.machine.context().position_key(),
         });
         info!(
         symbol = %self.symbol,
         timeframe_ticks,
         signals_resolved,
         "backtest orchestrator finished"
         );
         }
    }
}
