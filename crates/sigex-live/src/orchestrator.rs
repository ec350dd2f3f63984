use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::Stream;
use tracing::info;

use sigex_bus::{BusEvent, CancelToken, EventBus};
use sigex_signal::SignalMachine;
use sigex_types::TickResult;

/// Default spacing between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// The live orchestrator: an infinite loop over wall-clock time,
/// ticking one `SignalMachine` once per `tick_interval` and yielding only
/// the events a host needs to react to (`Opened`/`Closed` — see
/// `TickResult::is_live_yield`). Never terminates on its own; a host stops
/// it via `CancelToken` or `SignalMachine::request_stop`.
pub struct LiveOrchestrator {
    machine: Arc<SignalMachine>,
    bus: EventBus,
    tick_interval: Duration,
}

impl LiveOrchestrator {
    pub fn new(machine: Arc<SignalMachine>, bus: EventBus) -> Self {
        LiveOrchestrator {
            machine,
            bus,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Overrides the default 1-minute spacing — tests use this to run the
    /// loop without sleeping for real minutes.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Runs the infinite tick loop, yielding only `Opened`/`Closed` results.
    /// Cancellation is checked once per iteration, between ticks, never
    /// inside one.
    pub fn run(self: Arc<Self>, cancel: CancelToken) -> impl Stream<Item = TickResult> {
        async_stream::stream! {
        if let Err(e) = self.machine.wait_for_init().await {
        self.bus.publish(BusEvent::Exit {
        message: format!("live orchestrator failed to load persisted state: {e}"),
        });
        return;
        }

        let mut last_tick = Instant::now();
        loop {
        if self.machine.is_stopped().await || cancel.is_cancelled() {
        info!("live orchestrator stopping");
        self.bus.publish(BusEvent::LiveDone {
        context_key: self.machine.context().position_key(),
        });
        break;
        }

        let when = Utc::now();
        let tick_started = Instant::now();
        let result = self.machine.tick(when).await;
        self.bus.publish(BusEvent::Performance {
        metric: "live_tick".to_string(),
        value: last_tick.elapsed().as_secs_f64(),
        });
        last_tick = tick_started;

        if result.is_live_yield() {
        yield result;
        }

        tokio::time::sleep(self.tick_interval).await;
        }
        }
    }
}
