use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;

use sigex_bus::{CancelToken, EventBus};
use sigex_config::SignalConfig;
use sigex_exchange::Exchange;
use sigex_risk::{RiskGate, ValidationFn};
use sigex_signal::SignalMachine;
use sigex_store::{ActivePositionStore, SignalStore};
use sigex_strategy::Strategy;
use sigex_types::{SignalContext, TickResult};

use crate::orchestrator::{LiveOrchestrator, DEFAULT_TICK_INTERVAL};

/// Public entry point for running a strategy against live wall-clock time
///. Wires persistence in (unlike [`sigex_backtest::Backtest`], which
/// always passes `store: None`) and injects the caller's context — a thin
/// façade over an orchestrator plus a long-lived `SignalMachine`.
pub struct Live {
    machine: Arc<SignalMachine>,
    orchestrator: Arc<LiveOrchestrator>,
}

impl Live {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SignalContext,
        config: SignalConfig,
        exchange: Arc<dyn Exchange>,
        strategy: Arc<dyn Strategy>,
        risk: Arc<RiskGate>,
        signal_store: Arc<SignalStore>,
        bus: EventBus,
    ) -> Self {
        Self::with_tick_interval(
            context,
            config,
            exchange,
            strategy,
            risk,
            signal_store,
            bus,
            DEFAULT_TICK_INTERVAL,
        )
    }

    /// Like [`Self::new`] but with an explicit tick spacing — tests use a
    /// short interval so the loop doesn't sleep for real minutes.
    #[allow(clippy::too_many_arguments)]
    pub fn with_tick_interval(
        context: SignalContext,
        config: SignalConfig,
        exchange: Arc<dyn Exchange>,
        strategy: Arc<dyn Strategy>,
        risk: Arc<RiskGate>,
        signal_store: Arc<SignalStore>,
        bus: EventBus,
        tick_interval: Duration,
    ) -> Self {
        let mut machine = SignalMachine::new(
            context,
            config,
            exchange,
            risk,
            Some(signal_store),
            bus.clone(),
            false,
        );
        machine.register_strategy(strategy);
        let machine = Arc::new(machine);
        let orchestrator =
            Arc::new(LiveOrchestrator::new(machine.clone(), bus).with_tick_interval(tick_interval));
        Live {
            machine,
            orchestrator,
        }
    }

    /// Builds the `RiskGate` a [`Live`] instance needs from its positions
    /// store, for callers that do not already share one across multiple
    /// contexts on the same risk profile.
    pub fn risk_gate(
        context: &SignalContext,
        validations: Vec<ValidationFn>,
        positions_store: Arc<ActivePositionStore>,
        bus: EventBus,
    ) -> Arc<RiskGate> {
        Arc::new(RiskGate::new(
            format!("{}_{}", context.risk, context.exchange),
            validations,
            Some(positions_store),
            bus,
        ))
    }

    /// Starts the infinite tick loop in the background, returning its
    /// result stream and a handle to cancel it.
    pub fn background(&self) -> (impl Stream<Item = TickResult>, CancelToken) {
        let cancel = CancelToken::new();
        (self.orchestrator.clone().run(cancel.clone()), cancel)
    }

    pub async fn request_stop(&self) {
        self.machine.request_stop().await;
    }

    pub async fn request_cancel(&self) {
        self.machine.request_cancel().await;
    }
}
