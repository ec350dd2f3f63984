use std::sync::Arc;

use futures_util::Stream;

use sigex_bus::{CancelToken, EventBus};
use sigex_config::SignalConfig;
use sigex_exchange::Exchange;
use sigex_risk::{RiskGate, ValidationFn};
use sigex_signal::SignalMachine;
use sigex_store::ActivePositionStore;
use sigex_strategy::Strategy;
use sigex_types::{Frame, SignalContext, TickResult};

use crate::orchestrator::BacktestOrchestrator;

/// Public entry point for running a strategy over a historical `Frame`
///. Wraps a fresh `SignalMachine`/`RiskGate` pair around the
/// orchestrator and injects the caller's context — every call to
/// [`Backtest::new`] starts from a clean active-position map, so repeated
/// runs against the same risk profile in one process never leak state
/// between them.
pub struct Backtest {
    machine: Arc<SignalMachine>,
    orchestrator: Arc<BacktestOrchestrator>,
}

impl Backtest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SignalContext,
        frame: Frame,
        config: SignalConfig,
        exchange: Arc<dyn Exchange>,
        strategy: Arc<dyn Strategy>,
        risk_validations: Vec<ValidationFn>,
        bus: EventBus,
    ) -> Self {
        let risk = Arc::new(RiskGate::new(
            format!("{}_{}", context.risk, context.exchange),
            risk_validations,
            None::<Arc<ActivePositionStore>>,
            bus.clone(),
        ));
        let mut machine = SignalMachine::new(
            context.clone(),
            config.clone(),
            exchange.clone(),
            risk,
            None,
            bus.clone(),
            true,
        );
        machine.register_strategy(strategy);
        let machine = Arc::new(machine);
        let orchestrator = Arc::new(BacktestOrchestrator::new(
            context.symbol.clone(),
            frame,
            machine.clone(),
            exchange,
            config,
            bus,
        ));
        Backtest {
            machine,
            orchestrator,
        }
    }

    /// Runs the full walk, returning its terminal-result stream and a
    /// handle to stop it early. Dropping the stream without exhausting
    /// it is also a valid way to stop — the walk simply never resumes.
    pub fn background(&self) -> (impl Stream<Item = TickResult>, CancelToken) {
        let cancel = CancelToken::new();
        (self.orchestrator.clone().run(cancel.clone()), cancel)
    }

    pub async fn request_stop(&self) {
        self.machine.request_stop().await;
    }
}
