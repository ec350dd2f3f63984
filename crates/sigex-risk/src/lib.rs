//! RiskGate: per-risk-profile shared active-position map, checked by
//! every `SignalMachine` on that profile before a signal is allowed to open.

mod validation;

pub use validation::{RiskRejection, ValidationArgs, ValidationFn};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;

use sigex_bus::{BusEvent, EventBus};
use sigex_store::{ActivePositionStore, PersistError};
use sigex_types::ActivePosition;

/// Shared across every `SignalMachine` using the same risk profile — held
/// behind an `Arc` by callers, resolving the SignalMachine-RiskGate cyclic
/// reference: RiskGate lives in a shared handle, SignalMachines each
/// hold a clone of it.
pub struct RiskGate {
    risk_exchange_key: String,
    positions: Mutex<HashMap<String, ActivePosition>>,
    validations: Vec<ValidationFn>,
    store: Option<Arc<ActivePositionStore>>,
    bus: EventBus,
    loaded: OnceCell<()>,
}

impl RiskGate {
    pub fn new(
        risk_exchange_key: impl Into<String>,
        validations: Vec<ValidationFn>,
        store: Option<Arc<ActivePositionStore>>,
        bus: EventBus,
    ) -> Self {
        RiskGate {
            risk_exchange_key: risk_exchange_key.into(),
            positions: Mutex::new(HashMap::new()),
            validations,
            store,
            bus,
            loaded: OnceCell::new(),
        }
    }

    /// Lazy-load the map from persistence on first call.
    /// Backtest callers pass `store: None` at construction, so this is a
    /// no-op for them — backtest mode skips persistence entirely.
    async fn ensure_loaded(&self) -> Result<(), PersistError> {
        self.loaded
            .get_or_try_init(|| async {
                if let Some(store) = &self.store {
                    let mut guard = self.positions.lock().await;
                    for (key, position) in store.load(&self.risk_exchange_key).await? {
                        guard.insert(key, position);
                    }
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Runs every configured validation, in order, short-circuiting on the
    /// first rejection. Returns `true` iff every validation passed — the
    /// caller is then responsible for calling [`Self::add_signal`].
    pub async fn check_signal(&self, args: ValidationArgs<'_>) -> bool {
        if self.ensure_loaded().await.is_err() {
            // Persistence completely broken is fatal in the full
            // system; here the fail-closed choice is to reject the signal
            // rather than risk operating on a stale/empty position view.
            warn!(
            risk_exchange_key = %self.risk_exchange_key,
            "risk gate failed to load persisted positions, rejecting signal"
            );
            self.bus.publish(BusEvent::RiskRejection {
                context_key: args.position_key(),
                note: "risk gate failed to load persisted positions".to_string(),
                when: Utc::now(),
            });
            return false;
        }

        let positions = self.positions.lock().await;
        let active_position_count = positions.len();
        let snapshot: HashMap<String, ActivePosition> = positions.clone();
        drop(positions);

        for validation in &self.validations {
            if let Err(rejection) = validation(&args, active_position_count, &snapshot) {
                self.bus.publish(BusEvent::RiskRejection {
                    context_key: args.position_key(),
                    note: rejection.note,
                    when: Utc::now(),
                });
                return false;
            }
        }
        true
    }

    pub async fn add_signal(
        &self,
        position_key: String,
        position: ActivePosition,
        backtest: bool,
    ) -> Result<(), PersistError> {
        self.ensure_loaded().await?;
        let mut guard = self.positions.lock().await;
        guard.insert(position_key, position);
        if !backtest {
            if let Some(store) = &self.store {
                let snapshot: Vec<_> = guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                store.save(&self.risk_exchange_key, &snapshot).await?;
            }
        }
        Ok(())
    }

    pub async fn remove_signal(
        &self,
        position_key: &str,
        backtest: bool,
    ) -> Result<(), PersistError> {
        self.ensure_loaded().await?;
        let mut guard = self.positions.lock().await;
        guard.remove(position_key);
        if !backtest {
            if let Some(store) = &self.store {
                let snapshot: Vec<_> = guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                store.save(&self.risk_exchange_key, &snapshot).await?;
            }
        }
        Ok(())
    }

    pub async fn active_position_count(&self) -> usize {
        let _ = self.ensure_loaded().await;
        self.positions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigex_types::{Direction, SignalDto};

    fn dto() -> SignalDto {
        SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: 52000.0,
            price_stop_loss: 49000.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        }
    }

    fn sample_position() -> ActivePosition {
        ActivePosition {
            strategy: "trend".into(),
            exchange: "paper".into(),
            frame: "".into(),
            symbol: "BTCUSDT".into(),
            direction: Direction::Long,
            price_open: 50000.0,
            price_stop_loss: 49000.0,
            price_take_profit: 52000.0,
            minute_estimated_time: 60,
            open_timestamp: Utc::now(),
        }
    }

    fn always_pass(
        _args: &ValidationArgs<'_>,
        _count: usize,
        _positions: &HashMap<String, ActivePosition>,
    ) -> Result<(), RiskRejection> {
        Ok(())
    }

    fn always_reject(
        _args: &ValidationArgs<'_>,
        _count: usize,
        _positions: &HashMap<String, ActivePosition>,
    ) -> Result<(), RiskRejection> {
        Err(RiskRejection {
            id: Some("always-reject".into()),
            note: "nope".into(),
        })
    }

    fn args() -> SignalDto {
        dto()
    }

    #[tokio::test]
    async fn empty_validation_list_allows() {
        let bus = EventBus::new();
        let gate = RiskGate::new("default_paper", vec![], None, bus);
        let d = args();
        let allowed = gate
            .check_signal(ValidationArgs::new(
                "BTCUSDT",
                "trend",
                "paper",
                "default",
                "",
                &d,
                50000.0,
                Utc::now(),
            ))
            .await;
        assert!(allowed);
    }

    #[tokio::test]
    async fn first_rejection_short_circuits() {
        let bus = EventBus::new();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        let counting_validation: ValidationFn = Arc::new(move |a, c, p| {
            calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            always_pass(a, c, p)
        });
        let gate = RiskGate::new(
            "default_paper",
            vec![Arc::new(always_reject), counting_validation],
            None,
            bus,
        );
        let d = args();
        let allowed = gate
            .check_signal(ValidationArgs::new(
                "BTCUSDT",
                "trend",
                "paper",
                "default",
                "",
                &d,
                50000.0,
                Utc::now(),
            ))
            .await;
        assert!(!allowed);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_then_remove_balances_count() {
        let bus = EventBus::new();
        let gate = RiskGate::new("default_paper", vec![], None, bus);
        gate.add_signal("trend:paper:BTCUSDT".into(), sample_position(), true)
            .await
            .unwrap();
        assert_eq!(gate.active_position_count().await, 1);
        gate.remove_signal("trend:paper:BTCUSDT", true)
            .await
            .unwrap();
        assert_eq!(gate.active_position_count().await, 0);
    }

    #[tokio::test]
    async fn backtest_mode_skips_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivePositionStore::new(dir.path()));
        let bus = EventBus::new();
        let gate = RiskGate::new("default_paper", vec![], Some(store.clone()), bus);
        gate.add_signal("trend:paper:BTCUSDT".into(), sample_position(), true)
            .await
            .unwrap();
        let persisted = store.load("default_paper").await.unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn live_mode_persists_and_reloads_across_gates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivePositionStore::new(dir.path()));
        let bus = EventBus::new();
        let gate = RiskGate::new("default_paper", vec![], Some(store.clone()), bus.clone());
        gate.add_signal("trend:paper:BTCUSDT".into(), sample_position(), false)
            .await
            .unwrap();

        let gate2 = RiskGate::new("default_paper", vec![], Some(store), bus);
        assert_eq!(gate2.active_position_count().await, 1);
    }
}
