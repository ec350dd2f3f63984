use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sigex_types::{ActivePosition, Signal};

use crate::json_store::{JsonStore, PersistError};
use crate::partial_record::PartialStateRecord;

fn memoized_handle<T>(
    cache: &Mutex<HashMap<String, Arc<JsonStore<T>>>>,
    root: &Path,
    subdomain: &str,
    entity_key: &str,
) -> Arc<JsonStore<T>>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut guard = cache.lock().expect("persistence handle cache poisoned");
    guard
        .entry(entity_key.to_string())
        .or_insert_with(|| Arc::new(JsonStore::new(root.join(subdomain).join(entity_key))))
        .clone()
}

/// Adapter-shaped façade over the pending-signal, scheduled-signal, and
/// partial-state domains. Persistence handles are memoized per
/// entity key for the process lifetime, so every `SignalMachine` for the
/// same (symbol, strategy, exchange) shares one `JsonStore` and therefore
/// one self-healing init pass.
///
/// Swapping the backend (e.g. to a key-value store) means reimplementing
/// this façade's methods against a different storage primitive; callers
/// never touch `JsonStore` directly.
pub struct SignalStore {
    root: PathBuf,
    pending: Mutex<HashMap<String, Arc<JsonStore<Signal>>>>,
    scheduled: Mutex<HashMap<String, Arc<JsonStore<Signal>>>>,
    partial: Mutex<HashMap<String, Arc<JsonStore<PartialStateRecord>>>>,
}

impl SignalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SignalStore {
            root: root.into(),
            pending: Mutex::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
            partial: Mutex::new(HashMap::new()),
        }
    }

    fn pending_handle(&self, entity_key: &str) -> Arc<JsonStore<Signal>> {
        memoized_handle(&self.pending, &self.root, "pending-signals", entity_key)
    }

    fn scheduled_handle(&self, entity_key: &str) -> Arc<JsonStore<Signal>> {
        memoized_handle(&self.scheduled, &self.root, "scheduled-signals", entity_key)
    }

    fn partial_handle(&self, entity_key: &str) -> Arc<JsonStore<PartialStateRecord>> {
        memoized_handle(&self.partial, &self.root, "partial-state", entity_key)
    }

    pub async fn load_pending(
        &self,
        entity_key: &str,
        symbol: &str,
    ) -> Result<Option<Signal>, PersistError> {
        self.pending_handle(entity_key).load(symbol).await
    }

    pub async fn save_pending(
        &self,
        entity_key: &str,
        symbol: &str,
        signal: &Signal,
    ) -> Result<(), PersistError> {
        self.pending_handle(entity_key).save(symbol, signal).await
    }

    pub async fn clear_pending(&self, entity_key: &str, symbol: &str) -> Result<(), PersistError> {
        self.pending_handle(entity_key).remove(symbol).await
    }

    pub async fn load_scheduled(
        &self,
        entity_key: &str,
        symbol: &str,
    ) -> Result<Option<Signal>, PersistError> {
        self.scheduled_handle(entity_key).load(symbol).await
    }

    pub async fn save_scheduled(
        &self,
        entity_key: &str,
        symbol: &str,
        signal: &Signal,
    ) -> Result<(), PersistError> {
        self.scheduled_handle(entity_key).save(symbol, signal).await
    }

    pub async fn clear_scheduled(
        &self,
        entity_key: &str,
        symbol: &str,
    ) -> Result<(), PersistError> {
        self.scheduled_handle(entity_key).remove(symbol).await
    }

    pub async fn load_partial(
        &self,
        entity_key: &str,
        signal_id: &str,
    ) -> Result<PartialStateRecord, PersistError> {
        Ok(self
            .partial_handle(entity_key)
            .load(signal_id)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_partial(
        &self,
        entity_key: &str,
        signal_id: &str,
        record: &PartialStateRecord,
    ) -> Result<(), PersistError> {
        self.partial_handle(entity_key)
            .save(signal_id, record)
            .await
    }

    pub async fn clear_partial(
        &self,
        entity_key: &str,
        signal_id: &str,
    ) -> Result<(), PersistError> {
        self.partial_handle(entity_key).remove(signal_id).await
    }
}

/// Positions are persisted as a single `positions.json` array of
/// `(position_key, ActivePosition)` pairs per `{risk}_{exchange}` entity —
/// rather than one file per position, since
/// RiskGate always loads/saves the whole map atomically.
pub struct ActivePositionStore {
    root: PathBuf,
    handles: Mutex<HashMap<String, Arc<JsonStore<Vec<(String, ActivePosition)>>>>>,
}

const POSITIONS_FILE_KEY: &str = "positions";

impl ActivePositionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ActivePositionStore {
            root: root.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handle(&self, risk_exchange_key: &str) -> Arc<JsonStore<Vec<(String, ActivePosition)>>> {
        memoized_handle(
            &self.handles,
            &self.root,
            "active-positions",
            risk_exchange_key,
        )
    }

    pub async fn load(
        &self,
        risk_exchange_key: &str,
    ) -> Result<Vec<(String, ActivePosition)>, PersistError> {
        Ok(self
            .handle(risk_exchange_key)
            .load(POSITIONS_FILE_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn save(
        &self,
        risk_exchange_key: &str,
        positions: &[(String, ActivePosition)],
    ) -> Result<(), PersistError> {
        self.handle(risk_exchange_key)
            .save(POSITIONS_FILE_KEY, &positions.to_vec())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigex_types::{Direction, SignalContext, SignalDto};

    fn sample_signal() -> Signal {
        let ctx = SignalContext::new("BTCUSDT", "trend", "paper", "", "default");
        let dto = SignalDto {
            direction: Direction::Long,
            price_open: None,
            price_take_profit: 52000.0,
            price_stop_loss: 49000.0,
            minute_estimated_time: 60,
            note: None,
            id: None,
        };
        Signal::new(ctx, &dto, Utc::now(), 50000.0)
    }

    #[tokio::test]
    async fn pending_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignalStore::new(dir.path());
        let sig = sample_signal();
        store
            .save_pending("BTCUSDT_trend_paper", "BTCUSDT", &sig)
            .await
            .unwrap();
        let got = store
            .load_pending("BTCUSDT_trend_paper", "BTCUSDT")
            .await
            .unwrap();
        assert_eq!(got.unwrap().id, sig.id);
    }

    #[tokio::test]
    async fn clearing_pending_leaves_scheduled_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignalStore::new(dir.path());
        let sig = sample_signal();
        store
            .save_scheduled("BTCUSDT_trend_paper", "BTCUSDT", &sig)
            .await
            .unwrap();
        store
            .clear_pending("BTCUSDT_trend_paper", "BTCUSDT")
            .await
            .unwrap();
        let got = store
            .load_scheduled("BTCUSDT_trend_paper", "BTCUSDT")
            .await
            .unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn partial_state_defaults_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SignalStore::new(dir.path());
        let rec = store
            .load_partial("BTCUSDT_trend_paper", "some-signal-id")
            .await
            .unwrap();
        assert!(rec.profit_levels.is_empty());
        assert!(rec.loss_levels.is_empty());
    }

    #[tokio::test]
    async fn active_positions_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ActivePositionStore::new(dir.path());
        let pos = ActivePosition {
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
        };
        store
            .save(
                "default_paper",
                &[("trend:paper:BTCUSDT".to_string(), pos.clone())],
            )
            .await
            .unwrap();
        let got = store.load("default_paper").await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "trend:paper:BTCUSDT");
    }
}
