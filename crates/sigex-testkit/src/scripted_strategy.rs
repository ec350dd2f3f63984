use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sigex_strategy::Strategy;
use sigex_types::SignalDto;

/// A `Strategy` that returns a fixed, ordered script of DTOs (and `None`s),
/// one per call, then `None` forever after the script is exhausted.
/// Grounded on `sigex-signal`'s own `OneShot` test helper, generalized from
/// a single scripted value to an ordered queue so orchestrator-level tests
/// can script "signal this tick, then nothing for N ticks, then another
/// signal" without a bespoke `Strategy` per test.
pub struct ScriptedStrategy {
    script: Mutex<std::collections::VecDeque<Option<SignalDto>>>,
}

impl ScriptedStrategy {
    pub fn new(script: impl IntoIterator<Item = Option<SignalDto>>) -> Self {
        ScriptedStrategy {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// Convenience for the common single-signal-then-nothing case.
    pub fn one_shot(dto: SignalDto) -> Self {
        Self::new([Some(dto)])
    }
}

#[async_trait]
impl Strategy for ScriptedStrategy {
    async fn get_signal(&self, _symbol: &str, _when: DateTime<Utc>) -> Option<SignalDto> {
        self.script.lock().unwrap().pop_front().flatten()
    }
}
