use sigex_store::PartialStateRecord;
use std::collections::BTreeSet;

const LEVELS: [u32; 10] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

/// Deduplicates profit/loss milestone emission for one signal. One
/// instance per signal id, owned by the `SignalMachine` that created it;
/// disposed (and its persisted entry removed) when the signal closes.
///
/// Mirrors `BrokerOrderMap`'s keyed-lifecycle contract: callers register a
/// milestone check every tick, and clearing on close is mandatory to keep
/// the backing persistence directory bounded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialTracker {
    profit_levels: BTreeSet<u32>,
    loss_levels: BTreeSet<u32>,
}

fn bucket_for(percent: f64) -> u32 {
    if !percent.is_finite() || percent < 10.0 {
        return 0;
    }
    let bucket = (percent / 10.0).floor() as i64 * 10;
    bucket.clamp(0, 100) as u32
}

impl PartialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: PartialStateRecord) -> Self {
        PartialTracker {
            profit_levels: record.profit_levels,
            loss_levels: record.loss_levels,
        }
    }

    pub fn to_record(&self) -> PartialStateRecord {
        PartialStateRecord {
            profit_levels: self.profit_levels.clone(),
            loss_levels: self.loss_levels.clone(),
        }
    }

    /// Returns every newly-crossed profit level this call, ascending, each
    /// to be emitted as one `partial-profit` bus event. Empty if
    /// `revenue_percent` is below the first bucket or every bucket up to it
    /// was already reached.
    pub fn profit(&mut self, revenue_percent: f64) -> Vec<u32> {
        Self::absorb(&mut self.profit_levels, revenue_percent)
    }

    /// Mirror of [`Self::profit`] for adverse excursion.
    pub fn loss(&mut self, loss_percent: f64) -> Vec<u32> {
        Self::absorb(&mut self.loss_levels, loss_percent)
    }

    fn absorb(set: &mut BTreeSet<u32>, percent: f64) -> Vec<u32> {
        let bucket = bucket_for(percent);
        if bucket == 0 {
            return Vec::new();
        }
        let mut newly_reached = Vec::new();
        for level in LEVELS {
            if level > bucket {
                break;
            }
            if set.insert(level) {
                newly_reached.push(level);
            }
        }
        newly_reached
    }

    pub fn clear(&mut self) {
        self.profit_levels.clear();
        self.loss_levels.clear();
    }
}
