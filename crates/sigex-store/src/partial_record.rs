use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted shape of a `PartialTracker`'s reached-level sets. The tracker rebuilds its in-memory `BTreeSet`s
/// from this on load; this record is the only thing written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialStateRecord {
    pub profit_levels: BTreeSet<u32>,
    pub loss_levels: BTreeSet<u32>,
}
