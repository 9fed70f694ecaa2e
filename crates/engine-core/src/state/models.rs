use crate::counter::CounterSnapshot;
use chrono::{DateTime, Utc};
use model::execution::run::RunStatus;
use serde::{Deserialize, Serialize};

/// Last known state of one partition within a run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunEntry {
    pub run_id: String,
    /// Lower token bound of the partition, in decimal.
    pub partition_key: String,
    pub status: RunStatus,
    pub snapshot: CounterSnapshot,
    pub updated_at: DateTime<Utc>,
}
