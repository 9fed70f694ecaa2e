use crate::{
    connectors::sink::RunTracker, counter::CounterSnapshot, error::SinkError,
    state::models::RunEntry,
};
use async_trait::async_trait;
use chrono::Utc;
use model::execution::run::RunStatus;
use num_bigint::BigInt;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

/// Run tracker persisted in a local sled database, one entry per
/// `(run, partition)`.
pub struct SledRunTracker {
    db: sled::Db,
}

impl SledRunTracker {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn run_prefix(run_id: &str) -> String {
        format!("run:{}:", run_id)
    }

    #[inline]
    fn entry_key(run_id: &str, partition_key: &BigInt) -> String {
        format!("{}{}", Self::run_prefix(run_id), partition_key)
    }

    pub fn load(&self, run_id: &str, partition_key: &BigInt) -> Result<Option<RunEntry>, SinkError> {
        match self.db.get(Self::entry_key(run_id, partition_key))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every partition of `run_id`, ordered by token.
    pub fn list(&self, run_id: &str) -> Result<Vec<RunEntry>, SinkError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(Self::run_prefix(run_id)) {
            let (_key, value) = item?;
            entries.push(bincode::deserialize::<RunEntry>(&value)?);
        }

        entries.sort_by_key(|e| e.partition_key.parse::<BigInt>().unwrap_or_default());
        Ok(entries)
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl RunTracker for SledRunTracker {
    async fn update_run(
        &self,
        run_id: &str,
        partition_key: &BigInt,
        status: RunStatus,
        snapshot: &CounterSnapshot,
    ) -> Result<(), SinkError> {
        let key = Self::entry_key(run_id, partition_key);
        let entry = RunEntry {
            run_id: run_id.to_string(),
            partition_key: partition_key.to_string(),
            status,
            snapshot: *snapshot,
            updated_at: Utc::now(),
        };
        let new_bytes = bincode::serialize(&entry)?;

        // Check-then-set in one transaction so a late STARTED never hides
        // the outcome of the same partition.
        let result = self.db.transaction::<_, _, bincode::Error>(|tx_db| {
            if let Some(existing_bytes) = tx_db.get(&key)? {
                let existing: RunEntry = bincode::deserialize(&existing_bytes)
                    .map_err(ConflictableTransactionError::Abort)?;

                if existing.status.is_terminal() && !status.is_terminal() {
                    return Ok(false);
                }
            }

            tx_db.insert(key.as_bytes(), new_bytes.as_slice())?;
            Ok(true)
        });

        match result {
            Ok(applied) => {
                debug!(run_id, partition = %partition_key, %status, applied, "Run status updated");
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(SinkError::Serialization(e)),
            Err(TransactionError::Storage(e)) => Err(SinkError::Store(e)),
        }
    }
}
