use crate::{connectors::sink::FailureSink, error::SinkError};
use chrono::Utc;
use model::{
    execution::failed_record::{FailedRecord, ProcessingStage},
    records::record::Record,
};
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use tracing::info;

const RECORDS_HEADER: [&str; 3] = ["timestamp", "primary_key", "record_data"];
const KEYS_HEADER: [&str; 4] = ["timestamp", "primary_key", "error_type", "error_message"];

/// CSV failure logs: one file with the full payload of every failed record and
/// one with just its key and error, both stamped with the creation time.
pub struct FailedRecordLog {
    records: Mutex<csv::Writer<File>>,
    keys: Mutex<csv::Writer<File>>,
    records_path: PathBuf,
    keys_path: PathBuf,
}

impl FailedRecordLog {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let records_path = dir.join(format!("failed_records_{stamp}.csv"));
        let keys_path = dir.join(format!("failed_keys_{stamp}.csv"));

        let records = open_writer(&records_path, &RECORDS_HEADER)?;
        let keys = open_writer(&keys_path, &KEYS_HEADER)?;
        info!(records = %records_path.display(), keys = %keys_path.display(), "Failure logs opened");

        Ok(Self {
            records: Mutex::new(records),
            keys: Mutex::new(keys),
            records_path,
            keys_path,
        })
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    pub fn keys_path(&self) -> &Path {
        &self.keys_path
    }

    fn write(
        writer: &Mutex<csv::Writer<File>>,
        row: &[String],
    ) -> Result<(), SinkError> {
        let mut writer = lock(writer);
        writer.write_record(row)?;
        writer.flush()?;
        Ok(())
    }
}

impl FailureSink for FailedRecordLog {
    fn log_failed_record(
        &self,
        record: &Record,
        error: &(dyn Error + Send + Sync + 'static),
    ) -> Result<(), SinkError> {
        let failed = FailedRecord::from_error(record, ProcessingStage::Write, error);
        Self::write(
            &self.records,
            &[timestamp(&failed), failed.primary_key, failed.record_data],
        )
    }

    fn log_failed_key(
        &self,
        record: &Record,
        error: &(dyn Error + Send + Sync + 'static),
    ) -> Result<(), SinkError> {
        let failed = FailedRecord::from_error(record, ProcessingStage::Write, error);
        let message = failed.single_line_message();
        Self::write(
            &self.keys,
            &[
                timestamp(&failed),
                failed.primary_key,
                failed.error.error_type,
                message,
            ],
        )
    }
}

fn timestamp(failed: &FailedRecord) -> String {
    failed.failed_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Appends to `path`, writing the header only into a fresh file.
fn open_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<File>, SinkError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_new = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_new {
        writer.write_record(header)?;
        writer.flush()?;
    }
    Ok(writer)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
