use crate::records::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record that could not be written or validated, ready for a failure log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    pub id: String,
    pub stage: ProcessingStage,
    pub primary_key: String,
    pub record_data: String,
    pub error: FailureError,
    pub partition: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// The stage of the partition pipeline where the failure occurred
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStage {
    Read,
    Bind,
    Write,
    Validate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureError {
    pub error_type: String,
    pub message: String,
}

impl FailedRecord {
    pub fn new(
        record: &Record,
        stage: ProcessingStage,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stage,
            primary_key: record.pk.to_string(),
            record_data: record.origin.flat_values(),
            error: FailureError {
                error_type: error_type.into(),
                message: message.into(),
            },
            partition: None,
            failed_at: Utc::now(),
        }
    }

    pub fn from_error(
        record: &Record,
        stage: ProcessingStage,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self::new(record, stage, error_type_name(error), error.to_string())
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Error message on a single line, suitable for CSV cells.
    pub fn single_line_message(&self) -> String {
        self.error.message.replace(['\r', '\n'], " ")
    }
}

/// First segment of the error's debug form, e.g. `Db` for `Db(..)`.
fn error_type_name(error: &(dyn std::error::Error + 'static)) -> String {
    let debug = format!("{error:?}");
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Read => write!(f, "Read"),
            ProcessingStage::Bind => write!(f, "Bind"),
            ProcessingStage::Write => write!(f, "Write"),
            ProcessingStage::Validate => write!(f, "Validate"),
        }
    }
}
