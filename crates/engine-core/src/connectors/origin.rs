use crate::error::SourceError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use model::records::row::RowData;
use num_bigint::BigInt;

pub mod key_factory;

/// Lazy, single-pass sequence of origin rows.
pub type RowStream = BoxStream<'static, Result<RowData, SourceError>>;

/// A token-range read bound to concrete limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub min: BigInt,
    pub max: BigInt,
    /// Page size hint for the driver.
    pub fetch_size: Option<usize>,
}

impl RangeQuery {
    pub fn new(min: BigInt, max: BigInt) -> Self {
        Self {
            min,
            max,
            fetch_size: None,
        }
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }
}

/// Read side of a token-partitioned store.
#[async_trait]
pub trait OriginReader: Send + Sync {
    fn bind(&self, min: &BigInt, max: &BigInt) -> Result<RangeQuery, SourceError> {
        if min > max {
            return Err(SourceError::Bind {
                min: min.to_string(),
                max: max.to_string(),
                message: "lower bound is above upper bound".to_string(),
            });
        }
        Ok(RangeQuery::new(min.clone(), max.clone()))
    }

    async fn execute(&self, query: RangeQuery) -> Result<RowStream, SourceError>;

    /// Rows matching this predicate are counted as skipped and never written.
    fn should_filter(&self, _row: &RowData) -> bool {
        false
    }
}
