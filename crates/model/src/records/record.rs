use crate::records::{key::PrimaryKey, row::RowData};
use std::{fmt, sync::Arc};

/// A logical row on its way to the target.
///
/// `origin` is shared between all records fanned out of the same origin row.
/// `target` is only populated for counter tables, where the current target
/// value must be merged before writing.
#[derive(Debug, Clone)]
pub struct Record {
    pub pk: PrimaryKey,
    pub origin: Arc<RowData>,
    pub target: Option<RowData>,
}

impl Record {
    pub fn new(pk: PrimaryKey, origin: Arc<RowData>) -> Self {
        Self {
            pk,
            origin,
            target: None,
        }
    }

    pub fn with_target(mut self, target: Option<RowData>) -> Self {
        self.target = target;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.pk.is_valid()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.pk, self.origin.flat_values())
    }
}
