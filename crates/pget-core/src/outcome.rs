//! First-error-wins aggregation of task outcomes.

use std::sync::OnceLock;

use crate::error::BatchError;

/// Single-assignment cell holding a batch's first reported error.
#[derive(Debug, Default)]
pub struct FirstError {
    cell: OnceLock<BatchError>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `err` if no error has been recorded yet. Returns the error back
    /// when another task got there first, so the caller can log and drop it.
    pub fn record(&self, err: BatchError) -> Result<(), BatchError> {
        self.cell.set(err)
    }

    pub fn into_result(self) -> Result<(), BatchError> {
        match self.cell.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
