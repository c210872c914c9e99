//! Field and weather processing pipelines.
//!
//! Each processor owns one table and runs a fixed sequence of stages over
//! it. Stages replace the table wholesale; nothing is shared between the
//! two processors except the field/station join key.

pub mod field;
pub mod weather;

#[cfg(test)]
pub mod tests;

pub use field::FieldDataProcessor;
pub use weather::WeatherDataProcessor;

use crate::error::{PipelineError, Result};
use polars::prelude::DataFrame;

/// Fail with `ColumnNotFound` unless `column` exists in `frame`
pub(crate) fn require_column(frame: &DataFrame, column: &str, context: &str) -> Result<()> {
    if frame.get_column_index(column).is_none() {
        return Err(PipelineError::column_not_found(column, context));
    }
    Ok(())
}
