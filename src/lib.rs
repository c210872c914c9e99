//! Agricultural data pipeline library
//!
//! Two independent processors feed an agricultural analytics workflow:
//!
//! - [`FieldDataProcessor`] ingests field-survey records from a SQL database,
//!   swaps two mislabelled columns, normalises crop labels and elevations,
//!   and attaches each field's weather station from a remote CSV mapping.
//! - [`WeatherDataProcessor`] fetches weather-station messages as CSV,
//!   classifies each free-text message with an ordered list of regex
//!   patterns and reports the mean of every measurement per station.
//!
//! Collaborators (database, CSV source, log sink) sit behind traits so both
//! pipelines can run against in-memory doubles.

pub mod cli;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod measurement;
pub mod models;
pub mod processor;

pub use config::{
    ColumnSwap, FieldConfig, LogLevel, MeasurementPattern, PipelineConfig, WeatherConfig,
};
pub use error::{PipelineError, Result};
pub use logging::Logger;
pub use models::{FieldStats, WeatherStats};
pub use processor::{FieldDataProcessor, WeatherDataProcessor};
