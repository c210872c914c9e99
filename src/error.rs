//! Error handling for pipeline operations.
//!
//! Every hard failure of the field and weather pipelines is one of these
//! variants. Soft failures (stages invoked before data is loaded) are not
//! errors: they are logged and the stage returns `Ok(None)`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to connect to database '{url}': {source}")]
    Connection {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {source}. Query: {query}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("The query returned an empty result set: {query}")]
    EmptyResult { query: String },

    #[error("Failed to fetch CSV from '{location}': {source}")]
    Network {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("'{location}' does not contain a valid CSV table: {message}")]
    Format { location: String, message: String },

    #[error("Column '{column}' not found ({context})")]
    ColumnNotFound { column: String, context: String },

    #[error("Could not parse value '{raw}' extracted for measurement '{measurement}'")]
    Value { measurement: String, raw: String },

    #[error("Stage '{stage}' requires ingested data but none is loaded")]
    NotLoaded { stage: &'static str },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a column-not-found error with the stage that needed the column
    pub fn column_not_found(column: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
            context: context.into(),
        }
    }

    /// Create a CSV format error
    pub fn format(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a network error from any transport failure
    pub fn network(
        location: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            location: location.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
