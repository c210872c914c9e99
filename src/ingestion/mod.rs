//! Ingestion collaborators: SQL query results and remote CSV tables.
//!
//! Both collaborators expose a blocking surface. The network and database
//! drivers are async, so each call drives its own short-lived runtime and
//! releases it before returning.

pub mod database;
pub mod remote_csv;

pub use database::{SqliteDatabase, SqliteHandle};
pub use remote_csv::RemoteCsvSource;

use crate::error::Result;
use polars::prelude::DataFrame;

/// Opens connections to a relational data source
pub trait Database {
    fn open(&self, url: &str) -> Result<Box<dyn DatabaseHandle>>;
}

/// An open connection, used for a single query and then dropped
pub trait DatabaseHandle {
    /// Run a query; an empty result set is an error
    fn query(&mut self, sql: &str) -> Result<DataFrame>;
}

/// Fetches a tabular CSV file from a URL or path
pub trait CsvSource {
    fn fetch(&self, location: &str) -> Result<DataFrame>;
}

pub(crate) fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
