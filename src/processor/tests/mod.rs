//! Unit tests for the processing pipelines
//!
//! Collaborators are replaced with in-memory doubles so every stage can be
//! exercised without a database file or network access.

pub mod weather_tests;

use crate::config::LogLevel;
use crate::error::{PipelineError, Result};
use crate::ingestion::{CsvSource, Database, DatabaseHandle};
use crate::logging::{Logger, MemorySink};
use polars::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Database double returning a fixed table (or an empty result)
#[derive(Clone)]
pub struct StaticDatabase {
    pub frame: DataFrame,
    pub opened: Arc<AtomicUsize>,
}

impl StaticDatabase {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct StaticHandle {
    frame: DataFrame,
}

impl Database for StaticDatabase {
    fn open(&self, _url: &str) -> Result<Box<dyn DatabaseHandle>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticHandle {
            frame: self.frame.clone(),
        }))
    }
}

impl DatabaseHandle for StaticHandle {
    fn query(&mut self, sql: &str) -> Result<DataFrame> {
        if self.frame.height() == 0 {
            return Err(PipelineError::EmptyResult {
                query: sql.to_string(),
            });
        }
        Ok(self.frame.clone())
    }
}

/// Database double whose connection always fails
pub struct UnreachableDatabase;

impl Database for UnreachableDatabase {
    fn open(&self, url: &str) -> Result<Box<dyn DatabaseHandle>> {
        Err(PipelineError::Connection {
            url: url.to_string(),
            source: sqlx::Error::PoolTimedOut,
        })
    }
}

/// CSV double serving tables by location
#[derive(Default, Clone)]
pub struct StaticCsv {
    pub tables: HashMap<String, DataFrame>,
}

impl StaticCsv {
    pub fn with_table(mut self, location: &str, frame: DataFrame) -> Self {
        self.tables.insert(location.to_string(), frame);
        self
    }
}

impl CsvSource for StaticCsv {
    fn fetch(&self, location: &str) -> Result<DataFrame> {
        self.tables.get(location).cloned().ok_or_else(|| {
            PipelineError::network(
                location,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such table"),
            )
        })
    }
}

/// Logger capturing every line at debug level
pub fn capturing_logger() -> (Logger, MemorySink) {
    let sink = MemorySink::new();
    let logger = Logger::new(LogLevel::Debug, Arc::new(sink.clone()));
    (logger, sink)
}

pub fn strings(frame: &DataFrame, column: &str) -> Vec<Option<String>> {
    frame
        .column(column)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect()
}

pub fn ints(frame: &DataFrame, column: &str) -> Vec<Option<i64>> {
    frame
        .column(column)
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

pub fn floats(frame: &DataFrame, column: &str) -> Vec<Option<f64>> {
    frame
        .column(column)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}
