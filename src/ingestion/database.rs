//! SQLite ingestion via `sqlx`.

use super::{Database, DatabaseHandle, current_thread_runtime};
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column as _, Connection, Row};
use std::borrow::Cow;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Rewrite a SQLAlchemy-style SQLite URL into the form `sqlx` expects.
///
/// SQLAlchemy puts the path after three slashes, so `sqlite:///farm.db` is
/// relative and `sqlite:////srv/farm.db` is absolute. `sqlx` reads
/// everything after `sqlite://` as the path. Other URLs pass through.
pub fn normalize_sqlite_url(url: &str) -> Cow<'_, str> {
    match url.strip_prefix("sqlite:///") {
        Some(path) => Cow::Owned(format!("sqlite://{}", path)),
        None => Cow::Borrowed(url),
    }
}

/// Connector for SQLite databases
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDatabase;

impl SqliteDatabase {
    pub fn new() -> Self {
        Self
    }

    /// Open a connection and return the concrete handle
    pub fn connect(&self, url: &str) -> Result<SqliteHandle> {
        let runtime = current_thread_runtime()?;
        let target = normalize_sqlite_url(url);
        debug!("Connecting to {}", target);

        let connection = runtime
            .block_on(SqliteConnection::connect(&target))
            .map_err(|source| PipelineError::Connection {
                url: url.to_string(),
                source,
            })?;

        info!("Database connection established: {}", url);
        Ok(SqliteHandle {
            runtime,
            connection: Some(connection),
        })
    }
}

impl Database for SqliteDatabase {
    fn open(&self, url: &str) -> Result<Box<dyn DatabaseHandle>> {
        Ok(Box::new(self.connect(url)?))
    }
}

/// Open SQLite connection; closed on drop
pub struct SqliteHandle {
    runtime: Runtime,
    connection: Option<SqliteConnection>,
}

impl std::fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("open", &self.connection.is_some())
            .finish()
    }
}

impl SqliteHandle {
    /// Run one or more statements that return no rows
    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(PipelineError::NotLoaded { stage: "execute" });
        };

        let outcome = self
            .runtime
            .block_on(sqlx::raw_sql(sql).execute(&mut *connection))
            .map_err(|source| PipelineError::Query {
                query: sql.to_string(),
                source,
            })?;

        Ok(outcome.rows_affected())
    }
}

impl DatabaseHandle for SqliteHandle {
    fn query(&mut self, sql: &str) -> Result<DataFrame> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(PipelineError::NotLoaded { stage: "query" });
        };

        let rows = self
            .runtime
            .block_on(sqlx::query(sql).fetch_all(&mut *connection))
            .map_err(|source| PipelineError::Query {
                query: sql.to_string(),
                source,
            })?;

        if rows.is_empty() {
            return Err(PipelineError::EmptyResult {
                query: sql.to_string(),
            });
        }

        let frame = rows_to_frame(&rows)?;
        info!("Query executed successfully: {} rows", frame.height());
        Ok(frame)
    }
}

impl Drop for SqliteHandle {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = self.runtime.block_on(connection.close()) {
                debug!("Error closing database connection: {}", e);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

fn decode_cell(row: &SqliteRow, index: usize) -> Cell {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Cell::Null, Cell::Int);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Cell::Null, Cell::Float);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(Cell::Null, Cell::Text);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return value.map_or(Cell::Null, |bytes| {
            Cell::Text(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Cell::Null
}

/// Build a polars column from decoded cells.
///
/// Text anywhere makes the column String; otherwise a float anywhere makes it
/// Float64; otherwise Int64.
fn cells_to_column(name: &str, cells: Vec<Cell>) -> Column {
    let has_text = cells.iter().any(|cell| matches!(cell, Cell::Text(_)));
    let has_float = cells.iter().any(|cell| matches!(cell, Cell::Float(_)));

    let series = if has_text {
        let values: Vec<Option<String>> = cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Null => None,
                Cell::Int(v) => Some(v.to_string()),
                Cell::Float(v) => Some(v.to_string()),
                Cell::Text(v) => Some(v),
            })
            .collect();
        Series::new(name.into(), values)
    } else if has_float {
        let values: Vec<Option<f64>> = cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Int(v) => Some(v as f64),
                Cell::Float(v) => Some(v),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    } else {
        let values: Vec<Option<i64>> = cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Int(v) => Some(v),
                _ => None,
            })
            .collect();
        Series::new(name.into(), values)
    };

    series.into()
}

fn rows_to_frame(rows: &[SqliteRow]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Ok(DataFrame::empty());
    };

    let columns = first
        .columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let cells = rows.iter().map(|row| decode_cell(row, index)).collect();
            cells_to_column(column.name(), cells)
        })
        .collect::<Vec<_>>();

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture_db(dir: &TempDir) -> String {
        let url = format!("sqlite:///{}?mode=rwc", dir.path().join("fixture.db").display());
        let mut handle = SqliteDatabase::new().connect(&url).unwrap();
        handle
            .execute(
                "CREATE TABLE readings (id INTEGER, depth REAL, label TEXT, mixed NUMERIC);
                 INSERT INTO readings VALUES (1, 1.5, 'a', 3);
                 INSERT INTO readings VALUES (2, NULL, NULL, 4.5);",
            )
            .unwrap();
        url
    }

    #[test]
    fn test_query_builds_typed_frame() {
        let dir = TempDir::new().unwrap();
        let url = fixture_db(&dir);

        let mut handle = SqliteDatabase::new().open(&url).unwrap();
        let df = handle.query("SELECT * FROM readings ORDER BY id").unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("depth").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("label").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("mixed").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("depth").unwrap().null_count(), 1);
    }

    #[test]
    fn test_empty_result_is_error() {
        let dir = TempDir::new().unwrap();
        let url = fixture_db(&dir);

        let mut handle = SqliteDatabase::new().open(&url).unwrap();
        let err = handle
            .query("SELECT * FROM readings WHERE id > 100")
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult { .. }));
    }

    #[test]
    fn test_bad_query_is_query_error() {
        let dir = TempDir::new().unwrap();
        let url = fixture_db(&dir);

        let mut handle = SqliteDatabase::new().open(&url).unwrap();
        let err = handle.query("SELECT * FROM missing_table").unwrap_err();
        assert!(matches!(err, PipelineError::Query { .. }));
    }

    #[test]
    fn test_missing_database_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:///{}", dir.path().join("absent.db").display());

        let err = SqliteDatabase::new().open(&url).err().expect("expected open to fail");
        assert!(matches!(err, PipelineError::Connection { .. }));
    }

    #[test]
    fn test_sqlalchemy_urls_rewritten() {
        assert_eq!(normalize_sqlite_url("sqlite:///farm.db"), "sqlite://farm.db");
        assert_eq!(
            normalize_sqlite_url("sqlite:////srv/data/farm.db?mode=ro"),
            "sqlite:///srv/data/farm.db?mode=ro"
        );
        assert_eq!(normalize_sqlite_url("sqlite://farm.db"), "sqlite://farm.db");
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn test_open_relative_database_with_triple_slash() {
        let file = tempfile::Builder::new()
            .prefix("relative_fixture")
            .suffix(".db")
            .tempfile_in(".")
            .unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
        let url = format!("sqlite:///{}", name);

        let mut handle = SqliteDatabase::new().connect(&url).unwrap();
        handle
            .execute("CREATE TABLE fields (Field_ID INTEGER); INSERT INTO fields VALUES (7);")
            .unwrap();
        drop(handle);

        let mut handle = SqliteDatabase::new().open(&url).unwrap();
        let df = handle.query("SELECT Field_ID FROM fields").unwrap();
        assert_eq!(df.height(), 1);
    }
}
