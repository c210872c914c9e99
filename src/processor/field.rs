//! Field survey pipeline: ingest, swap columns, correct values, join stations.

use super::require_column;
use crate::config::{ColumnSwap, FieldConfig};
use crate::error::{PipelineError, Result};
use crate::ingestion::{CsvSource, Database, RemoteCsvSource, SqliteDatabase};
use crate::logging::Logger;
use crate::models::FieldStats;
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;

const SWAP_SCRATCH_NAME: &str = "__temp_name_for_swap__";
const ROW_ORDER_COLUMN: &str = "__row_order__";
const MATCH_MARKER_COLUMN: &str = "__station_matched__";

/// Result of [`correct_values`]
#[derive(Debug, Clone)]
pub struct Corrected {
    pub frame: DataFrame,
    pub crop_values_corrected: usize,
    pub elevations_corrected: usize,
}

/// Result of [`left_join_preserving_order`]
#[derive(Debug, Clone)]
pub struct Joined {
    pub frame: DataFrame,
    /// Left rows that found no partner on the right
    pub unmatched: usize,
}

/// Column name guaranteed absent from `frame`
pub fn scratch_column_name(frame: &DataFrame) -> String {
    let mut name = SWAP_SCRATCH_NAME.to_string();
    while frame.get_column_index(&name).is_some() {
        name.push('_');
    }
    name
}

/// Exchange the contents of two columns.
///
/// Afterwards the column labelled `swap.left` holds what `swap.right` held and
/// vice versa. Applying the same swap twice restores the original table.
pub fn swap_columns(frame: &DataFrame, swap: &ColumnSwap) -> Result<DataFrame> {
    require_column(frame, &swap.left, "column swap")?;
    require_column(frame, &swap.right, "column swap")?;

    let mut swapped = frame.clone();
    if swap.left == swap.right {
        return Ok(swapped);
    }

    let scratch = scratch_column_name(frame);
    swapped.rename(&swap.left, scratch.as_str().into())?;
    swapped.rename(&swap.right, swap.left.as_str().into())?;
    swapped.rename(&scratch, swap.right.as_str().into())?;

    Ok(swapped)
}

/// Take the absolute value of the elevation column and map crop labels
/// through `corrections`; labels without an entry are left as they are.
pub fn correct_values(
    frame: &DataFrame,
    crop_column: &str,
    elevation_column: &str,
    corrections: &HashMap<String, String>,
) -> Result<Corrected> {
    require_column(frame, crop_column, "value corrections")?;
    require_column(frame, elevation_column, "value corrections")?;

    let elevations_corrected = frame
        .column(elevation_column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .flatten()
        .filter(|value| *value < 0.0)
        .count();

    let mut corrected = frame
        .clone()
        .lazy()
        .with_column(col(elevation_column).abs())
        .collect()?;

    let crops = frame
        .column(crop_column)?
        .as_materialized_series()
        .cast(&DataType::String)?;

    let mut crop_values_corrected = 0;
    let mapped: StringChunked = crops
        .str()?
        .into_iter()
        .map(|value| {
            value.map(|crop| match corrections.get(crop) {
                Some(canonical) => {
                    if canonical != crop {
                        crop_values_corrected += 1;
                    }
                    canonical.as_str()
                }
                None => crop,
            })
        })
        .collect();

    corrected.with_column(mapped.with_name(crop_column.into()).into_series())?;

    Ok(Corrected {
        frame: corrected,
        crop_values_corrected,
        elevations_corrected,
    })
}

/// Left-join `right` onto `left` on `key`, keeping every left row in its
/// original order.
///
/// The right key is cast to the left key's dtype first. Non-key columns
/// present on both sides get a `_right` suffix on the right-hand copy.
pub fn left_join_preserving_order(
    left: &DataFrame,
    right: &DataFrame,
    key: &str,
) -> Result<Joined> {
    require_column(left, key, "weather station mapping (field table)")?;
    require_column(right, key, "weather station mapping (mapping table)")?;

    let key_dtype = left.column(key)?.dtype().clone();
    let right = right
        .clone()
        .lazy()
        .with_columns([
            col(key).cast(key_dtype),
            lit(true).alias(MATCH_MARKER_COLUMN),
        ]);

    let joined = left
        .clone()
        .lazy()
        .with_row_index(ROW_ORDER_COLUMN, None)
        .join(
            right,
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([ROW_ORDER_COLUMN], SortMultipleOptions::default())
        .collect()?;

    let unmatched = joined.column(MATCH_MARKER_COLUMN)?.null_count();
    let frame = joined.drop(ROW_ORDER_COLUMN)?.drop(MATCH_MARKER_COLUMN)?;

    Ok(Joined { frame, unmatched })
}

/// Orchestrates ingest -> column swap -> corrections -> station mapping
pub struct FieldDataProcessor {
    config: FieldConfig,
    logger: Logger,
    database: Box<dyn Database>,
    csv_source: Box<dyn CsvSource>,
    df: Option<DataFrame>,
    stats: FieldStats,
}

impl fmt::Debug for FieldDataProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDataProcessor")
            .field("config", &self.config)
            .field("logger", &self.logger)
            .field("loaded", &self.df.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl FieldDataProcessor {
    /// Create a processor backed by SQLite and HTTP/file CSV ingestion.
    ///
    /// The configuration is validated here so a bad key fails before any I/O.
    pub fn new(config: FieldConfig, logger: Logger) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            logger: logger.for_component("FieldDataProcessor"),
            database: Box::new(SqliteDatabase::new()),
            csv_source: Box::new(RemoteCsvSource::new()),
            df: None,
            stats: FieldStats::default(),
        })
    }

    /// Replace the database collaborator
    pub fn with_database(mut self, database: impl Database + 'static) -> Self {
        self.database = Box::new(database);
        self
    }

    /// Replace the CSV collaborator used for the station mapping
    pub fn with_csv_source(mut self, source: impl CsvSource + 'static) -> Self {
        self.csv_source = Box::new(source);
        self
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Current table of record, if ingestion has run
    pub fn frame(&self) -> Option<&DataFrame> {
        self.df.as_ref()
    }

    pub fn stats(&self) -> &FieldStats {
        &self.stats
    }

    /// Run every stage in order and return the final table
    pub fn process(&mut self) -> Result<DataFrame> {
        self.ingest_sql_data()?;
        self.rename_columns()?;
        self.apply_corrections()?;
        self.weather_station_mapping()?;
        self.drop_index_column()?;

        let frame = self.loaded("process")?.clone();
        self.stats.rows_output = frame.height();
        self.logger.info(format!(
            "Field data processing completed: {} rows, {} columns",
            frame.height(),
            frame.width()
        ));

        Ok(frame)
    }

    /// Open the database, run the configured query and keep the result.
    ///
    /// The connection is released before this returns.
    pub fn ingest_sql_data(&mut self) -> Result<&DataFrame> {
        self.logger
            .info("Initializing data ingestion from SQLite database.");

        let frame = self.logged("Error during data ingestion", self.query_database())?;

        self.logger
            .info("Data successfully loaded from SQLite database.");
        self.stats.rows_ingested = frame.height();
        Ok(&*self.df.insert(frame))
    }

    fn query_database(&self) -> Result<DataFrame> {
        let mut handle = self.database.open(&self.config.db_path)?;
        let frame = handle.query(&self.config.sql_query)?;
        drop(handle);
        Ok(frame)
    }

    /// Swap the two configured columns
    pub fn rename_columns(&mut self) -> Result<()> {
        let swap = &self.config.column_swap;
        let frame = self.logged("Cannot swap columns", self.loaded("rename_columns"))?;
        let swapped = self.logged("Cannot swap columns", swap_columns(frame, swap))?;

        self.logger
            .info(format!("Swapped columns: {} with {}", swap.left, swap.right));
        self.df = Some(swapped);
        Ok(())
    }

    /// Make elevations non-negative and normalise crop labels
    pub fn apply_corrections(&mut self) -> Result<()> {
        let frame = self.logged("Cannot apply corrections", self.loaded("apply_corrections"))?;
        let corrected = self.logged(
            "Cannot apply corrections",
            correct_values(
                frame,
                &self.config.crop_column,
                &self.config.elevation_column,
                &self.config.values_to_rename,
            ),
        )?;

        self.logger.debug(format!(
            "Corrected {} crop labels and {} negative elevations",
            corrected.crop_values_corrected, corrected.elevations_corrected
        ));
        self.stats.crop_values_corrected = corrected.crop_values_corrected;
        self.stats.elevations_corrected = corrected.elevations_corrected;
        self.df = Some(corrected.frame);
        Ok(())
    }

    /// Fetch the field -> station mapping and left-join it onto the table.
    ///
    /// The merged table becomes the table of record.
    pub fn weather_station_mapping(&mut self) -> Result<&DataFrame> {
        let frame = self.logged(
            "Cannot map weather stations",
            self.loaded("weather_station_mapping"),
        )?;
        let mapping = self.logged(
            "Failed to read weather station mapping",
            self.csv_source.fetch(&self.config.weather_mapping_csv),
        )?;
        let joined = self.logged(
            "Failed to merge weather station mapping",
            left_join_preserving_order(frame, &mapping, &self.config.join_key),
        )?;

        if joined.unmatched > 0 {
            self.logger.debug(format!(
                "{} field rows have no weather station mapping",
                joined.unmatched
            ));
        }
        self.logger
            .info("Weather station mapping merged into field data.");
        self.stats.unmatched_fields = joined.unmatched;
        Ok(&*self.df.insert(joined.frame))
    }

    /// Drop the leftover index column, if the table has one
    pub fn drop_index_column(&mut self) -> Result<()> {
        let frame = self.logged("Cannot drop index column", self.loaded("drop_index_column"))?;
        let column = &self.config.index_column;

        if frame.get_column_index(column).is_none() {
            self.logger
                .debug(format!("No '{}' column to drop", column));
            return Ok(());
        }

        let trimmed = frame.drop(column)?;
        self.logger.debug(format!("Dropped column '{}'", column));
        self.df = Some(trimmed);
        Ok(())
    }

    fn loaded(&self, stage: &'static str) -> Result<&DataFrame> {
        self.df.as_ref().ok_or(PipelineError::NotLoaded { stage })
    }

    fn logged<T>(&self, context: &str, result: Result<T>) -> Result<T> {
        result.inspect_err(|e| self.logger.error(format!("{}: {}", context, e)))
    }
}
