//! Weather station pipeline: fetch messages, extract measurements, average.

use super::require_column;
use crate::config::WeatherConfig;
use crate::error::{PipelineError, Result};
use crate::ingestion::{CsvSource, RemoteCsvSource};
use crate::logging::Logger;
use crate::measurement::{Measurement, MeasurementPatternSet};
use crate::models::WeatherStats;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fmt;

/// Derived column holding the measurement name
pub const MEASUREMENT_COLUMN: &str = "Measurement";
/// Derived column holding the measurement value
pub const VALUE_COLUMN: &str = "Value";

/// Mean of `value` per (`station`, `measurement`), pivoted wide.
///
/// One row per non-null station in `frame`, sorted by station, followed by
/// one column per measurement name (sorted). A station with no readings of a
/// given measurement holds null in that column.
pub fn mean_by_station(
    frame: &DataFrame,
    station: &str,
    measurement: &str,
    value: &str,
) -> Result<DataFrame> {
    for column in [station, measurement, value] {
        require_column(frame, column, "mean calculation")?;
    }

    let means = frame
        .clone()
        .lazy()
        .filter(
            col(station)
                .is_not_null()
                .and(col(measurement).is_not_null()),
        )
        .group_by([col(station), col(measurement)])
        .agg([col(value).mean()])
        .collect()?;

    let names: BTreeSet<String> = means
        .column(measurement)?
        .as_materialized_series()
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();

    let mut wide = frame
        .clone()
        .lazy()
        .filter(col(station).is_not_null())
        .select([col(station)])
        .unique(None, UniqueKeepStrategy::First);

    for name in &names {
        let per_station = means
            .clone()
            .lazy()
            .filter(col(measurement).eq(lit(name.as_str())))
            .select([col(station), col(value).alias(name.as_str())]);

        wide = wide.join(
            per_station,
            [col(station)],
            [col(station)],
            JoinArgs::new(JoinType::Left),
        );
    }

    Ok(wide
        .sort([station], SortMultipleOptions::default())
        .collect()?)
}

/// Orchestrates fetch -> message extraction -> per-station means
pub struct WeatherDataProcessor {
    config: WeatherConfig,
    patterns: MeasurementPatternSet,
    logger: Logger,
    csv_source: Box<dyn CsvSource>,
    weather_df: Option<DataFrame>,
    stats: WeatherStats,
}

impl fmt::Debug for WeatherDataProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherDataProcessor")
            .field("config", &self.config)
            .field("logger", &self.logger)
            .field("loaded", &self.weather_df.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl WeatherDataProcessor {
    /// Create a processor that fetches over HTTP or from disk.
    ///
    /// Validates the configuration and compiles every pattern up front.
    pub fn new(config: WeatherConfig, logger: Logger) -> Result<Self> {
        config.validate()?;
        let patterns = MeasurementPatternSet::compile(&config.patterns)?;

        Ok(Self {
            config,
            patterns,
            logger: logger.for_component("WeatherDataProcessor"),
            csv_source: Box::new(RemoteCsvSource::new()),
            weather_df: None,
            stats: WeatherStats::default(),
        })
    }

    /// Replace the CSV collaborator
    pub fn with_csv_source(mut self, source: impl CsvSource + 'static) -> Self {
        self.csv_source = Box::new(source);
        self
    }

    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    pub fn frame(&self) -> Option<&DataFrame> {
        self.weather_df.as_ref()
    }

    pub fn stats(&self) -> &WeatherStats {
        &self.stats
    }

    /// Run every stage in order and return the per-station means
    pub fn process(&mut self) -> Result<DataFrame> {
        self.weather_station_mapping()?;
        self.process_messages()?;
        let means = self
            .calculate_means()?
            .ok_or(PipelineError::NotLoaded {
                stage: "calculate_means",
            })?;

        self.logger.info("Data processing completed.");
        Ok(means)
    }

    /// Load the weather station readings; failure is fatal
    pub fn weather_station_mapping(&mut self) -> Result<&DataFrame> {
        let frame = self
            .csv_source
            .fetch(&self.config.weather_csv_path)
            .inspect_err(|e| {
                self.logger
                    .error(format!("Failed to load weather station data: {}", e))
            })?;

        self.logger
            .info("Successfully loaded weather station data from the web.");
        self.stats.rows_loaded = frame.height();
        Ok(&*self.weather_df.insert(frame))
    }

    /// Classify one message; `Ok(None)` when no pattern matches
    pub fn extract_measurement(&self, message: &str) -> Result<Option<Measurement>> {
        let found = self.patterns.extract(message).inspect_err(|e| {
            self.logger
                .error(format!("Failed to extract measurement: {}", e))
        })?;

        match &found {
            Some(measurement) => self
                .logger
                .debug(format!("Measurement extracted: {}", measurement.name)),
            None => self.logger.debug("No measurement match found."),
        }

        Ok(found)
    }

    /// Add `Measurement` and `Value` columns derived from every message.
    ///
    /// Returns `Ok(None)` without touching anything if no data is loaded.
    pub fn process_messages(&mut self) -> Result<Option<&DataFrame>> {
        let Some(frame) = self.weather_df.as_ref() else {
            self.logger
                .warn("weather_df is not initialized, skipping message processing.");
            return Ok(None);
        };

        let message_column = &self.config.message_column;
        if let Err(e) = require_column(frame, message_column, "message processing") {
            self.logger.error(format!("Cannot process messages: {}", e));
            return Err(e);
        }

        let messages = frame
            .column(message_column)?
            .as_materialized_series()
            .cast(&DataType::String)?;

        let mut names: Vec<Option<String>> = Vec::with_capacity(frame.height());
        let mut values: Vec<Option<f64>> = Vec::with_capacity(frame.height());

        for message in messages.str()?.into_iter() {
            let found = match message {
                Some(text) => self.extract_measurement(text)?,
                None => None,
            };
            match found {
                Some(measurement) => {
                    names.push(Some(measurement.name));
                    values.push(Some(measurement.value));
                }
                None => {
                    names.push(None);
                    values.push(None);
                }
            }
        }

        let matched = names.iter().filter(|name| name.is_some()).count();
        let mut updated = frame.clone();
        updated.with_column(Series::new(MEASUREMENT_COLUMN.into(), names))?;
        updated.with_column(Series::new(VALUE_COLUMN.into(), values))?;

        self.stats.messages_matched = matched;
        self.stats.messages_unmatched = updated.height() - matched;
        self.logger
            .info("Messages processed and measurements extracted.");

        Ok(Some(&*self.weather_df.insert(updated)))
    }

    /// Mean value per station and measurement, one column per measurement.
    ///
    /// Returns `Ok(None)` if no data is loaded.
    pub fn calculate_means(&mut self) -> Result<Option<DataFrame>> {
        let Some(frame) = self.weather_df.as_ref() else {
            self.logger
                .warn("weather_df is not initialized, cannot calculate means.");
            return Ok(None);
        };

        let means = mean_by_station(
            frame,
            &self.config.station_column,
            MEASUREMENT_COLUMN,
            VALUE_COLUMN,
        )
        .inspect_err(|e| self.logger.error(format!("Cannot calculate means: {}", e)))?;

        self.stats.stations = means.height();
        self.stats.measurement_types = means.width().saturating_sub(1);
        self.logger.info("Mean values calculated.");

        Ok(Some(means))
    }
}
