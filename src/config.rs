//! Configuration management and validation.
//!
//! Each processor takes a typed configuration struct that is validated
//! eagerly, so a missing key or a malformed pattern fails at construction
//! rather than halfway through a pipeline run. [`PipelineConfig`] loads
//! both sections from a TOML file.

use crate::error::{PipelineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CROP_COLUMN: &str = "Crop_type";
pub const DEFAULT_ELEVATION_COLUMN: &str = "Elevation";
pub const DEFAULT_JOIN_KEY: &str = "Field_ID";
/// Leftover pandas-style index column written alongside exported CSVs
pub const DEFAULT_INDEX_COLUMN: &str = "Unnamed: 0";
pub const DEFAULT_STATION_COLUMN: &str = "Weather_station_ID";
pub const DEFAULT_MESSAGE_COLUMN: &str = "Message";

/// Log verbosity for a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    /// Suppress all output
    None,
}

impl LogLevel {
    /// Parse a level name case-insensitively; unknown names fall back to `Info`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "NONE" => LogLevel::None,
            _ => LogLevel::Info,
        }
    }

    /// Filter directive for the `tracing` subscriber
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::None => "off",
        }
    }
}

impl From<String> for LogLevel {
    fn from(name: String) -> Self {
        LogLevel::from_name(&name)
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::None => "NONE",
        };
        f.write_str(name)
    }
}

/// Two existing columns whose contents are exchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSwap {
    pub left: String,
    pub right: String,
}

impl ColumnSwap {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Build from a `{left: right}` mapping; exactly one pair is accepted
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        match pairs.as_slice() {
            [(left, right)] => Ok(Self::new(left.clone(), right.clone())),
            [] => Err(PipelineError::config(
                "columns_to_rename must contain exactly one pair, found none",
            )),
            many => Err(PipelineError::config(format!(
                "columns_to_rename must contain exactly one pair, found {}",
                many.len()
            ))),
        }
    }
}

/// Configuration for the field-data pipeline
#[derive(Debug, Clone)]
pub struct FieldConfig {
    /// Database connection string
    pub db_path: String,
    pub sql_query: String,
    pub column_swap: ColumnSwap,
    /// Raw crop label -> canonical label
    pub values_to_rename: HashMap<String, String>,
    /// Location of the field -> weather station mapping CSV
    pub weather_mapping_csv: String,
    pub crop_column: String,
    pub elevation_column: String,
    pub join_key: String,
    pub index_column: String,
}

impl FieldConfig {
    pub fn new(
        db_path: impl Into<String>,
        sql_query: impl Into<String>,
        column_swap: ColumnSwap,
        values_to_rename: HashMap<String, String>,
        weather_mapping_csv: impl Into<String>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            sql_query: sql_query.into(),
            column_swap,
            values_to_rename,
            weather_mapping_csv: weather_mapping_csv.into(),
            crop_column: DEFAULT_CROP_COLUMN.to_string(),
            elevation_column: DEFAULT_ELEVATION_COLUMN.to_string(),
            join_key: DEFAULT_JOIN_KEY.to_string(),
            index_column: DEFAULT_INDEX_COLUMN.to_string(),
        }
    }

    pub fn with_crop_column(mut self, column: impl Into<String>) -> Self {
        self.crop_column = column.into();
        self
    }

    pub fn with_elevation_column(mut self, column: impl Into<String>) -> Self {
        self.elevation_column = column.into();
        self
    }

    pub fn with_join_key(mut self, column: impl Into<String>) -> Self {
        self.join_key = column.into();
        self
    }

    pub fn with_index_column(mut self, column: impl Into<String>) -> Self {
        self.index_column = column.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("field.db_path", &self.db_path)?;
        require_non_empty("field.sql_query", &self.sql_query)?;
        require_non_empty("field.weather_mapping_csv", &self.weather_mapping_csv)?;
        require_non_empty("field.columns_to_rename (key)", &self.column_swap.left)?;
        require_non_empty("field.columns_to_rename (value)", &self.column_swap.right)?;
        require_non_empty("field.crop_column", &self.crop_column)?;
        require_non_empty("field.elevation_column", &self.elevation_column)?;
        require_non_empty("field.join_key", &self.join_key)?;
        Ok(())
    }
}

/// One named measurement pattern; the first capture group holding text is the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPattern {
    pub name: String,
    pub pattern: String,
}

impl MeasurementPattern {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Configuration for the weather-data pipeline
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub weather_csv_path: String,
    /// Tried in order; the first match wins
    pub patterns: Vec<MeasurementPattern>,
    pub station_column: String,
    pub message_column: String,
}

impl WeatherConfig {
    pub fn new(weather_csv_path: impl Into<String>, patterns: Vec<MeasurementPattern>) -> Self {
        Self {
            weather_csv_path: weather_csv_path.into(),
            patterns,
            station_column: DEFAULT_STATION_COLUMN.to_string(),
            message_column: DEFAULT_MESSAGE_COLUMN.to_string(),
        }
    }

    pub fn with_station_column(mut self, column: impl Into<String>) -> Self {
        self.station_column = column.into();
        self
    }

    pub fn with_message_column(mut self, column: impl Into<String>) -> Self {
        self.message_column = column.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("weather.weather_csv_path", &self.weather_csv_path)?;
        require_non_empty("weather.station_column", &self.station_column)?;
        require_non_empty("weather.message_column", &self.message_column)?;

        if self.patterns.is_empty() {
            return Err(PipelineError::config(
                "weather.regex_patterns must define at least one pattern",
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.patterns {
            require_non_empty("weather.regex_patterns.name", &entry.name)?;
            if !seen.insert(entry.name.as_str()) {
                return Err(PipelineError::config(format!(
                    "duplicate measurement pattern name '{}'",
                    entry.name
                )));
            }

            let regex = Regex::new(&entry.pattern).map_err(|e| {
                PipelineError::config(format!("invalid pattern for '{}': {}", entry.name, e))
            })?;
            // captures_len includes the implicit whole-match group
            if regex.captures_len() < 2 {
                return Err(PipelineError::config(format!(
                    "pattern for '{}' has no capturing group",
                    entry.name
                )));
            }
        }

        Ok(())
    }
}

fn require_non_empty(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PipelineError::config(format!(
            "required key `{}` is empty",
            key
        )));
    }
    Ok(())
}

fn require<T>(key: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| PipelineError::config(format!("missing required key `{}`", key)))
}

/// Complete configuration file
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub log_level: LogLevel,
    pub field: Option<FieldConfig>,
    pub weather: Option<WeatherConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPipelineConfig {
    log_level: Option<LogLevel>,
    field: Option<RawFieldConfig>,
    weather: Option<RawWeatherConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFieldConfig {
    db_path: Option<String>,
    sql_query: Option<String>,
    columns_to_rename: Option<BTreeMap<String, String>>,
    values_to_rename: Option<HashMap<String, String>>,
    weather_mapping_csv: Option<String>,
    crop_column: Option<String>,
    elevation_column: Option<String>,
    join_key: Option<String>,
    index_column: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWeatherConfig {
    weather_csv_path: Option<String>,
    regex_patterns: Option<Vec<MeasurementPattern>>,
    station_column: Option<String>,
    message_column: Option<String>,
}

impl TryFrom<RawFieldConfig> for FieldConfig {
    type Error = PipelineError;

    fn try_from(raw: RawFieldConfig) -> Result<Self> {
        let column_swap =
            ColumnSwap::from_pairs(require("field.columns_to_rename", raw.columns_to_rename)?)?;

        let mut config = FieldConfig::new(
            require("field.db_path", raw.db_path)?,
            require("field.sql_query", raw.sql_query)?,
            column_swap,
            raw.values_to_rename.unwrap_or_default(),
            require("field.weather_mapping_csv", raw.weather_mapping_csv)?,
        );

        if let Some(column) = raw.crop_column {
            config = config.with_crop_column(column);
        }
        if let Some(column) = raw.elevation_column {
            config = config.with_elevation_column(column);
        }
        if let Some(column) = raw.join_key {
            config = config.with_join_key(column);
        }
        if let Some(column) = raw.index_column {
            config = config.with_index_column(column);
        }

        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<RawWeatherConfig> for WeatherConfig {
    type Error = PipelineError;

    fn try_from(raw: RawWeatherConfig) -> Result<Self> {
        let mut config = WeatherConfig::new(
            require("weather.weather_csv_path", raw.weather_csv_path)?,
            require("weather.regex_patterns", raw.regex_patterns)?,
        );

        if let Some(column) = raw.station_column {
            config = config.with_station_column(column);
        }
        if let Some(column) = raw.message_column {
            config = config.with_message_column(column);
        }

        config.validate()?;
        Ok(config)
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawPipelineConfig = toml::from_str(contents)
            .map_err(|e| PipelineError::config(format!("invalid TOML: {}", e)))?;

        let config = Self {
            log_level: raw.log_level.unwrap_or_default(),
            field: raw.field.map(FieldConfig::try_from).transpose()?,
            weather: raw.weather.map(WeatherConfig::try_from).transpose()?,
        };

        if config.field.is_none() && config.weather.is_none() {
            return Err(PipelineError::config(
                "configuration defines neither a [field] nor a [weather] section",
            ));
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Default location: `<config dir>/agri-pipeline/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| PipelineError::config("could not determine user config directory"))?;
        Ok(config_dir.join("agri-pipeline").join("config.toml"))
    }
}
