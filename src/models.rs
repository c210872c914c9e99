//! Processing statistics reported by the pipelines.

use std::fmt;

/// Counters collected while running the field-data pipeline
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldStats {
    pub rows_ingested: usize,
    pub rows_output: usize,
    /// Field rows with no weather station mapping
    pub unmatched_fields: usize,
    pub crop_values_corrected: usize,
    /// Elevation values that were negative before correction
    pub elevations_corrected: usize,
}

/// Counters collected while running the weather-data pipeline
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WeatherStats {
    pub rows_loaded: usize,
    pub messages_matched: usize,
    pub messages_unmatched: usize,
    pub stations: usize,
    pub measurement_types: usize,
}

impl WeatherStats {
    /// Share of messages that matched a pattern, in percent
    pub fn match_rate(&self) -> f64 {
        let total = self.messages_matched + self.messages_unmatched;
        if total == 0 {
            0.0
        } else {
            self.messages_matched as f64 / total as f64 * 100.0
        }
    }
}

impl fmt::Display for FieldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows ingested, {} rows output, {} without station mapping, {} crop labels corrected, {} elevations made positive",
            self.rows_ingested,
            self.rows_output,
            self.unmatched_fields,
            self.crop_values_corrected,
            self.elevations_corrected
        )
    }
}

impl fmt::Display for WeatherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows loaded, {} messages matched ({:.1}%), {} unmatched, {} stations, {} measurement types",
            self.rows_loaded,
            self.messages_matched,
            self.match_rate(),
            self.messages_unmatched,
            self.stations,
            self.measurement_types
        )
    }
}
