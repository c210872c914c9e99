//! Measurement extraction from free-text weather station messages.

use crate::config::MeasurementPattern;
use crate::error::{PipelineError, Result};
use regex::Regex;

/// A measurement recognised in a message
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub value: f64,
}

/// Ordered, compiled set of measurement patterns
#[derive(Debug, Clone)]
pub struct MeasurementPatternSet {
    patterns: Vec<(String, Regex)>,
}

impl MeasurementPatternSet {
    /// Compile every pattern, keeping configuration order
    pub fn compile(patterns: &[MeasurementPattern]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|entry| {
                Regex::new(&entry.pattern)
                    .map(|regex| (entry.name.clone(), regex))
                    .map_err(|e| {
                        PipelineError::config(format!(
                            "invalid pattern for '{}': {}",
                            entry.name, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns: compiled })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Measurement names in match priority order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(name, _)| name.as_str())
    }

    /// Classify a message and parse its value.
    ///
    /// Patterns are tried in order and the first one that matches anywhere in
    /// the message decides the measurement, even if a later pattern would be
    /// more specific. The value is the first capture group that participated
    /// in the match with non-empty text.
    pub fn extract(&self, message: &str) -> Result<Option<Measurement>> {
        for (name, regex) in &self.patterns {
            let Some(captures) = regex.captures(message) else {
                continue;
            };

            let raw = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|group| group.as_str())
                .find(|text| !text.is_empty())
                .ok_or_else(|| PipelineError::Value {
                    measurement: name.clone(),
                    raw: String::new(),
                })?;

            let value = raw.trim().parse::<f64>().map_err(|_| PipelineError::Value {
                measurement: name.clone(),
                raw: raw.to_string(),
            })?;

            return Ok(Some(Measurement {
                name: name.clone(),
                value,
            }));
        }

        Ok(None)
    }
}
