//! Command-line interface components.

use crate::config::{LogLevel, PipelineConfig};
use crate::logging::{Logger, init_tracing};
use crate::models::{FieldStats, WeatherStats};
use crate::processor::{FieldDataProcessor, WeatherDataProcessor};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::DataFrame;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "agri-pipeline",
    version,
    about = "Merge field-survey records with weather-station readings"
)]
pub struct Args {
    /// Pipeline configuration file (TOML)
    ///
    /// Defaults to `<config dir>/agri-pipeline/config.toml`.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Processor log level, overriding the configuration file
    #[arg(long, value_name = "LEVEL", value_parser = ["debug", "info", "none"])]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Pipeline>,
}

/// Which pipelines to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Pipeline {
    /// Ingest field records, correct them and attach weather stations
    Field,
    /// Extract measurements from station messages and average them
    Weather,
    /// Run both pipelines (default)
    All,
}

impl Pipeline {
    fn runs_field(self) -> bool {
        matches!(self, Pipeline::Field | Pipeline::All)
    }

    fn runs_weather(self) -> bool {
        matches!(self, Pipeline::Weather | Pipeline::All)
    }
}

impl Args {
    pub fn pipeline(&self) -> Pipeline {
        self.command.unwrap_or(Pipeline::All)
    }

    /// Explicit path, or the per-user default
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(PipelineConfig::default_config_path()?),
        }
    }

    /// Effective processor log level: `--log-level`, then `-v`/`-q`, then
    /// whatever the configuration file says
    pub fn log_level(&self, configured: LogLevel) -> LogLevel {
        if let Some(name) = &self.log_level {
            LogLevel::from_name(name)
        } else if self.verbose {
            LogLevel::Debug
        } else if self.quiet {
            LogLevel::None
        } else {
            configured
        }
    }
}

/// Load the configuration and run the selected pipelines
pub fn run(args: Args) -> Result<()> {
    let path = args.config_path()?;
    let config = PipelineConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let level = args.log_level(config.log_level);
    let filter = if args.quiet { "error" } else { level.as_filter() };
    init_tracing(filter, args.quiet);
    info!("Using configuration {}", path.display());

    let logger = Logger::tracing(level);
    let pipeline = args.pipeline();

    if pipeline.runs_field() {
        match config.field {
            Some(field) => {
                let mut processor = FieldDataProcessor::new(field, logger.clone())?;
                let frame = processor.process().context("Field pipeline failed")?;
                report_field(&frame, processor.stats(), args.quiet);
            }
            None if pipeline == Pipeline::Field => {
                anyhow::bail!("{} has no [field] section", path.display())
            }
            None => info!("No [field] section configured, skipping field pipeline"),
        }
    }

    if pipeline.runs_weather() {
        match config.weather {
            Some(weather) => {
                let mut processor = WeatherDataProcessor::new(weather, logger.clone())?;
                let means = processor.process().context("Weather pipeline failed")?;
                report_weather(&means, processor.stats(), args.quiet);
            }
            None if pipeline == Pipeline::Weather => {
                anyhow::bail!("{} has no [weather] section", path.display())
            }
            None => info!("No [weather] section configured, skipping weather pipeline"),
        }
    }

    Ok(())
}

fn report_field(frame: &DataFrame, stats: &FieldStats, quiet: bool) {
    if quiet {
        println!("{}", frame);
        return;
    }

    println!("\n{}", "Field data".bold().green());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", frame);
    println!("{}", stats);
    if stats.unmatched_fields > 0 {
        println!(
            "{}",
            format!(
                "⚠️  {} fields have no weather station mapping",
                stats.unmatched_fields
            )
            .yellow()
        );
    }
}

fn report_weather(means: &DataFrame, stats: &WeatherStats, quiet: bool) {
    if quiet {
        println!("{}", means);
        return;
    }

    println!("\n{}", "Weather station means".bold().green());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", means);
    println!("{}", stats);
}
