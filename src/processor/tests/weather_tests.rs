//! Weather pipeline tests

use super::*;
use crate::config::{MeasurementPattern, WeatherConfig};
use crate::processor::WeatherDataProcessor;
use crate::processor::weather::{MEASUREMENT_COLUMN, VALUE_COLUMN, mean_by_station};
use tracing::Level;

const WEATHER_URL: &str = "https://example.org/Weather_station_data.csv";

fn patterns() -> Vec<MeasurementPattern> {
    vec![
        MeasurementPattern::new("Temperature", r"T=(-?\d+(?:\.\d+)?)"),
        MeasurementPattern::new("Rainfall", r"X=(\d+(?:\.\d+)?)"),
    ]
}

fn weather_frame() -> DataFrame {
    df!(
        "Weather_station_ID" => [1i64, 1, 2, 2, 1, 3],
        "Message" => [
            Some("Temperature reading T=20"),
            Some("T=22 at noon"),
            Some("Rain gauge X=5"),
            Some("Hot day, T=30"),
            Some("status ok"),
            None,
        ],
    )
    .unwrap()
}

fn create_processor(frame: DataFrame) -> (WeatherDataProcessor, MemorySink) {
    let (logger, sink) = capturing_logger();
    let processor = WeatherDataProcessor::new(WeatherConfig::new(WEATHER_URL, patterns()), logger)
        .unwrap()
        .with_csv_source(StaticCsv::default().with_table(WEATHER_URL, frame));
    (processor, sink)
}

#[test]
fn test_extract_known_measurement() {
    let (processor, _sink) = create_processor(weather_frame());

    let measurement = processor
        .extract_measurement("Station report: T=5 degrees")
        .unwrap()
        .unwrap();

    assert_eq!(measurement.name, "Temperature");
    assert_eq!(measurement.value, 5.0);
}

#[test]
fn test_extract_unknown_message() {
    let (processor, sink) = create_processor(weather_frame());

    assert!(processor.extract_measurement("X9 nothing here").unwrap().is_none());
    assert!(
        sink.at_level(Level::DEBUG)
            .iter()
            .any(|record| record.message == "No measurement match found.")
    );
}

#[test]
fn test_first_matching_pattern_wins() {
    let config = WeatherConfig::new(
        WEATHER_URL,
        vec![
            MeasurementPattern::new("Primary", r"v=(\d+)"),
            MeasurementPattern::new("Secondary", r"v=(\d+)"),
        ],
    );
    let processor = WeatherDataProcessor::new(config, Logger::disabled()).unwrap();

    let measurement = processor.extract_measurement("v=7").unwrap().unwrap();
    assert_eq!(measurement.name, "Primary");
    assert_eq!(measurement.value, 7.0);
}

#[test]
fn test_process_messages_before_load_is_skipped() {
    let (mut processor, sink) = create_processor(weather_frame());

    assert!(processor.process_messages().unwrap().is_none());
    assert!(processor.frame().is_none());

    let warnings = sink.at_level(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("skipping message processing"));
}

#[test]
fn test_calculate_means_before_load_is_skipped() {
    let (mut processor, sink) = create_processor(weather_frame());

    assert!(processor.calculate_means().unwrap().is_none());
    assert_eq!(sink.at_level(Level::WARN).len(), 1);
}

#[test]
fn test_calculate_means_requires_extracted_measurements() {
    let (mut processor, sink) = create_processor(weather_frame());
    processor.weather_station_mapping().unwrap();

    let err = processor.calculate_means().unwrap_err();

    match err {
        PipelineError::ColumnNotFound { column, .. } => assert_eq!(column, MEASUREMENT_COLUMN),
        other => panic!("Expected ColumnNotFound, got {:?}", other),
    }
    assert_eq!(sink.at_level(Level::ERROR).len(), 1);
}

#[test]
fn test_process_messages_adds_measurement_columns() {
    let (mut processor, _sink) = create_processor(weather_frame());
    processor.weather_station_mapping().unwrap();

    let frame = processor.process_messages().unwrap().unwrap().clone();

    assert_eq!(frame.height(), 6);
    assert_eq!(frame.width(), 4);
    assert_eq!(
        strings(&frame, MEASUREMENT_COLUMN),
        vec![
            Some("Temperature".to_string()),
            Some("Temperature".to_string()),
            Some("Rainfall".to_string()),
            Some("Temperature".to_string()),
            None,
            None,
        ]
    );
    assert_eq!(
        floats(&frame, VALUE_COLUMN),
        vec![Some(20.0), Some(22.0), Some(5.0), Some(30.0), None, None]
    );

    let stats = processor.stats();
    assert_eq!(stats.rows_loaded, 6);
    assert_eq!(stats.messages_matched, 4);
    assert_eq!(stats.messages_unmatched, 2);
}

#[test]
fn test_process_messages_requires_message_column() {
    let frame = df!("Weather_station_ID" => [1i64]).unwrap();
    let (mut processor, sink) = create_processor(frame);
    processor.weather_station_mapping().unwrap();

    let err = processor.process_messages().unwrap_err();

    assert!(matches!(err, PipelineError::ColumnNotFound { .. }));
    assert_eq!(sink.at_level(Level::ERROR).len(), 1);
}

#[test]
fn test_unparseable_value_is_an_error() {
    let config = WeatherConfig::new(
        WEATHER_URL,
        vec![MeasurementPattern::new("Temperature", r"T=(\S+)")],
    );
    let frame = df!(
        "Weather_station_ID" => [1i64],
        "Message" => ["T=warm"],
    )
    .unwrap();
    let (logger, sink) = capturing_logger();
    let mut processor = WeatherDataProcessor::new(config, logger)
        .unwrap()
        .with_csv_source(StaticCsv::default().with_table(WEATHER_URL, frame));
    processor.weather_station_mapping().unwrap();

    let err = processor.process_messages().unwrap_err();

    match err {
        PipelineError::Value { measurement, raw } => {
            assert_eq!(measurement, "Temperature");
            assert_eq!(raw, "warm");
        }
        other => panic!("Expected Value error, got {:?}", other),
    }
    assert!(!sink.at_level(Level::ERROR).is_empty());
}

#[test]
fn test_means_pivot_one_row_per_station() {
    let frame = df!(
        "station" => [2i64, 1, 1, 2, 1],
        "kind" => [Some("Temperature"), Some("Temperature"), Some("Temperature"), Some("Rainfall"), None],
        "reading" => [Some(30.0f64), Some(20.0), Some(22.0), Some(5.0), None],
    )
    .unwrap();

    let means = mean_by_station(&frame, "station", "kind", "reading").unwrap();

    let names: Vec<&str> = means
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();
    assert_eq!(names, vec!["station", "Rainfall", "Temperature"]);
    assert_eq!(ints(&means, "station"), vec![Some(1), Some(2)]);
    assert_eq!(floats(&means, "Temperature"), vec![Some(21.0), Some(30.0)]);
    // Station 1 never reported rainfall: null, not zero
    assert_eq!(floats(&means, "Rainfall"), vec![None, Some(5.0)]);
}

#[test]
fn test_means_without_matches_lists_stations_only() {
    let frame = df!(
        "station" => [1i64, 2],
        "kind" => [None::<&str>, None],
        "reading" => [None::<f64>, None],
    )
    .unwrap();

    let means = mean_by_station(&frame, "station", "kind", "reading").unwrap();

    assert_eq!(means.width(), 1);
    assert_eq!(ints(&means, "station"), vec![Some(1), Some(2)]);
}

#[test]
fn test_fetch_failure_is_fatal() {
    let (logger, sink) = capturing_logger();
    let mut processor =
        WeatherDataProcessor::new(WeatherConfig::new(WEATHER_URL, patterns()), logger)
            .unwrap()
            .with_csv_source(StaticCsv::default());

    let err = processor.process().unwrap_err();

    assert!(matches!(err, PipelineError::Network { .. }));
    assert!(processor.frame().is_none());
    let errors = sink.at_level(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Failed to load weather station data"));
}

#[test]
fn test_process_full_pipeline() {
    let (mut processor, sink) = create_processor(weather_frame());

    let means = processor.process().unwrap();

    assert_eq!(means.height(), 3);
    assert_eq!(ints(&means, "Weather_station_ID"), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(
        floats(&means, "Temperature"),
        vec![Some(21.0), Some(30.0), None]
    );
    assert_eq!(floats(&means, "Rainfall"), vec![None, Some(5.0), None]);

    let stats = processor.stats();
    assert_eq!(stats.stations, 3);
    assert_eq!(stats.measurement_types, 2);
    assert!(
        sink.at_level(Level::INFO)
            .iter()
            .any(|record| record.message == "Data processing completed.")
    );
}

#[test]
fn test_invalid_pattern_rejected_at_construction() {
    let config = WeatherConfig::new(WEATHER_URL, vec![MeasurementPattern::new("Broken", "T=(")]);
    let err = WeatherDataProcessor::new(config, Logger::disabled()).unwrap_err();
    assert!(matches!(err, PipelineError::Config { .. }));
}
