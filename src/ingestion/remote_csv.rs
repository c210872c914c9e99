//! CSV tables fetched over HTTP(S) or read from disk.

use super::{CsvSource, current_thread_runtime};
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Rows sampled when inferring column types
const INFER_SCHEMA_ROWS: usize = 1000;

/// Fetches CSV tables from `http(s)://` URLs, `file://` URLs or plain paths
#[derive(Debug, Default, Clone)]
pub struct RemoteCsvSource {
    timeout: Option<Duration>,
}

impl RemoteCsvSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a request timeout to HTTP downloads
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let runtime = current_thread_runtime().map_err(|e| PipelineError::network(url, e))?;

        runtime.block_on(async {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder.build().map_err(|e| PipelineError::network(url, e))?;

            let response = client
                .get(url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|e| PipelineError::network(url, e))?;

            let body = response
                .bytes()
                .await
                .map_err(|e| PipelineError::network(url, e))?;

            debug!("Downloaded {} bytes from {}", body.len(), url);
            Ok(body.to_vec())
        })
    }

    fn read_local(&self, location: &str) -> Result<Vec<u8>> {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        std::fs::read(path).map_err(|e| PipelineError::network(location, e))
    }
}

impl CsvSource for RemoteCsvSource {
    fn fetch(&self, location: &str) -> Result<DataFrame> {
        let body = if is_http(location) {
            self.download(location)?
        } else {
            self.read_local(location)?
        };

        let frame = parse_csv(location, body)?;
        info!(
            "CSV file read successfully from {}: {} rows, {} columns",
            location,
            frame.height(),
            frame.width()
        );
        Ok(frame)
    }
}

fn is_http(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Parse a CSV body with a header row into a DataFrame
pub fn parse_csv(location: &str, body: Vec<u8>) -> Result<DataFrame> {
    if body.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Err(PipelineError::format(location, "no columns to parse"));
    }

    let header = header_line(&body);
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .into_reader_with_file_handle(Cursor::new(body))
        .finish()
        .map_err(|e| PipelineError::format(location, e.to_string()))?;

    if frame.width() == 0 {
        return Err(PipelineError::format(location, "no columns to parse"));
    }

    name_blank_headers(frame, &header)
}

fn header_line(body: &[u8]) -> String {
    let end = body
        .iter()
        .position(|byte| *byte == b'\n')
        .unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).trim_end_matches('\r').to_string()
}

/// Split a header line on commas outside double quotes, unquoting cells
fn split_header(header: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = header.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            other => cell.push(other),
        }
    }
    cells.push(cell);
    cells
}

/// Give blank header cells the `Unnamed: {i}` name used by pandas exports,
/// so a written-out index column can be dropped by name.
fn name_blank_headers(mut frame: DataFrame, header: &str) -> Result<DataFrame> {
    let current: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    for (index, cell) in split_header(header).into_iter().enumerate() {
        if !cell.trim().is_empty() {
            continue;
        }
        let Some(old) = current.get(index) else {
            break;
        };
        let unnamed = format!("Unnamed: {}", index);
        if *old != unnamed {
            frame.rename(old, unnamed.as_str().into())?;
        }
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_csv_infers_types() {
        let body = b"Field_ID,Weather_station\n1,10\n2,11\n".to_vec();
        let df = parse_csv("inline", body).unwrap();

        assert_eq!(df.shape(), (2, 2));
        assert_eq!(df.column("Field_ID").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_blank_header_named_like_pandas_index() {
        let body = b",Field_ID,Weather_station\r\n0,1,10\r\n1,2,11\r\n".to_vec();
        let df = parse_csv("inline", body).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, vec!["Unnamed: 0", "Field_ID", "Weather_station"]);
    }

    #[test]
    fn test_quoted_comma_does_not_shift_blank_header() {
        let body = b"\"Yield, t/ha\",,Field_ID\n1.5,0,1\n".to_vec();
        let df = parse_csv("inline", body).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, vec!["Yield, t/ha", "Unnamed: 1", "Field_ID"]);
    }

    #[test]
    fn test_split_header_respects_quotes() {
        assert_eq!(
            split_header(r#""a,b",,"say ""hi""",c"#),
            vec!["a,b", "", "say \"hi\"", "c"]
        );
    }

    #[test]
    fn test_empty_body_is_format_error() {
        let err = parse_csv("inline", b"  \n".to_vec()).unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
    }

    #[test]
    fn test_fetch_local_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stations.csv");
        std::fs::write(&path, "Weather_station_ID,Message\n0,Rain 5 mm\n").unwrap();

        let source = RemoteCsvSource::new();
        let df = source.fetch(&path.display().to_string()).unwrap();
        assert_eq!(df.height(), 1);

        let via_url = source.fetch(&format!("file://{}", path.display())).unwrap();
        assert_eq!(via_url.height(), 1);
    }

    #[test]
    fn test_missing_file_is_network_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.csv");

        let err = RemoteCsvSource::new()
            .fetch(&path.display().to_string())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network { .. }));
    }

    #[test]
    fn test_scheme_detection() {
        assert!(is_http("https://example.org/data.csv"));
        assert!(is_http("HTTP://example.org/data.csv"));
        assert!(!is_http("/tmp/data.csv"));
        assert!(!is_http("file:///tmp/data.csv"));
    }
}
