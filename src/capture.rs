//! Captured exchanges stored as JSON lines.
//!
//! ```
//! use trafficlight::capture::CaptureReader;
//!
//! let input = "{\"id\": 1, \"method\": 3, \"request\": \"CJYB\", \"response\": \"\"}\n\n";
//! let records: Vec<_> = CaptureReader::new(input.as_bytes())
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].status, 0);
//! ```

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::io::BufRead;

use crate::record::{Record, ResolveError, Resolver};

/// Error reading captured exchanges.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum CaptureError
{
    /// Reading the input failed.
    #[snafu(display("Failed to read line {}: {}", line, source))]
    Io
    {
        /// One-based line number.
        line: usize,

        /// Source error.
        source: std::io::Error,
    },

    /// A line was not a valid capture record.
    #[snafu(display("Invalid record on line {}: {}", line, source))]
    Json
    {
        /// One-based line number.
        line: usize,

        /// Source error.
        source: serde_json::Error,
    },
}

/// One captured exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord
{
    /// Record identifier.
    pub id: i64,

    /// Status code reported with the exchange.
    #[serde(default)]
    pub status: i64,

    /// Method identifier.
    pub method: i64,

    /// Base64 request payload.
    pub request: String,

    /// Base64 response payload.
    pub response: String,
}

impl CaptureRecord
{
    /// Decodes the exchange.
    pub fn resolve(&self, resolver: &Resolver) -> Result<Record, ResolveError>
    {
        resolver.resolve(
            self.id,
            self.method,
            self.request.as_str().into(),
            self.response.as_str().into(),
        )
    }
}

/// Reads capture records, one JSON object per line. Blank lines are skipped.
pub struct CaptureReader<R>
{
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> CaptureReader<R>
{
    /// Creates a reader.
    pub fn new(input: R) -> Self
    {
        CaptureReader {
            lines: input.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for CaptureReader<R>
{
    type Item = Result<CaptureRecord, CaptureError>;

    fn next(&mut self) -> Option<Self::Item>
    {
        loop {
            let text = self.lines.next()?;
            self.line += 1;
            let line = self.line;

            let text = match text.context(Io { line }) {
                Ok(text) => text,
                Err(e) => return Some(Err(e)),
            };
            if text.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&text).context(Json { line }));
        }
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn records_and_blank_lines()
    {
        let input = concat!(
            "{\"id\": 1, \"status\": 2, \"method\": 5012, \"request\": \"AA==\", \"response\": \"\"}\n",
            "   \n",
            "{\"id\": 2, \"method\": 3, \"request\": \"\", \"response\": \"CAc=\\u0000\"}\n",
        );

        let records = CaptureReader::new(input.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                CaptureRecord {
                    id: 1,
                    status: 2,
                    method: 5012,
                    request: "AA==".to_string(),
                    response: String::new(),
                },
                CaptureRecord {
                    id: 2,
                    status: 0,
                    method: 3,
                    request: String::new(),
                    response: "CAc=\0".to_string(),
                },
            ]
        );
    }

    #[test]
    fn malformed_line_names_the_line()
    {
        let input = "{\"id\": 1, \"method\": 1, \"request\": \"\", \"response\": \"\"}\n\n{\"id\": 2}\n";
        let results: Vec<_> = CaptureReader::new(input.as_bytes()).collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(CaptureError::Json { line, .. }) => assert_eq!(*line, 3),
            other => panic!("Expected a JSON error: {:?}", other),
        }
    }
}
