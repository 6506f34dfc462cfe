use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column names of the store, in the order they are written.
pub const HEADER: [&str; 4] = ["timestamp", "systolic", "diastolic", "pulse"];

/// `strftime` pattern used for every stored timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

lazy_static! {
    static ref TIMESTAMP_REGEX: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").unwrap();
}

/// A timestamp that could not be read back as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp '{value}': expected YYYY-MM-DD HH:MM:SS")]
pub struct ParseError {
    pub value: String,
}

/// One timestamped blood pressure and pulse measurement.
///
/// The timestamp is kept as the exact text found in the store so that a
/// read-back never reformats what was written. It is only parsed when the
/// readings are charted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: String,
    pub systolic: u32,
    pub diastolic: u32,
    pub pulse: u32,
}

impl Reading {
    /// Creates a reading stamped with the given wall-clock time.
    pub fn stamped(at: NaiveDateTime, systolic: u32, diastolic: u32, pulse: u32) -> Self {
        Reading {
            timestamp: format_timestamp(at),
            systolic,
            diastolic,
            pulse,
        }
    }

    /// The row written to the store, in [`HEADER`] order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.systolic.to_string(),
            self.diastolic.to_string(),
            self.pulse.to_string(),
        ]
    }

    /// Parses the stored timestamp.
    pub fn parsed_timestamp(&self) -> Result<NaiveDateTime, ParseError> {
        parse_timestamp(&self.timestamp)
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp, rejecting anything that is not exactly
/// `YYYY-MM-DD HH:MM:SS` (chrono alone accepts unpadded fields).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, ParseError> {
    let error = || ParseError {
        value: value.to_string(),
    };

    if !TIMESTAMP_REGEX.is_match(value) {
        return Err(error());
    }

    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| error())
}
