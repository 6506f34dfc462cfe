use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use crate::config::{Config, StoreBackend};
use crate::csv_store::CsvStore;
use crate::reading::{HEADER, Reading};

/// Any failure opening, reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no store identifier configured")]
    NotConfigured,

    #[error("failed to load credentials from {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("could not reach the store: {0}")]
    Transport(String),

    #[error("store request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("store '{0}' not found")]
    NotFound(String),

    #[error("row {row} is malformed: {reason}")]
    Malformed { row: usize, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The three capabilities the views need from a tabular store.
///
/// Implementations hold whatever connection state they need; every method
/// takes `&mut self` so a backend can refresh credentials on demand.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Writes the header row if the store has no rows at all.
    async fn ensure_header(&mut self) -> Result<(), StoreError>;

    /// Appends one reading after the last row.
    async fn append(&mut self, reading: &Reading) -> Result<(), StoreError>;

    /// Every data row, header excluded, in store order.
    async fn read_all(&mut self) -> Result<Vec<Reading>, StoreError>;
}

/// Builds the store backend named by the configuration.
///
/// No remote call is made here; connectivity problems surface from the
/// first [`ReadingStore`] call instead.
pub fn open_store(config: &Config) -> Result<Box<dyn ReadingStore>, StoreError> {
    debug!("opening {:?} store '{}'", config.backend, config.store_id);
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::Csv => Ok(Box::new(CsvStore::new(config.store_id.trim()))),
        #[cfg(feature = "web")]
        StoreBackend::Sheets => Ok(Box::new(crate::sheets::SheetsStore::new(
            &config.store_id,
            &config.credentials_path,
        ))),
        #[cfg(not(feature = "web"))]
        StoreBackend::Sheets => Err(StoreError::Unavailable(
            "the sheets backend requires the 'web' feature".to_string(),
        )),
    }
}

/// The header row as owned strings.
pub fn header_row() -> Vec<String> {
    HEADER.iter().map(|name| name.to_string()).collect()
}

/// Turns raw store rows into readings, looking columns up by header name.
///
/// The first row is the header. Rows where every cell is blank are skipped;
/// short rows are treated as padded with blanks. Metric cells are trimmed
/// before parsing; the timestamp is kept exactly as stored. Row numbers in errors are
/// 1-based store rows, matching what a spreadsheet shows.
pub fn records_from_rows(rows: &[Vec<String>]) -> Result<Vec<Reading>, StoreError> {
    let Some((header, data)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let column = |name: &str| {
        header
            .iter()
            .position(|cell| cell.trim() == name)
            .ok_or_else(|| StoreError::Malformed {
                row: 1,
                reason: format!("header has no '{}' column", name),
            })
    };
    let timestamp_col = column("timestamp")?;
    let systolic_col = column("systolic")?;
    let diastolic_col = column("diastolic")?;
    let pulse_col = column("pulse")?;

    let mut readings = Vec::with_capacity(data.len());
    for (i, row) in data.iter().enumerate() {
        let row_number = i + 2;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let cell = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");
        let metric = |idx: usize, name: &str| {
            cell(idx)
                .parse::<u32>()
                .map_err(|_| StoreError::Malformed {
                    row: row_number,
                    reason: format!("{} '{}' is not a non-negative integer", name, cell(idx)),
                })
        };

        readings.push(Reading {
            timestamp: row.get(timestamp_col).cloned().unwrap_or_default(),
            systolic: metric(systolic_col, "systolic")?,
            diastolic: metric(diastolic_col, "diastolic")?,
            pulse: metric(pulse_col, "pulse")?,
        });
    }

    Ok(readings)
}

/// Process-local store used by tests and by the `memory` backend.
///
/// A failure can be forced with [`MemoryStore::fail_with`] to exercise the
/// error paths of the views.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    rows: Vec<Vec<String>>,
    header_writes: usize,
    failure: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing raw rows, header included.
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        MemoryStore {
            rows,
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn fail_with(&mut self, message: &str) {
        self.failure = Some(message.to_string());
    }

    pub fn recover(&mut self) {
        self.failure = None;
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// How many times the header row has been written.
    pub fn header_writes(&self) -> usize {
        self.header_writes
    }

    fn check(&self) -> Result<(), StoreError> {
        match &self.failure {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn ensure_header(&mut self) -> Result<(), StoreError> {
        self.check()?;
        if self.rows.is_empty() {
            self.rows.push(header_row());
            self.header_writes += 1;
        }
        Ok(())
    }

    async fn append(&mut self, reading: &Reading) -> Result<(), StoreError> {
        self.check()?;
        self.rows.push(reading.to_row());
        Ok(())
    }

    async fn read_all(&mut self) -> Result<Vec<Reading>, StoreError> {
        self.check()?;
        records_from_rows(&self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn reading(ts: &str, s: u32, d: u32, p: u32) -> Reading {
        Reading {
            timestamp: ts.to_string(),
            systolic: s,
            diastolic: d,
            pulse: p,
        }
    }

    #[test]
    fn no_rows_means_no_records() {
        assert!(records_from_rows(&[]).unwrap().is_empty());
        assert!(records_from_rows(&[header_row()]).unwrap().is_empty());
    }

    #[test]
    fn records_are_keyed_by_header_name() {
        let rows = vec![
            row(&["pulse", "timestamp", "diastolic", "systolic"]),
            row(&["70", "2024-01-01 09:00:00", "81", "121"]),
        ];
        let records = records_from_rows(&rows).unwrap();
        assert_eq!(records, vec![reading("2024-01-01 09:00:00", 121, 81, 70)]);
    }

    #[test]
    fn blank_rows_are_skipped() {
        let rows = vec![
            header_row(),
            row(&["", "", "", ""]),
            row(&["2024-01-01 09:00:00", "120", "80", "60"]),
            row(&[]),
        ];
        assert_eq!(records_from_rows(&rows).unwrap().len(), 1);
    }

    #[test]
    fn timestamp_text_is_kept_verbatim() {
        let rows = vec![
            header_row(),
            row(&[" 2024-01-01 09:00:00 ", " 120", "80 ", "60"]),
        ];
        let records = records_from_rows(&rows).unwrap();
        assert_eq!(records[0].timestamp, " 2024-01-01 09:00:00 ");
        assert_eq!(records[0].systolic, 120);
        assert_eq!(records[0].diastolic, 80);
    }

    #[test]
    fn non_integer_metric_is_malformed() {
        let rows = vec![
            header_row(),
            row(&["2024-01-01 09:00:00", "120", "80", "60"]),
            row(&["2024-01-01 10:00:00", "120", "-1", "60"]),
        ];
        match records_from_rows(&rows) {
            Err(StoreError::Malformed { row, reason }) => {
                assert_eq!(row, 3);
                assert!(reason.contains("diastolic"));
            }
            other => panic!("expected malformed row, got {:?}", other),
        }
    }

    #[test]
    fn missing_header_column_is_malformed() {
        let rows = vec![row(&["timestamp", "systolic", "diastolic"])];
        assert!(matches!(
            records_from_rows(&rows),
            Err(StoreError::Malformed { row: 1, .. })
        ));
    }

    #[tokio::test]
    async fn header_is_written_once() {
        let mut store = MemoryStore::new();
        store.ensure_header().await.unwrap();
        store.ensure_header().await.unwrap();
        assert_eq!(store.header_writes(), 1);
        assert_eq!(store.rows(), &[header_row()]);

        store
            .append(&reading("2024-01-01 09:00:00", 120, 80, 60))
            .await
            .unwrap();
        store.ensure_header().await.unwrap();
        assert_eq!(store.header_writes(), 1);
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn appended_readings_round_trip() {
        let mut store = MemoryStore::new();
        store.ensure_header().await.unwrap();
        let written: Vec<Reading> = (0..5)
            .map(|i| reading(&format!("2024-01-0{} 08:30:00", i + 1), 110 + i, 70 + i, 60 + i))
            .collect();
        for r in &written {
            store.append(r).await.unwrap();
        }
        assert_eq!(store.read_all().await.unwrap(), written);
    }

    #[tokio::test]
    async fn forced_failure_covers_every_call() {
        let mut store = MemoryStore::new();
        store.fail_with("offline");
        assert!(matches!(
            store.ensure_header().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.read_all().await.is_err());
        assert!(
            store
                .append(&reading("2024-01-01 09:00:00", 1, 1, 1))
                .await
                .is_err()
        );
        assert!(store.rows().is_empty());

        store.recover();
        assert!(store.ensure_header().await.is_ok());
    }

    #[tokio::test]
    async fn csv_backend_without_path_fails_on_use() {
        let config = Config {
            backend: StoreBackend::Csv,
            store_id: String::new(),
            ..Config::default()
        };
        let Ok(mut store) = open_store(&config) else {
            panic!("opening should not touch the file");
        };
        assert!(matches!(
            store.ensure_header().await,
            Err(StoreError::NotConfigured)
        ));
    }
}
