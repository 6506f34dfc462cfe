use async_trait::async_trait;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::reading::Reading;
use crate::store::{ReadingStore, StoreError, header_row, records_from_rows};

/// Local file store with the same layout as the remote sheet.
///
/// The file is plain CSV: the header on the first line, one reading per
/// following line. It is opened on every call, so edits made by hand between
/// interactions are picked up.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::NotConfigured);
        }
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() && rows.is_empty() {
                continue;
            }
            rows.push(parse_csv_row(&line));
        }
        Ok(rows)
    }

    fn write_row(&self, row: &[String]) -> Result<(), StoreError> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::NotConfigured);
        }
        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;

        // A hand-edited file may end without a newline
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                writeln!(file)?;
            }
        }
        writeln!(file, "{}", format_csv_row(row))?;
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for CsvStore {
    async fn ensure_header(&mut self) -> Result<(), StoreError> {
        if self.read_rows()?.is_empty() {
            debug!("writing header to {}", self.path.display());
            self.write_row(&header_row())?;
        }
        Ok(())
    }

    async fn append(&mut self, reading: &Reading) -> Result<(), StoreError> {
        self.write_row(&reading.to_row())
    }

    async fn read_all(&mut self) -> Result<Vec<Reading>, StoreError> {
        records_from_rows(&self.read_rows()?)
    }
}

/// Joins cells with commas, quoting any cell that holds a comma, quote or
/// newline.
pub fn format_csv_row(row: &[String]) -> String {
    row.iter()
        .map(|value| {
            if value.contains(',') || value.contains('"') || value.contains('\n') {
                format!("\"{}\"", value.replace('"', "\"\""))
            } else {
                value.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

// Parse a CSV line into its cells
pub fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Escaped quote inside a quoted field
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(std::mem::take(&mut current_field));
            }
            _ => current_field.push(c),
        }
    }

    result.push(current_field);
    result
}
