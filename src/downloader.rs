#![cfg(feature = "web")]

use crate::csv_store::format_csv_row;
use crate::reading::{HEADER, Reading};
use crate::store::header_row;
use std::error::Error;

/// Convert readings to CSV format
///
/// The first line is the store header; readings follow in the order given,
/// which for the export routes is store order.
///
/// # Arguments
/// * `readings` - Readings to export
///
/// # Returns
/// * `String` - CSV content, one line per row
///
/// # Examples
/// ```
/// use bp_tracker::downloader::to_csv;
/// use bp_tracker::reading::Reading;
///
/// let readings = vec![Reading {
///     timestamp: "2024-01-01 09:00:00".to_string(),
///     systolic: 120,
///     diastolic: 80,
///     pulse: 60,
/// }];
/// assert_eq!(
///     to_csv(&readings),
///     "timestamp,systolic,diastolic,pulse\n2024-01-01 09:00:00,120,80,60\n"
/// );
/// ```
pub fn to_csv(readings: &[Reading]) -> String {
    let mut csv_content = format_csv_row(&header_row());
    csv_content.push('\n');

    for reading in readings {
        csv_content.push_str(&format_csv_row(&reading.to_row()));
        csv_content.push('\n');
    }

    csv_content
}

/// Convert readings to XLSX format
///
/// Writes the header in bold on the first row and one reading per following
/// row, with the metrics as numbers so they can be charted in Excel.
///
/// # Arguments
/// * `readings` - Readings to export
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(readings: &[Reading]) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, name) in HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &bold)?;
    }

    for (i, reading) in readings.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, 0, &reading.timestamp)?;
        worksheet.write_number(row, 1, reading.systolic)?;
        worksheet.write_number(row, 2, reading.diastolic)?;
        worksheet.write_number(row, 3, reading.pulse)?;
    }
    worksheet.set_column_width(0, 20)?;

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
