//! Spreadsheet date serials to `DD-MM-YYYY` display strings.

use chrono::DateTime;

use crate::record::CellValue;

/// Serial of 1970-01-01 in the 1900 date system (day zero is 1899-12-30).
pub const UNIX_EPOCH_SERIAL: f64 = 25569.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Format a date serial as `DD-MM-YYYY` (UTC). `None` when the serial is not
/// finite or falls outside the representable calendar.
pub fn serial_to_date_string(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let seconds = ((serial - UNIX_EPOCH_SERIAL) * SECONDS_PER_DAY).floor();
    if seconds.abs() > i64::MAX as f64 {
        return None;
    }
    let date = DateTime::from_timestamp(seconds as i64, 0)?;
    Some(date.format("%d-%m-%Y").to_string())
}

/// Normalize a cell read from a date column.
///
/// Numeric cells (including numeric text) become date strings; anything else
/// is passed through untouched so malformed dates survive the import.
pub fn normalize_date_cell(cell: CellValue) -> CellValue {
    match cell.as_number().and_then(serial_to_date_string) {
        Some(text) => CellValue::Text(text),
        None => cell,
    }
}
