use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::{debug, info};
use std::io::Cursor;
use std::path::Path;

use crate::dates::normalize_date_cell;
use crate::error::{Result, SheetError};
use crate::record::{CellValue, Dataset, Record, is_date_header};

/// How uploaded bytes are decoded, chosen from the declared file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text with the given separator byte.
    Delimited(u8),
    /// Any workbook format calamine can sniff (xlsx, xlsm, xlsb, xls, ods).
    Workbook,
}

impl SourceFormat {
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("csv") => SourceFormat::Delimited(b','),
            Some("tsv") | Some("tab") => SourceFormat::Delimited(b'\t'),
            _ => SourceFormat::Workbook,
        }
    }
}

/// Parse an uploaded file into a dataset named after the file
///
/// The first row of the first sheet becomes the header list verbatim; every
/// following non-blank row becomes one record with a cell for every header.
/// Cells under headers containing `DOB` go through the date normalizer.
///
/// # Examples
/// ```
/// use sheetdesk::loader::parse_upload;
///
/// let csv = b"MEMBER,NAME,DOB\n7,Ann,25569\n";
/// let dataset = parse_upload(csv, "members.csv").unwrap();
/// assert_eq!(dataset.rows.len(), 1);
/// assert_eq!(dataset.rows[0].get("DOB").to_text(), "01-01-1970");
/// ```
pub fn parse_upload(bytes: &[u8], file_name: &str) -> Result<Dataset> {
    let grid = match SourceFormat::from_file_name(file_name) {
        SourceFormat::Delimited(delimiter) => read_delimited(bytes, delimiter)?,
        SourceFormat::Workbook => read_workbook(bytes)?,
    };
    let dataset = build_dataset(file_name, grid)?;
    info!(
        "parsed '{}': {} headers, {} rows",
        dataset.name,
        dataset.headers.len(),
        dataset.rows.len()
    );
    Ok(dataset)
}

/// Turn a decoded grid (row 0 = headers) into a dataset. Every later row,
/// blank ones included, becomes one record.
pub fn build_dataset(name: &str, grid: Vec<Vec<CellValue>>) -> Result<Dataset> {
    let mut rows = grid.into_iter();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| SheetError::Parse("file contains no header row".to_string()))?
        .iter()
        .map(CellValue::to_text)
        .collect();

    let records = rows.map(|row| row_to_record(&headers, row)).collect();

    Ok(Dataset::new(name, headers, records))
}

fn row_to_record(headers: &[String], mut row: Vec<CellValue>) -> Record {
    if row.len() < headers.len() {
        row.resize(headers.len(), CellValue::Empty);
    }
    // Later duplicates of a header overwrite earlier ones.
    headers
        .iter()
        .zip(row)
        .map(|(header, cell)| {
            let value = if is_date_header(header) {
                normalize_date_cell(cell)
            } else {
                cell
            };
            (header.clone(), value)
        })
        .collect()
}

fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<Vec<CellValue>>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SheetError::Parse(e.to_string()))?;
        grid.push(record.iter().map(CellValue::from).collect());
    }
    debug!("read {} delimited lines", grid.len());
    Ok(grid)
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SheetError::Parse("no sheets found in workbook".to_string()))?;

    let range = workbook.worksheet_range(&sheet_name)?;
    debug!(
        "sheet '{}' is {}x{}",
        sheet_name,
        range.height(),
        range.width()
    );

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}
