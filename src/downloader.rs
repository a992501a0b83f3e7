use log::info;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::{Result, SheetError};
use crate::loader::SourceFormat;
use crate::record::{CellValue, Dataset};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Bytes ready to hand to the user as a download.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Export a dataset in the format its name implies
///
/// The output always holds the full dataset as stored: headers first, then
/// one line per record with cells in header order. `.csv` and `.tsv` names
/// produce delimited text; everything else produces an xlsx workbook.
///
/// # Examples
/// ```
/// use sheetdesk::downloader::export_dataset;
/// use sheetdesk::loader::parse_upload;
///
/// let dataset = parse_upload(b"MEMBER,NAME\n1,Ann\n", "members.csv").unwrap();
/// let file = export_dataset(&dataset).unwrap();
/// assert_eq!(file.file_name, "members.csv");
/// assert_eq!(String::from_utf8(file.bytes).unwrap(), "MEMBER,NAME\n1,Ann\n");
/// ```
pub fn export_dataset(dataset: &Dataset) -> Result<ExportedFile> {
    let (content_type, bytes) = match SourceFormat::from_file_name(&dataset.name) {
        SourceFormat::Delimited(b'\t') => ("text/tab-separated-values", to_delimited(dataset, b'\t')?),
        SourceFormat::Delimited(delimiter) => ("text/csv", to_delimited(dataset, delimiter)?),
        SourceFormat::Workbook => (XLSX_CONTENT_TYPE, to_xlsx(dataset)?),
    };
    info!("exported '{}' ({} bytes)", dataset.name, bytes.len());
    Ok(ExportedFile {
        file_name: dataset.name.clone(),
        content_type,
        bytes,
    })
}

/// Header line plus one line per record, cells in header order.
pub fn to_delimited(dataset: &Dataset, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    let export_err = |e: csv::Error| SheetError::Export(e.to_string());
    writer.write_record(&dataset.headers).map_err(export_err)?;
    for row in &dataset.rows {
        writer
            .write_record(dataset.headers.iter().map(|h| row.get(h).to_text()))
            .map_err(export_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| SheetError::Export(e.to_string()))
}

/// Single-sheet xlsx workbook (`Sheet1`) with headers in the first row.
///
/// Numbers are written as numbers and text as strings; empty cells are left
/// blank.
pub fn to_xlsx(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Sheet1")?;

    for (c, header) in dataset.headers.iter().enumerate() {
        let col = column_index(c)?;
        worksheet.write_string(0, col, header.as_str())?;
    }

    for (r, row) in dataset.rows.iter().enumerate() {
        let excel_row = u32::try_from(r + 1)
            .map_err(|_| SheetError::Export("too many rows for a worksheet".to_string()))?;
        for (c, header) in dataset.headers.iter().enumerate() {
            let col = column_index(c)?;
            match row.get(header) {
                CellValue::Empty => {}
                CellValue::Number(n) => {
                    worksheet.write_number(excel_row, col, *n)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(excel_row, col, s.as_str())?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}

fn column_index(c: usize) -> Result<u16> {
    u16::try_from(c).map_err(|_| SheetError::Export("too many columns for a worksheet".to_string()))
}
