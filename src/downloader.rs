use crate::cell::CellValue;
use crate::table::Table;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Deserialize;
use thiserror::Error;

/// File name offered for the filtered download.
pub const EXPORT_FILE_NAME: &str = "filtered_data.xlsx";

/// Worksheet name inside the exported workbook.
pub const EXPORT_SHEET_NAME: &str = "Filtered Data";

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const CSV_FILE_NAME: &str = "filtered_data.csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output was not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to finish csv output: {0}")]
    Io(#[from] std::io::Error),

    #[error("table is too large for a worksheet ({rows} rows, {columns} columns)")]
    TooLarge { rows: usize, columns: usize },
}

/// A ready-to-download file.
#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Convert a table to XLSX format
///
/// Writes a single `Filtered Data` worksheet: a bold header row followed by
/// one row per table row. Numbers and booleans keep their cell type, null
/// cells are left empty.
///
/// # Arguments
/// * `table` - The table to export
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - XLSX file content as bytes or an error
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(EXPORT_SHEET_NAME)?;

    let too_large = || ExportError::TooLarge {
        rows: table.len(),
        columns: table.columns().len(),
    };
    // row and column indices must fit the writer's u32/u16
    u16::try_from(table.columns().len()).map_err(|_| too_large())?;
    u32::try_from(table.len() + 1).map_err(|_| too_large())?;

    let bold = Format::new().set_bold();
    for (c, column) in table.columns().iter().enumerate() {
        let col = u16::try_from(c).map_err(|_| too_large())?;
        worksheet.write_string_with_format(0, col, column, &bold)?;
    }

    for (r, cells) in table.rows().iter().enumerate() {
        let row = u32::try_from(r + 1).map_err(|_| too_large())?;
        for (c, cell) in cells.iter().enumerate() {
            let col = u16::try_from(c).map_err(|_| too_large())?;
            match cell {
                CellValue::Null => {}
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                CellValue::Int(i) => {
                    worksheet.write_number(row, col, *i as f64)?;
                }
                CellValue::Float(f) => {
                    worksheet.write_number(row, col, *f)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// The filtered download: `filtered_data.xlsx`, or `filtered_data.csv`.
pub fn export_filtered(table: &Table, format: ExportFormat) -> Result<Export, ExportError> {
    let export = match format {
        ExportFormat::Xlsx => Export {
            file_name: EXPORT_FILE_NAME,
            content_type: XLSX_CONTENT_TYPE,
            bytes: to_xlsx(table)?,
        },
        ExportFormat::Csv => Export {
            file_name: CSV_FILE_NAME,
            content_type: CSV_CONTENT_TYPE,
            bytes: to_csv(table)?.into_bytes(),
        },
    };
    Ok(export)
}

/// Convert a table to CSV with its header row. Quoting is left to the csv writer.
pub fn to_csv(table: &Table) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for cells in table.rows() {
        writer.write_record(cells.iter().map(|cell| cell.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
