use crate::cell::CellValue;
use crate::table::{Table, TableError};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::{debug, info};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("uploaded file is empty")]
    Empty,

    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("file has no extension")]
    MissingExtension,

    #[error("no sheets found in workbook")]
    NoSheets,

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Decode an uploaded file into a [`Table`]
///
/// The extension of `file_name` picks the decoder. Workbooks are read
/// through calamine (first sheet only), csv through the csv crate. In both
/// cases the first row is the header.
///
/// # Arguments
/// * `file_name` - Name the browser sent with the upload
/// * `bytes` - Raw file contents
///
/// # Returns
/// * `Result<Table, LoadError>` - The decoded table or the reason it could not be read
pub fn load_upload(file_name: &str, bytes: &[u8]) -> Result<Table, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::Empty);
    }

    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let table = match extension.as_deref() {
        Some("csv") => from_csv(bytes)?,
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("xlsb") | Some("ods") => {
            from_workbook(bytes)?
        }
        Some(ext) => return Err(LoadError::UnsupportedExtension(ext.to_string())),
        None => return Err(LoadError::MissingExtension),
    };

    info!(
        "loaded {} with {} columns and {} rows",
        file_name,
        table.columns().len(),
        table.len()
    );
    Ok(table)
}

/// Load the first worksheet of an Excel/OpenDocument workbook.
pub fn from_workbook(bytes: &[u8]) -> Result<Table, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let range = workbook.worksheet_range_at(0).ok_or(LoadError::NoSheets)??;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header.iter().map(header_text).collect::<Vec<_>>(),
        None => return Ok(Table::empty()),
    };
    let columns = normalize_headers(header);

    let body = rows
        .map(|row| {
            let cells = row.iter().map(data_to_cell).collect();
            pad_row(cells, columns.len())
        })
        .collect();

    Ok(Table::new(columns, body)?)
}

/// Load a comma separated file with a header row.
pub fn from_csv(bytes: &[u8]) -> Result<Table, LoadError> {
    // spreadsheet programs often prefix their csv exports with a BOM
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let header = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    let columns = normalize_headers(header);

    let mut body = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells = record.iter().map(CellValue::infer).collect();
        body.push(pad_row(cells, columns.len()));
    }

    Ok(Table::new(columns, body)?)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) => CellValue::from_float(*f).to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn data_to_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::from_float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Error(e) => {
            debug!("treating cell error {:?} as null", e);
            CellValue::Null
        }
        // dates and durations keep their rendered text
        other => CellValue::Text(other.to_string()),
    }
}

/// Blank headers become `Unnamed: {i}` and repeats get a `.1`, `.2` suffix,
/// so every column name in a table is unique.
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(raw.len());

    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name
        };

        let mut candidate = base.clone();
        while let Some(count) = seen.get_mut(&candidate) {
            *count += 1;
            candidate = format!("{}.{}", base, count);
        }
        seen.insert(candidate.clone(), 0);
        columns.push(candidate);
    }

    columns
}

fn pad_row(mut cells: Vec<CellValue>, width: usize) -> Vec<CellValue> {
    cells.resize(width, CellValue::Null);
    cells
}
