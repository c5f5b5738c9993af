use crate::cell::CellValue;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("row {row} has {found} cells but the header has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// An uploaded sheet: ordered header plus rows aligned with it.
///
/// Tables are replaced wholesale on upload and never mutated by filtering;
/// [`Table::filter_rows`] builds a new table instead.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, TableError> {
        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    row: r,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Table { columns, rows })
    }

    /// No columns, no rows. What every operation sees when nothing is loaded.
    pub fn empty() -> Self {
        Table::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Cell at `row` under `column`; `None` when either is out of range.
    pub fn value(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[idx])
    }

    /// Every cell of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Option<impl Iterator<Item = &CellValue>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |cells| &cells[idx]))
    }

    /// Stable filter: keeps rows for which `keep` holds, in their original order.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[CellValue]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|cells| keep(cells))
                .cloned()
                .collect(),
        }
    }

    /// Records orientation (one column→value object per row) for the preview grid.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|cells| {
                self.columns
                    .iter()
                    .zip(cells)
                    .map(|(col, cell)| {
                        (
                            col.clone(),
                            serde_json::to_value(cell).unwrap_or(Value::Null),
                        )
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff() -> Table {
        Table::new(
            vec!["Name".into(), "Dept".into()],
            vec![
                vec!["Ann".into(), "Sales".into()],
                vec!["Bob".into(), CellValue::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Table::new(vec!["a".into(), "b".into()], vec![vec![CellValue::Int(1)]]);
        assert_eq!(
            err,
            Err(TableError::RaggedRow {
                row: 0,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn value_lookup_by_column_name() {
        let t = staff();
        assert_eq!(t.value(0, "Dept"), Some(&CellValue::Text("Sales".into())));
        assert_eq!(t.value(1, "Dept"), Some(&CellValue::Null));
        assert_eq!(t.value(0, "Missing"), None);
        assert_eq!(t.value(5, "Name"), None);
    }

    #[test]
    fn records_map_every_column() {
        let records = staff().to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].len(), 2);
        assert_eq!(records[1]["Dept"], Value::Null);
        assert_eq!(records[0]["Name"], Value::String("Ann".into()));
    }
}
