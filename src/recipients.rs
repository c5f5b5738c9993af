use crate::cell::CellValue;
use crate::table::Table;
use crate::template::TemplateVariables;
use serde::{Deserialize, Serialize};

/// Used for `employee_name` when the row has no usable name.
pub const FALLBACK_EMPLOYEE_NAME: &str = "Employee";

/// Column read for the `designation` placeholder, when the sheet has it.
pub const DESIGNATION_COLUMN: &str = "Designation";

/// Which of the two name/email column pairs a job came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairSlot {
    First,
    Second,
}

/// A name column and an email column to mail to. Both must be set for the
/// pair to produce jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientPair {
    #[serde(default)]
    pub name_column: Option<String>,
    #[serde(default)]
    pub email_column: Option<String>,
}

impl RecipientPair {
    pub fn new(name_column: &str, email_column: &str) -> Self {
        RecipientPair {
            name_column: Some(name_column.to_string()),
            email_column: Some(email_column.to_string()),
        }
    }

    fn columns(&self) -> Option<(&str, &str)> {
        match (self.name_column.as_deref(), self.email_column.as_deref()) {
            (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => {
                Some((name, email))
            }
            _ => None,
        }
    }
}

/// Who is sending, as typed into the sender section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SenderContext {
    pub sender_name: String,
    pub company_name: String,
}

/// One planned email: a recipient and the values for their letter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendJob {
    pub row: usize,
    pub slot: PairSlot,
    pub recipient_email: String,
    pub variables: TemplateVariables,
}

/// Enumerate one job per (row, pair) whose email cell is filled in.
///
/// Rows are visited in order and, within a row, the first pair before the
/// second. Addresses are not deduplicated.
pub fn build_jobs(
    table: &Table,
    pairs: &[RecipientPair; 2],
    sender: &SenderContext,
) -> Vec<SendJob> {
    let slots = [(PairSlot::First, &pairs[0]), (PairSlot::Second, &pairs[1])];
    let has_designation = table.has_column(DESIGNATION_COLUMN);
    let mut jobs = Vec::new();

    for row in 0..table.len() {
        for (slot, pair) in slots {
            let Some((name_column, email_column)) = pair.columns() else {
                continue;
            };
            let email = match table.value(row, email_column) {
                Some(cell) if !cell.is_blank() => cell.as_text().trim().to_string(),
                _ => continue,
            };

            let employee_name = match table.value(row, name_column) {
                Some(cell) if !cell.is_blank() => cell.as_text(),
                _ => FALLBACK_EMPLOYEE_NAME.to_string(),
            };
            let designation = if has_designation {
                table
                    .value(row, DESIGNATION_COLUMN)
                    .map(CellValue::as_text)
                    .unwrap_or_default()
            } else {
                String::new()
            };

            jobs.push(SendJob {
                row,
                slot,
                recipient_email: email,
                variables: TemplateVariables {
                    employee_name,
                    company_name: sender.company_name.clone(),
                    designation,
                    sender_name: sender.sender_name.clone(),
                },
            });
        }
    }

    jobs
}
