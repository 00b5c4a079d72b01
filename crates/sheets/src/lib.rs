//! Row-oriented access to a remote spreadsheet.

use async_trait::async_trait;
use thiserror::Error;

pub mod auth;
pub mod google;

pub use auth::{AccessTokenProvider, ServiceAccount, StaticToken};
pub use google::GoogleSheetsClient;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("spreadsheet unreachable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("range not found: {0}")]
    RangeNotFound(String),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("spreadsheet authentication failed: {0}")]
    Auth(String),
    #[error("unexpected spreadsheet response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SheetError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            SheetError::Decode(value.to_string())
        } else {
            SheetError::Unavailable(value.to_string())
        }
    }
}

/// A fixed block of columns on one sheet, starting at `first_row` (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub sheet: String,
    pub first_column: char,
    pub last_column: char,
    pub first_row: u32,
}

impl SheetRange {
    pub fn new(
        sheet: impl Into<String>,
        first_column: char,
        last_column: char,
        first_row: u32,
    ) -> Self {
        debug_assert!(first_column.is_ascii_uppercase() && last_column.is_ascii_uppercase());
        debug_assert!(first_column <= last_column && first_row >= 1);
        Self {
            sheet: sheet.into(),
            first_column,
            last_column,
            first_row,
        }
    }

    pub fn width(&self) -> usize {
        (self.last_column as usize) - (self.first_column as usize) + 1
    }

    /// Open-ended A1 notation, e.g. `Pipeline!A2:K`.
    pub fn a1(&self) -> String {
        format!(
            "{}!{}{}:{}",
            quoted_sheet_name(&self.sheet),
            self.first_column,
            self.first_row,
            self.last_column
        )
    }

    /// A1 notation for a single row, e.g. `Pipeline!A7:K7`.
    pub fn row_a1(&self, row: u32) -> String {
        format!(
            "{}!{}{row}:{}{row}",
            quoted_sheet_name(&self.sheet),
            self.first_column,
            self.last_column
        )
    }

    /// Sheet row number of the `index`-th row returned by a read of this range.
    pub fn row_number(&self, index: usize) -> u32 {
        self.first_row + index as u32
    }
}

fn quoted_sheet_name(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Extracts the first row number from an A1 range such as `Pipeline!A7:K7`.
pub fn first_row_of_a1(range: &str) -> Option<u32> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let start = cells.split(':').next()?;
    let digits: String = start.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    digits.parse().ok()
}

/// Row-oriented spreadsheet operations. Rows are addressed by 1-based sheet
/// row number; reads start at `range.first_row` and may omit trailing blank
/// cells and trailing blank rows.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn read_rows(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, SheetError>;
    async fn write_row(
        &self,
        range: &SheetRange,
        row: u32,
        cells: &[String],
    ) -> Result<(), SheetError>;
    /// Appends after the last non-blank row and returns the row number written.
    async fn append_row(&self, range: &SheetRange, cells: &[String]) -> Result<u32, SheetError>;
    async fn clear_row(&self, range: &SheetRange, row: u32) -> Result<(), SheetError>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
