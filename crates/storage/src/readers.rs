use std::sync::Arc;

use sheets::{SheetBackend, SheetRange};
use tracing::debug;

use shared::domain::{FirmBooking, Meeting};

use crate::StoreError;

pub const MEETINGS_SHEET: &str = "Meetings";
pub const MEETINGS_HEADER: [&str; 4] = ["Date", "Title", "Stage", "Owner"];
pub const FIRMS_SHEET: &str = "Firms";
pub const FIRMS_HEADER: [&str; 3] = ["Name", "Date Booked", "AUM (Millions)"];

fn cell(cells: &[String], index: usize) -> String {
    cells
        .get(index)
        .map(|c| c.trim().to_string())
        .unwrap_or_default()
}

/// Read-only view of the `Meetings` sheet. Only columns A to D are used.
pub struct MeetingStore {
    backend: Arc<dyn SheetBackend>,
    range: SheetRange,
}

impl MeetingStore {
    pub fn new(backend: Arc<dyn SheetBackend>) -> Self {
        Self::with_sheet(backend, MEETINGS_SHEET)
    }

    pub fn with_sheet(backend: Arc<dyn SheetBackend>, sheet: impl Into<String>) -> Self {
        Self {
            backend,
            range: SheetRange::new(sheet, 'A', 'D', 2),
        }
    }

    pub async fn list_meetings(&self) -> Result<Vec<Meeting>, StoreError> {
        let rows = self
            .backend
            .read_rows(&self.range)
            .await
            .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
        let meetings: Vec<Meeting> = rows
            .iter()
            .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|cells| Meeting {
                date: cell(cells, 0),
                title: cell(cells, 1),
                stage: cell(cells, 2),
                owner: cell(cells, 3),
            })
            .collect();
        debug!(count = meetings.len(), "store: meetings listed");
        Ok(meetings)
    }
}

/// Read-only view of the `Firms` sheet (name, booking date, AUM in millions).
pub struct FirmStore {
    backend: Arc<dyn SheetBackend>,
    range: SheetRange,
}

impl FirmStore {
    pub fn new(backend: Arc<dyn SheetBackend>) -> Self {
        Self::with_sheet(backend, FIRMS_SHEET)
    }

    pub fn with_sheet(backend: Arc<dyn SheetBackend>, sheet: impl Into<String>) -> Self {
        Self {
            backend,
            range: SheetRange::new(sheet, 'A', 'C', 2),
        }
    }

    pub async fn list_bookings(&self) -> Result<Vec<FirmBooking>, StoreError> {
        let rows = self
            .backend
            .read_rows(&self.range)
            .await
            .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
        let bookings: Vec<FirmBooking> = rows
            .iter()
            .filter_map(|cells| {
                let name = cell(cells, 0);
                if name.is_empty() {
                    return None;
                }
                Some(FirmBooking {
                    name,
                    date_booked: cell(cells, 1),
                    aum_millions: parse_aum(&cell(cells, 2)),
                })
            })
            .collect();
        debug!(count = bookings.len(), "store: firm bookings listed");
        Ok(bookings)
    }
}

/// Blank, non-numeric and non-finite cells count as zero.
fn parse_aum(cell: &str) -> f64 {
    let cleaned: String = cell.chars().filter(|c| *c != ',' && *c != '$').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
#[path = "tests/readers_tests.rs"]
mod tests;
