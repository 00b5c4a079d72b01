//! Deal Store Client over the `Pipeline` sheet.
//!
//! Column layout (1-based sheet rows, header in row 1):
//! A firm, B stage, C created, D last activity, E value, F contacts,
//! G emails, H meetings, I notes, J deal id, K revision.

use std::sync::Arc;

use chrono::Utc;
use sheets::{SheetBackend, SheetRange};
use tokio::sync::Mutex;
use tracing::{info, warn};

use shared::{
    domain::{Deal, DealDraft, DealId},
    stages::StageRegistry,
};

use crate::StoreError;

pub const PIPELINE_SHEET: &str = "Pipeline";

pub const PIPELINE_HEADER: [&str; 11] = [
    "Firm Name",
    "Stage",
    "Created At",
    "Last Activity",
    "Value",
    "Contacts",
    "Emails",
    "Meetings",
    "Notes",
    "Deal ID",
    "Revision",
];

const COL_FIRM: usize = 0;
const COL_STAGE: usize = 1;
const COL_CREATED: usize = 2;
const COL_LAST_ACTIVITY: usize = 3;
const COL_VALUE: usize = 4;
const COL_CONTACTS: usize = 5;
const COL_EMAILS: usize = 6;
const COL_MEETINGS: usize = 7;
const COL_NOTES: usize = 8;
const COL_ID: usize = 9;
const COL_REVISION: usize = 10;

/// A full-record replacement. `expected_revision` of `None` skips the
/// concurrency check.
#[derive(Debug, Clone)]
pub struct DealUpdate {
    pub deal: Deal,
    pub expected_revision: Option<u64>,
}

impl DealUpdate {
    /// Checks against `deal.revision` unless the record never carried one.
    pub fn checked(deal: Deal) -> Self {
        let expected_revision = (deal.revision > 0).then_some(deal.revision);
        Self {
            deal,
            expected_revision,
        }
    }

    pub fn unchecked(deal: Deal) -> Self {
        Self {
            deal,
            expected_revision: None,
        }
    }
}

pub struct DealStore {
    backend: Arc<dyn SheetBackend>,
    range: SheetRange,
    stages: Arc<StageRegistry>,
    write_lock: Mutex<()>,
}

struct LocatedDeal {
    row: u32,
    deal: Deal,
}

impl DealStore {
    pub fn new(backend: Arc<dyn SheetBackend>, stages: Arc<StageRegistry>) -> Self {
        Self::with_sheet(backend, stages, PIPELINE_SHEET)
    }

    pub fn with_sheet(
        backend: Arc<dyn SheetBackend>,
        stages: Arc<StageRegistry>,
        sheet: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            range: SheetRange::new(sheet, 'A', 'K', 2),
            stages,
            write_lock: Mutex::new(()),
        }
    }

    pub fn range(&self) -> &SheetRange {
        &self.range
    }

    pub fn stages(&self) -> &Arc<StageRegistry> {
        &self.stages
    }

    pub async fn list_deals(&self) -> Result<Vec<Deal>, StoreError> {
        let located = self.read_all().await?;
        Ok(located.into_iter().map(|l| l.deal).collect())
    }

    pub async fn create_deal(&self, draft: DealDraft) -> Result<Deal, StoreError> {
        let firm_name = draft.firm_name.trim();
        if firm_name.is_empty() {
            return Err(StoreError::Validation("firmName is required".into()));
        }
        if draft.stage.trim().is_empty() {
            return Err(StoreError::Validation("stage is required".into()));
        }
        let stage = self.stages.canonicalize(&draft.stage);
        if !self.stages.is_known(&draft.stage) {
            warn!(firm = firm_name, label = %draft.stage, default = %stage, "store: unknown stage on create, defaulting");
        }

        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let deal = Deal {
            id: DealId::generate(),
            firm_name: firm_name.to_string(),
            stage,
            created_at: draft.created_at.unwrap_or_else(|| today.clone()),
            last_activity: draft.last_activity.unwrap_or(today),
            value: draft.value.unwrap_or_default(),
            contact_count: draft.contact_count,
            email_count: draft.email_count,
            meeting_count: draft.meeting_count,
            note_count: draft.note_count,
            revision: 1,
        };

        let _guard = self.write_lock.lock().await;
        let row = self
            .backend
            .append_row(&self.range, &self.encode(&deal))
            .await
            .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
        info!(deal_id = %deal.id, row, firm = %deal.firm_name, stage = %deal.stage, "store: deal created");
        Ok(deal)
    }

    pub async fn update_deal(&self, update: DealUpdate) -> Result<Deal, StoreError> {
        let DealUpdate {
            mut deal,
            expected_revision,
        } = update;
        if deal.firm_name.trim().is_empty() {
            return Err(StoreError::Validation("firmName is required".into()));
        }

        let _guard = self.write_lock.lock().await;
        let current = self.locate(&deal.id).await?;
        if let Some(expected) = expected_revision {
            if expected != current.deal.revision {
                warn!(deal_id = %deal.id, expected, actual = current.deal.revision, "store: revision conflict");
                return Err(StoreError::Conflict {
                    id: deal.id,
                    expected,
                    actual: current.deal.revision,
                });
            }
        }

        deal.firm_name = deal.firm_name.trim().to_string();
        deal.revision = current.deal.revision + 1;
        // Legacy rows keep their positional id until backfilled.
        let mut cells = self.encode(&deal);
        if deal.id.legacy_row_number().is_some() {
            cells[COL_ID].clear();
        }
        self.backend
            .write_row(&self.range, current.row, &cells)
            .await
            .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
        info!(
            deal_id = %deal.id,
            row = current.row,
            from = %current.deal.stage,
            to = %deal.stage,
            revision = deal.revision,
            "store: deal updated"
        );
        Ok(deal)
    }

    pub async fn delete_deal(&self, id: &DealId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.locate(id).await?;
        self.backend
            .clear_row(&self.range, current.row)
            .await
            .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
        info!(deal_id = %id, row = current.row, "store: deal deleted");
        Ok(())
    }

    /// Writes fresh ids into rows that only have a positional one. Returns
    /// how many rows changed.
    pub async fn backfill_ids(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut changed = 0;
        for mut located in self.read_all().await? {
            if located.deal.id.legacy_row_number().is_none() {
                continue;
            }
            located.deal.id = DealId::generate();
            located.deal.revision = located.deal.revision.max(1);
            self.backend
                .write_row(&self.range, located.row, &self.encode(&located.deal))
                .await
                .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
            info!(row = located.row, deal_id = %located.deal.id, "store: id backfilled");
            changed += 1;
        }
        Ok(changed)
    }

    async fn locate(&self, id: &DealId) -> Result<LocatedDeal, StoreError> {
        self.read_all()
            .await?
            .into_iter()
            .find(|l| &l.deal.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn read_all(&self) -> Result<Vec<LocatedDeal>, StoreError> {
        let rows = self
            .backend
            .read_rows(&self.range)
            .await
            .map_err(|e| StoreError::from_sheet(&self.range.sheet, e))?;
        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(index, cells)| {
                let row = self.range.row_number(index);
                self.decode(row, cells).map(|deal| LocatedDeal { row, deal })
            })
            .collect())
    }

    fn decode(&self, row: u32, cells: &[String]) -> Option<Deal> {
        let cell = |i: usize| cells.get(i).map(|c| c.trim()).unwrap_or_default();

        let firm_name = cell(COL_FIRM);
        if firm_name.is_empty() {
            return None;
        }

        let label = cell(COL_STAGE);
        let stage = self.stages.canonicalize(label);
        if !label.is_empty() && !self.stages.is_known(label) {
            warn!(row, firm = firm_name, label, default = %stage, "store: unknown stage label, defaulting");
        }

        let id = match cell(COL_ID) {
            "" => DealId::legacy_row(row),
            id => DealId::from(id),
        };

        Some(Deal {
            id,
            firm_name: firm_name.to_string(),
            stage,
            created_at: cell(COL_CREATED).to_string(),
            last_activity: cell(COL_LAST_ACTIVITY).to_string(),
            value: cell(COL_VALUE).to_string(),
            contact_count: parse_count(cell(COL_CONTACTS)),
            email_count: parse_count(cell(COL_EMAILS)),
            meeting_count: parse_count(cell(COL_MEETINGS)),
            note_count: parse_count(cell(COL_NOTES)),
            revision: cell(COL_REVISION).parse().unwrap_or(0),
        })
    }

    fn encode(&self, deal: &Deal) -> Vec<String> {
        let mut cells = vec![String::new(); self.range.width()];
        cells[COL_FIRM] = deal.firm_name.clone();
        cells[COL_STAGE] = self.stages.get(deal.stage).title.clone();
        cells[COL_CREATED] = deal.created_at.clone();
        cells[COL_LAST_ACTIVITY] = deal.last_activity.clone();
        cells[COL_VALUE] = deal.value.clone();
        cells[COL_CONTACTS] = deal.contact_count.to_string();
        cells[COL_EMAILS] = deal.email_count.to_string();
        cells[COL_MEETINGS] = deal.meeting_count.to_string();
        cells[COL_NOTES] = deal.note_count.to_string();
        cells[COL_ID] = deal.id.to_string();
        cells[COL_REVISION] = deal.revision.to_string();
        cells
    }
}

/// Leading-digit parse: `"3"`, `"3.0"` and `"3 calls"` are all 3; anything
/// else is 0.
fn parse_count(cell: &str) -> u32 {
    let digits: String = cell.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
#[path = "tests/deals_tests.rs"]
mod tests;
