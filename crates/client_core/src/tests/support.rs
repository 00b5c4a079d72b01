//! In-memory pipeline used by the controller and board tests.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use shared::{
    domain::{Deal, DealDraft, DealId},
    error::{ApiError, ErrorCode},
    protocol::UpdateDealResponse,
    stages::{Stage, StageId, StageRegistry},
};
use tokio::sync::{Mutex, Notify};

use crate::{BoardError, PipelineApi};

pub(crate) fn deal(id: &str, firm: &str, stage: StageId) -> Deal {
    Deal {
        id: DealId::from(id),
        firm_name: firm.to_string(),
        stage,
        created_at: "2024-05-01".to_string(),
        last_activity: String::new(),
        value: String::new(),
        contact_count: 0,
        email_count: 0,
        meeting_count: 0,
        note_count: 0,
        revision: 1,
    }
}

#[derive(Default)]
pub(crate) struct FakePipeline {
    pub deals: Mutex<Vec<Deal>>,
    pub updates: Mutex<Vec<Deal>>,
    pub deletes: Mutex<Vec<DealId>>,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_lists: AtomicBool,
    pub list_calls: AtomicUsize,
    /// When set, updates wait for a permit before answering.
    pub update_gate: Option<Arc<Notify>>,
    /// Taken by the next list call, which then waits for a permit before
    /// answering with the rows it read up front.
    pub list_gate: Mutex<Option<Arc<Notify>>>,
    next_id: AtomicUsize,
}

impl FakePipeline {
    pub fn with_deals(deals: Vec<Deal>) -> Self {
        Self {
            deals: Mutex::new(deals),
            next_id: AtomicUsize::new(100),
            ..Self::default()
        }
    }

    pub fn gated_updates(mut self, gate: Arc<Notify>) -> Self {
        self.update_gate = Some(gate);
        self
    }

    pub async fn gate_next_list(&self, gate: Arc<Notify>) {
        *self.list_gate.lock().await = Some(gate);
    }

    pub async fn stage_of(&self, id: &str) -> Option<StageId> {
        self.deals
            .lock()
            .await
            .iter()
            .find(|deal| deal.id.as_str() == id)
            .map(|deal| deal.stage)
    }

    pub async fn set_stage(&self, id: &str, stage: StageId) {
        if let Some(deal) = self
            .deals
            .lock()
            .await
            .iter_mut()
            .find(|deal| deal.id.as_str() == id)
        {
            deal.stage = stage;
            deal.revision += 1;
        }
    }
}

fn unavailable() -> BoardError {
    ApiError::new(ErrorCode::Unavailable, "sheet offline").into()
}

#[async_trait]
impl PipelineApi for FakePipeline {
    async fn list_deals(&self) -> Result<Vec<Deal>, BoardError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.deals.lock().await.clone();
        let gate = self.list_gate.lock().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(rows)
    }

    async fn create_deal(&self, draft: &DealDraft) -> Result<Deal, BoardError> {
        let registry = StageRegistry::standard();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut created = deal(
            &id.to_string(),
            draft.firm_name.trim(),
            registry.canonicalize(&draft.stage),
        );
        created.value = draft.value.clone().unwrap_or_default();
        created.contact_count = draft.contact_count;
        self.deals.lock().await.push(created.clone());
        Ok(created)
    }

    async fn update_deal(&self, record: &Deal) -> Result<UpdateDealResponse, BoardError> {
        if let Some(gate) = &self.update_gate {
            gate.notified().await;
        }
        self.updates.lock().await.push(record.clone());
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let mut deals = self.deals.lock().await;
        let Some(stored) = deals.iter_mut().find(|deal| deal.id == record.id) else {
            return Err(ApiError::not_found(format!("Deal {} not found", record.id)).into());
        };
        if record.revision != 0 && record.revision != stored.revision {
            return Err(ApiError::new(ErrorCode::Conflict, "revision mismatch").into());
        }
        let revision = stored.revision + 1;
        *stored = Deal {
            revision,
            ..record.clone()
        };
        Ok(UpdateDealResponse {
            success: true,
            revision,
        })
    }

    async fn delete_deal(&self, id: &DealId) -> Result<(), BoardError> {
        self.deletes.lock().await.push(id.clone());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut deals = self.deals.lock().await;
        let before = deals.len();
        deals.retain(|deal| &deal.id != id);
        if deals.len() == before {
            return Err(ApiError::not_found(format!("Deal {id} not found")).into());
        }
        Ok(())
    }

    async fn list_stages(&self) -> Result<Vec<Stage>, BoardError> {
        Ok(StageRegistry::standard().stages().to_vec())
    }
}
