//! Drag-and-drop contract between a board view and the controller.

use std::sync::Arc;

use shared::{
    domain::{Deal, DealId},
    stages::{Stage, StageCategory, StageId, StageRegistry},
};

use crate::{
    controller::{BoardController, MoveOutcome},
    error::BoardError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnView {
    pub stage: Stage,
    pub deals: Vec<Deal>,
}

/// Deals split into stage columns, main pipeline first then side outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardColumns {
    pub main: Vec<ColumnView>,
    pub auxiliary: Vec<ColumnView>,
}

impl BoardColumns {
    pub fn iter(&self) -> impl Iterator<Item = &ColumnView> {
        self.main.iter().chain(self.auxiliary.iter())
    }

    pub fn column(&self, stage: StageId) -> Option<&ColumnView> {
        self.iter().find(|column| column.stage.id == stage)
    }

    pub fn total(&self) -> usize {
        self.iter().map(|column| column.deals.len()).sum()
    }
}

/// Every deal lands in exactly one column, in input order within it.
pub fn group_by_stage(registry: &StageRegistry, deals: &[Deal]) -> BoardColumns {
    let mut columns = BoardColumns::default();
    for stage in registry.stages() {
        let view = ColumnView {
            stage: stage.clone(),
            deals: deals
                .iter()
                .filter(|deal| deal.stage == stage.id)
                .cloned()
                .collect(),
        };
        match stage.category {
            StageCategory::Main => columns.main.push(view),
            StageCategory::Auxiliary => columns.auxiliary.push(view),
        }
    }
    columns
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Column(String),
    Outside,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub deal_id: DealId,
    pub target: StageId,
}

#[derive(Debug, Default)]
pub struct DragState {
    active: Option<DealId>,
}

impl DragState {
    pub fn drag_start(&mut self, deal_id: DealId) {
        self.active = Some(deal_id);
    }

    pub fn active(&self) -> Option<&DealId> {
        self.active.as_ref()
    }

    /// Resolves a drop into a move. Drops outside any column, onto an unknown
    /// column, or without an active drag produce nothing.
    pub fn drop_on(&self, registry: &StageRegistry, target: &DropTarget) -> Option<MoveIntent> {
        let deal_id = self.active.clone()?;
        let DropTarget::Column(column) = target else {
            return None;
        };
        let target = registry.resolve_column(column)?;
        Some(MoveIntent { deal_id, target })
    }

    pub fn drag_end(&mut self) {
        self.active = None;
    }
}

/// A board view: holds drag state and forwards resolved intents to the
/// controller. It never edits deals itself.
pub struct KanbanBoard {
    controller: Arc<BoardController>,
    drag: DragState,
}

impl KanbanBoard {
    pub fn new(controller: Arc<BoardController>) -> Self {
        Self {
            controller,
            drag: DragState::default(),
        }
    }

    pub fn controller(&self) -> &Arc<BoardController> {
        &self.controller
    }

    pub fn drag_start(&mut self, deal_id: DealId) {
        self.drag.drag_start(deal_id);
    }

    pub fn dragging(&self) -> Option<&DealId> {
        self.drag.active()
    }

    /// Ends the drag and dispatches the move, if the drop resolved to one.
    pub async fn drop_on(&mut self, target: DropTarget) -> Result<Option<MoveOutcome>, BoardError> {
        let intent = self.drag.drop_on(self.controller.stages(), &target);
        self.drag.drag_end();

        match intent {
            Some(intent) => self
                .controller
                .move_deal(&intent.deal_id, intent.target)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag.drag_end();
    }

    pub async fn columns(&self) -> BoardColumns {
        self.controller.snapshot().await.columns
    }
}

#[cfg(test)]
#[path = "tests/kanban_tests.rs"]
mod tests;
