//! Bookkeeping for optimistic board edits.
//!
//! Every optimistic change is recorded as a [`Mutation`] that starts
//! `Pending` and settles exactly once, to `Confirmed` when the store accepts
//! the write or `RolledBack` when it does not. Refreshes use the log to
//! re-apply edits the fetched rows may not reflect yet.

use std::collections::VecDeque;

use shared::{
    domain::{Deal, DealId},
    stages::StageId,
};

/// Settled entries kept around for overlaying slow refreshes.
const SETTLED_HISTORY: usize = 128;

pub type MutationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Move {
        deal_id: DealId,
        from: StageId,
        to: StageId,
    },
    Delete {
        deal: Deal,
        index: usize,
    },
}

impl MutationKind {
    pub fn deal_id(&self) -> &DealId {
        match self {
            MutationKind::Move { deal_id, .. } => deal_id,
            MutationKind::Delete { deal, .. } => &deal.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: MutationId,
    pub kind: MutationKind,
    pub status: MutationStatus,
    /// Store revision reported when the write was confirmed.
    pub revision: Option<u64>,
    settled_at: Option<u64>,
}

#[derive(Debug, Default)]
pub struct MutationLog {
    next_id: MutationId,
    clock: u64,
    entries: VecDeque<Mutation>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, kind: MutationKind) -> MutationId {
        self.next_id += 1;
        self.clock += 1;
        let id = self.next_id;
        self.entries.push_back(Mutation {
            id,
            kind,
            status: MutationStatus::Pending,
            revision: None,
            settled_at: None,
        });
        id
    }

    /// Marks a pending mutation as accepted by the store. Returns `false` when
    /// the mutation is unknown or already settled.
    pub fn confirm(&mut self, id: MutationId, revision: Option<u64>) -> bool {
        let Some(entry) = self.settle(id, MutationStatus::Confirmed) else {
            return false;
        };
        entry.revision = revision;
        self.prune();
        true
    }

    /// Marks a pending mutation as failed and hands back what it changed so
    /// the caller can undo it.
    pub fn roll_back(&mut self, id: MutationId) -> Option<MutationKind> {
        let kind = self.settle(id, MutationStatus::RolledBack)?.kind.clone();
        self.prune();
        Some(kind)
    }

    pub fn get(&self, id: MutationId) -> Option<&Mutation> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn status(&self, id: MutationId) -> Option<MutationStatus> {
        self.get(id).map(|entry| entry.status)
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == MutationStatus::Pending)
            .count()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Mutation> {
        self.entries.iter()
    }

    /// Logical time used to tell whether a mutation settled after a refresh
    /// began.
    pub fn mark(&self) -> u64 {
        self.clock
    }

    /// Re-applies edits that a list fetched at `since` may not contain: every
    /// pending mutation, plus confirmed ones that settled after `since`.
    pub fn overlay(&self, deals: &mut Vec<Deal>, since: u64) {
        for entry in &self.entries {
            let visible = match entry.status {
                MutationStatus::Pending => true,
                MutationStatus::Confirmed => entry.settled_at.is_some_and(|at| at > since),
                MutationStatus::RolledBack => false,
            };
            if !visible {
                continue;
            }

            match &entry.kind {
                MutationKind::Move { deal_id, to, .. } => {
                    if let Some(deal) = deals.iter_mut().find(|deal| &deal.id == deal_id) {
                        deal.stage = *to;
                        if let Some(revision) = entry.revision {
                            deal.revision = deal.revision.max(revision);
                        }
                    }
                }
                MutationKind::Delete { deal, .. } => deals.retain(|row| row.id != deal.id),
            }
        }
    }

    fn settle(&mut self, id: MutationId, status: MutationStatus) -> Option<&mut Mutation> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.status == MutationStatus::Pending)?;
        entry.status = status;
        entry.settled_at = Some(clock);
        Some(entry)
    }

    fn prune(&mut self) {
        let mut settled = self
            .entries
            .iter()
            .filter(|entry| entry.status != MutationStatus::Pending)
            .count();
        while settled > SETTLED_HISTORY {
            let Some(position) = self
                .entries
                .iter()
                .position(|entry| entry.status != MutationStatus::Pending)
            else {
                break;
            };
            self.entries.remove(position);
            settled -= 1;
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
