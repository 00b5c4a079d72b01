//! Board state controller.
//!
//! Owns the client's copy of the pipeline. Views read snapshots and send
//! intents; only the controller changes board state. Moves are applied
//! optimistically and tracked in a [`MutationLog`]. All store writes run in
//! issue order on a single worker task, which settles each write before
//! taking the next one.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Deal, DealDraft, DealId},
    error::ApiError,
    protocol::UpdateDealResponse,
    stages::{StageId, StageRegistry},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    error::BoardError,
    kanban::{group_by_stage, BoardColumns},
    mutation::{Mutation, MutationId, MutationKind, MutationLog},
    PipelineApi,
};

pub const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The deal is unknown or already in the target stage; nothing was sent.
    Unchanged,
    Moved { revision: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Refreshed { deals: usize },
    Moved { deal_id: DealId, stage: StageId },
    MoveConfirmed { deal_id: DealId, revision: u64 },
    RolledBack { deal_id: DealId },
    Created { deal_id: DealId },
    Updated { deal_id: DealId, revision: u64 },
    Deleted { deal_id: DealId },
    Error { operation: &'static str, error: BoardError },
}

#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub deals: Vec<Deal>,
    pub columns: BoardColumns,
    pub loaded: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pending: usize,
}

#[derive(Debug, Clone)]
struct Failure {
    operation: &'static str,
    message: String,
}

struct BoardState {
    deals: Vec<Deal>,
    log: MutationLog,
    issued_refreshes: u64,
    applied_refresh: u64,
    detached: bool,
    loaded: bool,
    last_refresh: Option<DateTime<Utc>>,
    last_error: Option<Failure>,
}

enum WriteJob {
    Move {
        mutation: MutationId,
        deal_id: DealId,
        target: StageId,
        reply: oneshot::Sender<Result<MoveOutcome, BoardError>>,
    },
    Create {
        draft: DealDraft,
        reply: oneshot::Sender<Result<Deal, BoardError>>,
    },
    Update {
        deal: Deal,
        reply: oneshot::Sender<Result<UpdateDealResponse, BoardError>>,
    },
    Delete {
        mutation: Option<MutationId>,
        deal_id: DealId,
        reply: oneshot::Sender<Result<(), BoardError>>,
    },
}

pub struct BoardController {
    api: Arc<dyn PipelineApi>,
    stages: Arc<StageRegistry>,
    state: Mutex<BoardState>,
    events: broadcast::Sender<BoardEvent>,
    writes: mpsc::UnboundedSender<WriteJob>,
}

impl BoardController {
    /// Creates the controller and its write worker. Must be called from
    /// within a tokio runtime.
    pub fn new(api: Arc<dyn PipelineApi>, stages: Arc<StageRegistry>) -> Arc<Self> {
        let (writes, jobs) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        Arc::new_cyclic(|controller: &Weak<Self>| {
            tokio::spawn(run_write_worker(controller.clone(), jobs));
            Self {
                api,
                stages,
                state: Mutex::new(BoardState {
                    deals: Vec::new(),
                    log: MutationLog::new(),
                    issued_refreshes: 0,
                    applied_refresh: 0,
                    detached: false,
                    loaded: false,
                    last_refresh: None,
                    last_error: None,
                }),
                events,
                writes,
            }
        })
    }

    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Loads the board once and keeps it fresh on [`AUTO_REFRESH_INTERVAL`].
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        if let Err(error) = self.refresh().await {
            warn!(%error, "initial board load failed");
        }
        self.spawn_auto_refresh(AUTO_REFRESH_INTERVAL)
    }

    /// Periodic refresh. The task stops once the controller is dropped or
    /// detached.
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                if controller.is_detached().await {
                    debug!("board detached; stopping auto refresh");
                    break;
                }
                if let Err(error) = controller.refresh().await {
                    debug!(%error, "auto refresh failed");
                }
            }
        })
    }

    /// Stops applying results. Any refresh still in flight is discarded when
    /// it lands.
    pub async fn detach(&self) {
        self.state.lock().await.detached = true;
    }

    pub async fn is_detached(&self) -> bool {
        self.state.lock().await.detached
    }

    pub async fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.lock().await;
        BoardSnapshot {
            columns: group_by_stage(&self.stages, &state.deals),
            deals: state.deals.clone(),
            loaded: state.loaded,
            last_refresh: state.last_refresh,
            last_error: state.last_error.as_ref().map(|failure| failure.message.clone()),
            pending: state.log.pending_count(),
        }
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.log.entries().cloned().collect()
    }

    /// Replaces the board with the store's rows, then re-applies optimistic
    /// edits those rows may predate. Results that land after a newer refresh
    /// was applied, or after [`detach`](Self::detach), are dropped.
    pub async fn refresh(&self) -> Result<(), BoardError> {
        let (epoch, since) = {
            let mut state = self.state.lock().await;
            state.issued_refreshes += 1;
            (state.issued_refreshes, state.log.mark())
        };

        let fetched = self.api.list_deals().await;

        let mut state = self.state.lock().await;
        if state.detached || epoch < state.applied_refresh {
            debug!(epoch, applied = state.applied_refresh, "discarding superseded refresh");
            return Ok(());
        }

        match fetched {
            Ok(mut deals) => {
                state.log.overlay(&mut deals, since);
                state.deals = deals;
                state.applied_refresh = epoch;
                state.loaded = true;
                state.last_refresh = Some(Utc::now());
                if state
                    .last_error
                    .as_ref()
                    .is_some_and(|failure| failure.operation == "refresh")
                {
                    state.last_error = None;
                }
                let count = state.deals.len();
                drop(state);
                debug!(count, epoch, "board refreshed");
                self.emit(BoardEvent::Refreshed { deals: count });
                Ok(())
            }
            Err(error) => {
                state.last_error = Some(Failure {
                    operation: "refresh",
                    message: error.to_string(),
                });
                drop(state);
                warn!(%error, "board refresh failed");
                self.emit(BoardEvent::Error {
                    operation: "refresh",
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Moves a deal to `target`, showing the change before the store confirms
    /// it. On failure the move is rolled back and the board reloaded.
    pub async fn move_deal(
        &self,
        deal_id: &DealId,
        target: StageId,
    ) -> Result<MoveOutcome, BoardError> {
        let mutation = {
            let mut state = self.state.lock().await;
            let Some(deal) = state.deals.iter_mut().find(|deal| &deal.id == deal_id) else {
                debug!(%deal_id, "move ignored: deal not on board");
                return Ok(MoveOutcome::Unchanged);
            };
            if deal.stage == target {
                return Ok(MoveOutcome::Unchanged);
            }
            let from = deal.stage;
            deal.stage = target;
            state.log.begin(MutationKind::Move {
                deal_id: deal_id.clone(),
                from,
                to: target,
            })
        };
        self.emit(BoardEvent::Moved {
            deal_id: deal_id.clone(),
            stage: target,
        });

        let (reply, outcome) = oneshot::channel();
        let job = WriteJob::Move {
            mutation,
            deal_id: deal_id.clone(),
            target,
            reply,
        };
        if self.writes.send(job).is_err() {
            self.roll_back(mutation).await;
            return Err(BoardError::QueueClosed);
        }
        outcome.await.map_err(|_| BoardError::QueueClosed)?
    }

    /// Stores a new deal. The board shows it after the follow-up refresh.
    pub async fn create_deal(&self, draft: DealDraft) -> Result<Deal, BoardError> {
        let (reply, created) = oneshot::channel();
        self.enqueue(WriteJob::Create { draft, reply })?;
        created.await.map_err(|_| BoardError::QueueClosed)?
    }

    /// Saves an edited record, then reloads the board.
    pub async fn update_deal(&self, deal: Deal) -> Result<UpdateDealResponse, BoardError> {
        let (reply, updated) = oneshot::channel();
        self.enqueue(WriteJob::Update { deal, reply })?;
        updated.await.map_err(|_| BoardError::QueueClosed)?
    }

    /// Removes a deal from the board right away, then from the store.
    pub async fn delete_deal(&self, deal_id: &DealId) -> Result<(), BoardError> {
        let mutation = {
            let mut state = self.state.lock().await;
            match state.deals.iter().position(|deal| &deal.id == deal_id) {
                Some(index) => {
                    let deal = state.deals.remove(index);
                    Some(state.log.begin(MutationKind::Delete { deal, index }))
                }
                None => None,
            }
        };

        let (reply, deleted) = oneshot::channel();
        let job = WriteJob::Delete {
            mutation,
            deal_id: deal_id.clone(),
            reply,
        };
        if self.writes.send(job).is_err() {
            if let Some(mutation) = mutation {
                self.roll_back(mutation).await;
            }
            return Err(BoardError::QueueClosed);
        }
        deleted.await.map_err(|_| BoardError::QueueClosed)?
    }

    fn enqueue(&self, job: WriteJob) -> Result<(), BoardError> {
        self.writes.send(job).map_err(|_| BoardError::QueueClosed)
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn execute(&self, job: WriteJob) {
        match job {
            WriteJob::Move {
                mutation,
                deal_id,
                target,
                reply,
            } => {
                let result = self.store_move(mutation, &deal_id, target).await;
                let _ = reply.send(result);
            }
            WriteJob::Create { draft, reply } => {
                let result = self.api.create_deal(&draft).await;
                match &result {
                    Ok(deal) => {
                        info!(deal_id = %deal.id, firm = %deal.firm_name, "deal created");
                        self.emit(BoardEvent::Created {
                            deal_id: deal.id.clone(),
                        });
                    }
                    Err(error) => self.record_failure("create", error).await,
                }
                let _ = self.refresh().await;
                let _ = reply.send(result);
            }
            WriteJob::Update { deal, reply } => {
                let result = self.api.update_deal(&deal).await;
                match &result {
                    Ok(response) => self.emit(BoardEvent::Updated {
                        deal_id: deal.id.clone(),
                        revision: response.revision,
                    }),
                    Err(error) => self.record_failure("update", error).await,
                }
                let _ = self.refresh().await;
                let _ = reply.send(result);
            }
            WriteJob::Delete {
                mutation,
                deal_id,
                reply,
            } => {
                let result = self.api.delete_deal(&deal_id).await;
                match &result {
                    Ok(()) => {
                        if let Some(mutation) = mutation {
                            self.state.lock().await.log.confirm(mutation, None);
                        }
                        info!(%deal_id, "deal deleted");
                        self.emit(BoardEvent::Deleted {
                            deal_id: deal_id.clone(),
                        });
                    }
                    Err(error) => {
                        if let Some(mutation) = mutation {
                            self.roll_back(mutation).await;
                        }
                        self.record_failure("delete", error).await;
                    }
                }
                let _ = self.refresh().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn store_move(
        &self,
        mutation: MutationId,
        deal_id: &DealId,
        target: StageId,
    ) -> Result<MoveOutcome, BoardError> {
        // Built now rather than at enqueue time so earlier writes' revisions
        // are carried forward.
        let record = {
            let state = self.state.lock().await;
            state.deals.iter().find(|deal| &deal.id == deal_id).cloned()
        };
        let result = match record {
            Some(mut record) => {
                record.stage = target;
                self.api.update_deal(&record).await
            }
            None => Err(ApiError::not_found(format!("Deal {deal_id} not found")).into()),
        };

        match result {
            Ok(response) => {
                {
                    let mut state = self.state.lock().await;
                    state.log.confirm(mutation, Some(response.revision));
                    if let Some(deal) = state.deals.iter_mut().find(|deal| &deal.id == deal_id) {
                        deal.revision = deal.revision.max(response.revision);
                    }
                }
                info!(%deal_id, stage = %target, revision = response.revision, "move confirmed");
                self.emit(BoardEvent::MoveConfirmed {
                    deal_id: deal_id.clone(),
                    revision: response.revision,
                });
                Ok(MoveOutcome::Moved {
                    revision: response.revision,
                })
            }
            Err(error) => {
                warn!(%deal_id, stage = %target, %error, "move failed; rolling back");
                self.roll_back(mutation).await;
                self.record_failure("move", &error).await;
                let _ = self.refresh().await;
                Err(error)
            }
        }
    }

    async fn roll_back(&self, mutation: MutationId) {
        let deal_id = {
            let mut state = self.state.lock().await;
            let Some(kind) = state.log.roll_back(mutation) else {
                return;
            };
            let deal_id = kind.deal_id().clone();
            match kind {
                MutationKind::Move { deal_id, from, to } => {
                    if let Some(deal) = state
                        .deals
                        .iter_mut()
                        .find(|deal| deal.id == deal_id && deal.stage == to)
                    {
                        deal.stage = from;
                    }
                }
                MutationKind::Delete { deal, index } => {
                    if !state.deals.iter().any(|row| row.id == deal.id) {
                        let index = index.min(state.deals.len());
                        state.deals.insert(index, deal);
                    }
                }
            }
            deal_id
        };
        self.emit(BoardEvent::RolledBack { deal_id });
    }

    async fn record_failure(&self, operation: &'static str, error: &BoardError) {
        self.state.lock().await.last_error = Some(Failure {
            operation,
            message: error.to_string(),
        });
        self.emit(BoardEvent::Error {
            operation,
            error: error.clone(),
        });
    }
}

async fn run_write_worker(
    controller: Weak<BoardController>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
) {
    while let Some(job) = jobs.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        controller.execute(job).await;
    }
    debug!("board write worker stopped");
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
