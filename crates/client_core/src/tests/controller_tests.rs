use super::*;
use crate::{
    mutation::MutationStatus,
    test_support::{deal, FakePipeline},
};
use std::sync::atomic::Ordering;
use tokio::sync::Notify;

fn controller_for(api: Arc<FakePipeline>) -> Arc<BoardController> {
    BoardController::new(api, Arc::new(StageRegistry::standard()))
}

async fn stage_on_board(controller: &BoardController, id: &str) -> Option<StageId> {
    controller
        .snapshot()
        .await
        .deals
        .iter()
        .find(|deal| deal.id.as_str() == id)
        .map(|deal| deal.stage)
}

async fn next_event(events: &mut broadcast::Receiver<BoardEvent>) -> BoardEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event in time")
        .expect("event")
}

fn acme() -> Deal {
    deal("3", "Acme Capital", StageId::MeetingBooked)
}

#[tokio::test]
async fn acme_move_is_visible_before_the_store_confirms() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]).gated_updates(gate.clone()));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let mut events = controller.subscribe();
    let mover = tokio::spawn({
        let controller = controller.clone();
        async move { controller.move_deal(&DealId::from("3"), StageId::Won).await }
    });

    assert_eq!(
        next_event(&mut events).await,
        BoardEvent::Moved {
            deal_id: DealId::from("3"),
            stage: StageId::Won
        }
    );
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.pending, 1);
    assert_eq!(stage_on_board(&controller, "3").await, Some(StageId::Won));
    let won = snapshot.columns.column(StageId::Won).expect("won column");
    assert_eq!(won.deals.len(), 1);

    gate.notify_one();
    let outcome = mover.await.expect("join").expect("move");
    assert_eq!(outcome, MoveOutcome::Moved { revision: 2 });

    let updates = api.updates.lock().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].stage, StageId::Won);
    assert_eq!(updates[0].firm_name, "Acme Capital");
    assert_eq!(updates[0].revision, 1);

    let mutations = controller.mutations().await;
    assert_eq!(mutations[0].status, MutationStatus::Confirmed);
    assert_eq!(mutations[0].revision, Some(2));
    assert_eq!(controller.snapshot().await.pending, 0);
}

#[tokio::test]
async fn acme_move_reverts_when_the_store_fails() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    api.fail_updates.store(true, Ordering::SeqCst);
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");
    let mut events = controller.subscribe();

    let err = controller
        .move_deal(&DealId::from("3"), StageId::Won)
        .await
        .expect_err("store down");
    assert_eq!(err.code(), Some(shared::error::ErrorCode::Unavailable));

    assert_eq!(
        stage_on_board(&controller, "3").await,
        Some(StageId::MeetingBooked)
    );
    let snapshot = controller.snapshot().await;
    assert!(snapshot.last_error.is_some());
    assert_eq!(snapshot.pending, 0);
    assert_eq!(
        controller.mutations().await[0].status,
        MutationStatus::RolledBack
    );
    assert_eq!(api.updates.lock().await[0].stage, StageId::Won);

    let mut saw_error = false;
    let mut saw_rollback = false;
    while let Ok(event) = events.try_recv() {
        match event {
            BoardEvent::Error { operation, .. } => saw_error |= operation == "move",
            BoardEvent::RolledBack { deal_id } => saw_rollback |= deal_id.as_str() == "3",
            _ => {}
        }
    }
    assert!(saw_error && saw_rollback);
}

#[tokio::test]
async fn failed_move_settles_on_what_the_store_holds() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    // Someone else moved the deal in the meantime and our write fails.
    api.set_stage("3", StageId::NdaSigned).await;
    api.fail_updates.store(true, Ordering::SeqCst);

    controller
        .move_deal(&DealId::from("3"), StageId::Won)
        .await
        .expect_err("fails");

    assert_eq!(
        stage_on_board(&controller, "3").await,
        api.stage_of("3").await
    );
    assert_eq!(
        stage_on_board(&controller, "3").await,
        Some(StageId::NdaSigned)
    );
}

#[tokio::test]
async fn repeated_move_to_the_same_stage_writes_once() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let first = controller
        .move_deal(&DealId::from("3"), StageId::NdaConsidering)
        .await
        .expect("first");
    let second = controller
        .move_deal(&DealId::from("3"), StageId::NdaConsidering)
        .await
        .expect("second");

    assert!(matches!(first, MoveOutcome::Moved { .. }));
    assert_eq!(second, MoveOutcome::Unchanged);
    assert_eq!(api.updates.lock().await.len(), 1);
    assert_eq!(
        stage_on_board(&controller, "3").await,
        Some(StageId::NdaConsidering)
    );
}

#[tokio::test]
async fn moving_an_unknown_deal_is_a_no_op() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let outcome = controller
        .move_deal(&DealId::from("missing"), StageId::Won)
        .await
        .expect("no-op");
    assert_eq!(outcome, MoveOutcome::Unchanged);
    assert!(api.updates.lock().await.is_empty());
    assert!(controller.mutations().await.is_empty());
}

#[tokio::test]
async fn consecutive_moves_carry_the_confirmed_revision_forward() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let id = DealId::from("3");
    let (first, second) = tokio::join!(
        controller.move_deal(&id, StageId::ActiveConversation),
        controller.move_deal(&id, StageId::NdaConsidering),
    );
    assert_eq!(first.expect("first"), MoveOutcome::Moved { revision: 2 });
    assert_eq!(second.expect("second"), MoveOutcome::Moved { revision: 3 });

    let updates = api.updates.lock().await;
    assert_eq!(updates[0].stage, StageId::ActiveConversation);
    assert_eq!(updates[1].stage, StageId::NdaConsidering);
    assert_eq!(updates[1].revision, 2);
    assert_eq!(api.stage_of("3").await, Some(StageId::NdaConsidering));
}

#[tokio::test]
async fn refresh_during_a_pending_move_keeps_the_optimistic_stage() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]).gated_updates(gate.clone()));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let mut events = controller.subscribe();
    let mover = tokio::spawn({
        let controller = controller.clone();
        async move { controller.move_deal(&DealId::from("3"), StageId::Won).await }
    });
    next_event(&mut events).await;

    controller.refresh().await.expect("refresh while pending");
    assert_eq!(stage_on_board(&controller, "3").await, Some(StageId::Won));

    gate.notify_one();
    mover.await.expect("join").expect("move");
    controller.refresh().await.expect("refresh after");
    assert_eq!(stage_on_board(&controller, "3").await, Some(StageId::Won));
    assert_eq!(controller.snapshot().await.deals[0].revision, 2);
}

#[tokio::test]
async fn bridge_partners_appears_after_create() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let created = controller
        .create_deal(DealDraft::new("Bridge Partners", "active-conversation"))
        .await
        .expect("create");
    assert_eq!(created.value, "");
    assert_eq!(created.contact_count, 0);

    let snapshot = controller.snapshot().await;
    let column = snapshot
        .columns
        .column(StageId::ActiveConversation)
        .expect("column");
    assert_eq!(column.deals.len(), 1);
    assert_eq!(column.deals[0].firm_name, "Bridge Partners");
    assert_eq!(snapshot.deals.len(), 2);
}

#[tokio::test]
async fn deleting_deal_five_twice_reports_not_found_and_keeps_the_rest() {
    let firms = ["Alder", "Birch", "Cedar", "Dogwood", "Elm", "Fir"];
    let deals = firms
        .iter()
        .enumerate()
        .map(|(i, firm)| deal(&(i + 1).to_string(), firm, StageId::MeetingBooked))
        .collect();
    let api = Arc::new(FakePipeline::with_deals(deals));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let id = DealId::from("5");
    controller.delete_deal(&id).await.expect("first delete");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.deals.len(), 5);
    assert!(snapshot.deals.iter().all(|deal| deal.id != id));

    let err = controller.delete_deal(&id).await.expect_err("second delete");
    assert!(err.is_not_found());
    assert_eq!(api.deals.lock().await.len(), 5);
    assert_eq!(controller.snapshot().await.deals.len(), 5);
}

#[tokio::test]
async fn failed_delete_puts_the_deal_back() {
    let api = Arc::new(FakePipeline::with_deals(vec![
        deal("1", "Alder", StageId::Won),
        deal("2", "Birch", StageId::NotNow),
    ]));
    api.fail_deletes.store(true, Ordering::SeqCst);
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    controller
        .delete_deal(&DealId::from("1"))
        .await
        .expect_err("store down");

    let ids: Vec<_> = controller
        .snapshot()
        .await
        .deals
        .iter()
        .map(|deal| deal.id.to_string())
        .collect();
    assert_eq!(ids, ["1", "2"]);
    assert_eq!(
        controller.mutations().await[0].status,
        MutationStatus::RolledBack
    );
}

#[tokio::test]
async fn refresh_landing_after_detach_is_discarded() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let gate = Arc::new(Notify::new());
    api.gate_next_list(gate.clone()).await;
    let controller = controller_for(api.clone());

    let refresh = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh().await }
    });
    while api.list_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    controller.detach().await;
    gate.notify_one();
    refresh.await.expect("join").expect("refresh");

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.loaded);
    assert!(snapshot.deals.is_empty());
}

#[tokio::test]
async fn older_refresh_does_not_overwrite_a_newer_one() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let gate = Arc::new(Notify::new());
    api.gate_next_list(gate.clone()).await;
    let controller = controller_for(api.clone());

    let slow = tokio::spawn({
        let controller = controller.clone();
        async move { controller.refresh().await }
    });
    while api.list_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    api.set_stage("3", StageId::Won).await;
    controller.refresh().await.expect("fast refresh");
    gate.notify_one();
    slow.await.expect("join").expect("slow refresh");

    assert_eq!(stage_on_board(&controller, "3").await, Some(StageId::Won));
}

#[tokio::test]
async fn refresh_failure_is_recorded_and_cleared_by_the_next_success() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    api.fail_lists.store(true, Ordering::SeqCst);
    let controller = controller_for(api.clone());

    assert!(controller.refresh().await.is_err());
    let snapshot = controller.snapshot().await;
    assert!(!snapshot.loaded);
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|message| message.contains("sheet offline")));

    api.fail_lists.store(false, Ordering::SeqCst);
    controller.refresh().await.expect("refresh");
    let snapshot = controller.snapshot().await;
    assert!(snapshot.loaded);
    assert!(snapshot.last_error.is_none());
    assert!(snapshot.last_refresh.is_some());
}

#[tokio::test]
async fn auto_refresh_picks_up_remote_changes_until_detached() {
    let api = Arc::new(FakePipeline::with_deals(vec![acme()]));
    let controller = controller_for(api.clone());
    controller.refresh().await.expect("refresh");

    let handle = controller.spawn_auto_refresh(Duration::from_millis(10));
    api.set_stage("3", StageId::DocumentsUploaded).await;

    let mut events = controller.subscribe();
    loop {
        if let BoardEvent::Refreshed { .. } = next_event(&mut events).await {
            break;
        }
    }
    assert_eq!(
        stage_on_board(&controller, "3").await,
        Some(StageId::DocumentsUploaded)
    );

    controller.detach().await;
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("auto refresh stops")
        .expect("join");
}
