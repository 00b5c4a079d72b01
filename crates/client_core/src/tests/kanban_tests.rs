use super::*;
use crate::test_support::{deal, FakePipeline};

fn registry() -> StageRegistry {
    StageRegistry::standard()
}

#[test]
fn grouping_is_a_partition_of_the_input() {
    let stages = [
        StageId::MeetingBooked,
        StageId::Won,
        StageId::NotNow,
        StageId::MeetingBooked,
        StageId::NotInterested,
        StageId::ContractNegotiations,
        StageId::ExploringOtherOptions,
    ];
    let deals: Vec<Deal> = stages
        .iter()
        .enumerate()
        .map(|(i, stage)| deal(&i.to_string(), &format!("Firm {i}"), *stage))
        .collect();

    let columns = group_by_stage(&registry(), &deals);
    assert_eq!(columns.main.len(), 7);
    assert_eq!(columns.auxiliary.len(), 3);
    assert_eq!(columns.total(), deals.len());

    let mut seen: Vec<String> = columns
        .iter()
        .flat_map(|column| column.deals.iter().map(|deal| deal.id.to_string()))
        .collect();
    seen.sort();
    let mut expected: Vec<String> = deals.iter().map(|deal| deal.id.to_string()).collect();
    expected.sort();
    assert_eq!(seen, expected);

    for column in columns.iter() {
        assert!(column.deals.iter().all(|deal| deal.stage == column.stage.id));
    }
    let booked = columns.column(StageId::MeetingBooked).expect("column");
    assert_eq!(booked.deals.len(), 2);
    assert_eq!(booked.deals[0].id.as_str(), "0");
}

#[test]
fn empty_board_still_has_every_column() {
    let columns = group_by_stage(&registry(), &[]);
    assert_eq!(columns.iter().count(), 10);
    assert_eq!(columns.total(), 0);
    assert_eq!(columns.auxiliary[0].stage.title, "Not Now");
}

#[test]
fn drop_on_a_known_column_yields_an_intent() {
    let mut drag = DragState::default();
    drag.drag_start(DealId::from("3"));
    let intent = drag.drop_on(&registry(), &DropTarget::Column("won".into()));
    assert_eq!(
        intent,
        Some(MoveIntent {
            deal_id: DealId::from("3"),
            target: StageId::Won
        })
    );
}

#[test]
fn drops_outside_or_on_unknown_columns_do_nothing() {
    let registry = registry();
    let mut drag = DragState::default();
    drag.drag_start(DealId::from("3"));
    assert_eq!(drag.drop_on(&registry, &DropTarget::Outside), None);
    assert_eq!(
        drag.drop_on(&registry, &DropTarget::Column("Won".into())),
        None
    );
    assert_eq!(
        drag.drop_on(&registry, &DropTarget::Column("lost".into())),
        None
    );

    drag.drag_end();
    assert!(drag.active().is_none());
    assert_eq!(
        drag.drop_on(&registry, &DropTarget::Column("won".into())),
        None
    );
}

#[tokio::test]
async fn board_dispatches_drops_to_the_controller() {
    let api = Arc::new(FakePipeline::with_deals(vec![deal(
        "3",
        "Acme Capital",
        StageId::MeetingBooked,
    )]));
    let controller = BoardController::new(api.clone(), Arc::new(registry()));
    controller.refresh().await.expect("refresh");
    let mut board = KanbanBoard::new(controller);

    board.drag_start(DealId::from("3"));
    assert!(board.dragging().is_some());
    let outcome = board
        .drop_on(DropTarget::Column("won".into()))
        .await
        .expect("drop");
    assert!(matches!(outcome, Some(MoveOutcome::Moved { .. })));
    assert!(board.dragging().is_none());

    let columns = board.columns().await;
    assert_eq!(columns.column(StageId::Won).map(|c| c.deals.len()), Some(1));
    assert_eq!(api.stage_of("3").await, Some(StageId::Won));

    board.drag_start(DealId::from("3"));
    let outcome = board.drop_on(DropTarget::Outside).await.expect("drop");
    assert_eq!(outcome, None);
    assert!(board.dragging().is_none());

    board.drag_start(DealId::from("3"));
    board.cancel_drag();
    assert!(board.dragging().is_none());
    assert_eq!(api.updates.lock().await.len(), 1);
}
