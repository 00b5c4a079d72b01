use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    BoardColumns, BoardController, BoardEvent, DropTarget, HttpPipelineClient, KanbanBoard,
    MoveOutcome,
};
use shared::{
    domain::{DealDraft, DealId},
    stages::StageRegistry,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deal-board", about = "Terminal view of the sales pipeline board")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board grouped by stage.
    Show,
    /// Drag a deal onto a stage column, e.g. `move 3 won`.
    Move { deal_id: String, stage: String },
    Create {
        firm_name: String,
        #[arg(long, default_value = "meeting-booked")]
        stage: String,
        #[arg(long)]
        value: Option<String>,
    },
    Delete { deal_id: String },
    /// Keep the board on screen, reprinting after every refresh.
    Watch {
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let client = HttpPipelineClient::new(&args.server_url)
        .with_context(|| format!("invalid server url '{}'", args.server_url))?;
    let controller = BoardController::new(Arc::new(client), Arc::new(StageRegistry::standard()));
    controller
        .refresh()
        .await
        .with_context(|| format!("failed to load pipeline from {}", args.server_url))?;

    match args.command {
        Command::Show => print_board(&controller.snapshot().await.columns),
        Command::Move { deal_id, stage } => {
            let mut board = KanbanBoard::new(controller.clone());
            board.drag_start(DealId::from(deal_id.as_str()));
            match board.drop_on(DropTarget::Column(stage.clone())).await? {
                Some(MoveOutcome::Moved { revision }) => {
                    println!("moved deal {deal_id} to {stage} (revision {revision})")
                }
                Some(MoveOutcome::Unchanged) => {
                    println!("deal {deal_id} is not on the board or already in {stage}")
                }
                None => bail!("unknown stage column '{stage}'"),
            }
        }
        Command::Create {
            firm_name,
            stage,
            value,
        } => {
            let mut draft = DealDraft::new(firm_name, stage);
            draft.value = value;
            let deal = controller.create_deal(draft).await?;
            println!("created deal {} for {} in {}", deal.id, deal.firm_name, deal.stage);
        }
        Command::Delete { deal_id } => {
            controller.delete_deal(&DealId::from(deal_id.as_str())).await?;
            println!("deleted deal {deal_id}");
        }
        Command::Watch { interval_secs } => watch(controller, interval_secs).await?,
    }

    Ok(())
}

async fn watch(controller: Arc<BoardController>, interval_secs: u64) -> Result<()> {
    let mut events = controller.subscribe();
    let refresher = controller.spawn_auto_refresh(Duration::from_secs(interval_secs.max(1)));
    print_board(&controller.snapshot().await.columns);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(BoardEvent::Refreshed { .. }) => {
                    let snapshot = controller.snapshot().await;
                    if let Some(at) = snapshot.last_refresh {
                        println!("\n-- refreshed {} --", at.format("%H:%M:%S"));
                    }
                    print_board(&snapshot.columns);
                }
                Ok(BoardEvent::Error { operation, error }) => warn!(operation, %error, "board error"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed board events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.detach().await;
    refresher.abort();
    Ok(())
}

fn print_board(columns: &BoardColumns) {
    println!("{} total deals", columns.total());
    for (label, group) in [("Pipeline", &columns.main), ("Auxiliary", &columns.auxiliary)] {
        println!("== {label} ==");
        for column in group {
            println!("{} ({})", column.stage.title, column.deals.len());
            for deal in &column.deals {
                let value = if deal.value.is_empty() {
                    String::new()
                } else {
                    format!(" {}", deal.value)
                };
                println!("  - {} [{}]{value}", deal.firm_name, deal.id);
            }
        }
    }
}
