use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sheets::{GoogleSheetsClient, ServiceAccount, SheetBackend, SheetRange};
use shared::{domain::DealDraft, stages::StageRegistry};
use storage::{
    readers::{FIRMS_HEADER, FIRMS_SHEET, MEETINGS_HEADER, MEETINGS_SHEET},
    DealStore, SqliteSheet, PIPELINE_HEADER,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/deal_desk.db")]
    database_url: String,
    /// Work against a Google spreadsheet instead of the local store. Service
    /// account credentials come from GOOGLE_SERVICE_ACCOUNT_EMAIL and
    /// GOOGLE_PRIVATE_KEY.
    #[arg(long)]
    spreadsheet_id: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write sample pipeline, meetings and firms rows.
    Seed,
    /// Give every pipeline row without a stored id a fresh one.
    BackfillIds,
    ListDeals,
}

const SAMPLE_DEALS: &[(&str, &str, &str)] = &[
    ("Acme Capital", "Meeting Booked", "50000"),
    ("Bridge Partners", "Active Conversation", ""),
    ("Cobalt Wealth", "NDA (Signed)", "125000"),
    ("Dunmore Advisors", "Won", "80000"),
    ("Eastfield Trust", "Not Now", ""),
];

const SAMPLE_MEETINGS: &[[&str; 4]] = &[
    ["2024-05-06", "Intro call", "Meeting Booked", "Sam"],
    ["2024-05-08 14:30", "Diligence review", "NDA (Signed)", "Alex"],
];

const SAMPLE_FIRMS: &[[&str; 3]] = &[
    ["Acme Capital", "5/6/2024", "300"],
    ["Bridge Partners", "5/8/2024", "120"],
    ["Acme Capital", "6/1/2024", "320"],
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let backend = open_backend(&cli).await?;
    let deals = DealStore::new(backend.clone(), Arc::new(StageRegistry::standard()));

    match cli.command {
        Command::Seed => {
            for (firm, stage, value) in SAMPLE_DEALS {
                let mut draft = DealDraft::new(*firm, *stage);
                draft.value = Some((*value).to_string());
                let deal = deals.create_deal(draft).await?;
                println!("created deal {} ({})", deal.id, deal.firm_name);
            }
            let meetings = SheetRange::new(MEETINGS_SHEET, 'A', 'D', 2);
            append_rows(backend.as_ref(), &meetings, SAMPLE_MEETINGS).await?;
            let firms = SheetRange::new(FIRMS_SHEET, 'A', 'C', 2);
            append_rows(backend.as_ref(), &firms, SAMPLE_FIRMS).await?;
            println!(
                "seeded {} deals, {} meetings, {} firm bookings",
                SAMPLE_DEALS.len(),
                SAMPLE_MEETINGS.len(),
                SAMPLE_FIRMS.len()
            );
        }
        Command::BackfillIds => {
            let updated = deals.backfill_ids().await?;
            println!("assigned ids to {updated} rows");
        }
        Command::ListDeals => {
            for deal in deals.list_deals().await? {
                println!(
                    "{}\t{}\t{}\t{}\trev {}",
                    deal.id, deal.firm_name, deal.stage, deal.value, deal.revision
                );
            }
        }
    }

    Ok(())
}

async fn open_backend(cli: &Cli) -> Result<Arc<dyn SheetBackend>> {
    if let Some(spreadsheet_id) = &cli.spreadsheet_id {
        let email = std::env::var("GOOGLE_SERVICE_ACCOUNT_EMAIL")
            .context("GOOGLE_SERVICE_ACCOUNT_EMAIL is not set")?;
        let key = std::env::var("GOOGLE_PRIVATE_KEY")
            .context("GOOGLE_PRIVATE_KEY is not set")?
            .replace("\\n", "\n");
        let account = ServiceAccount::new(email, &key);
        info!(%spreadsheet_id, "using google sheets store");
        let client = GoogleSheetsClient::new(spreadsheet_id.clone(), Arc::new(account))?;
        return Ok(Arc::new(client));
    }

    let sheet = SqliteSheet::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;
    sheet.ensure_sheet(storage::deals::PIPELINE_SHEET, &PIPELINE_HEADER).await?;
    sheet.ensure_sheet(MEETINGS_SHEET, &MEETINGS_HEADER).await?;
    sheet.ensure_sheet(FIRMS_SHEET, &FIRMS_HEADER).await?;
    info!(database_url = %cli.database_url, "using local sqlite sheet store");
    Ok(Arc::new(sheet))
}

async fn append_rows<const N: usize>(
    backend: &dyn SheetBackend,
    range: &SheetRange,
    rows: &[[&str; N]],
) -> Result<()> {
    for row in rows {
        let cells: Vec<String> = row.iter().map(|cell| (*cell).to_string()).collect();
        backend
            .append_row(range, &cells)
            .await
            .with_context(|| format!("failed to append to {}", range.sheet))?;
    }
    Ok(())
}
