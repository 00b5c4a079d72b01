use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use shared::{
    domain::{Deal, DealDraft, DealId, DealRecord, Meeting},
    error::{ApiError, ErrorCode},
    protocol::{
        AckResponse, DealsResponse, FirmQuery, FirmsOverview, MeetingMetrics, StagesResponse,
        SummaryResponse, UpdateDealResponse,
    },
    stages::StageRegistry,
};
use storage::{DealStore, DealUpdate, FirmStore, MeetingStore, StoreError};
use tracing::{error, info, warn};

pub mod dates;
pub mod firms;
pub mod summary;

use summary::{FirmSummarizer, SummaryError};

#[derive(Clone)]
pub struct ApiContext {
    pub deals: Arc<DealStore>,
    pub meetings: Arc<MeetingStore>,
    pub firms: Arc<FirmStore>,
    pub stages: Arc<StageRegistry>,
    pub summarizer: Arc<dyn FirmSummarizer>,
}

pub async fn list_deals(ctx: &ApiContext) -> Result<DealsResponse, ApiError> {
    let deals = ctx.deals.list_deals().await.map_err(store_error)?;
    Ok(DealsResponse { deals })
}

pub async fn create_deal(ctx: &ApiContext, draft: DealDraft) -> Result<Deal, ApiError> {
    ctx.deals.create_deal(draft).await.map_err(store_error)
}

/// Full-record replace. A non-zero `revision` must match the stored one.
/// Unknown stage labels fall back to the default stage.
pub async fn update_deal(
    ctx: &ApiContext,
    record: DealRecord,
) -> Result<UpdateDealResponse, ApiError> {
    if record.id.as_str().trim().is_empty() {
        return Err(ApiError::validation("deal id is required"));
    }
    let stage = ctx.stages.canonicalize(&record.stage);
    if !ctx.stages.is_known(&record.stage) {
        warn!(deal = %record.id, label = %record.stage, default = %stage, "api: unknown stage on update, defaulting");
    }
    let deal = record.into_deal(stage);
    let updated = ctx
        .deals
        .update_deal(DealUpdate::checked(deal))
        .await
        .map_err(store_error)?;
    Ok(UpdateDealResponse {
        success: true,
        revision: updated.revision,
    })
}

pub async fn delete_deal(ctx: &ApiContext, id: &str) -> Result<AckResponse, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::validation("deal id is required"));
    }
    ctx.deals
        .delete_deal(&DealId::from(id))
        .await
        .map_err(store_error)?;
    Ok(AckResponse { success: true })
}

pub fn list_stages(ctx: &ApiContext) -> StagesResponse {
    StagesResponse {
        stages: ctx.stages.stages().to_vec(),
    }
}

pub async fn list_meetings(ctx: &ApiContext) -> Result<Vec<Meeting>, ApiError> {
    ctx.meetings.list_meetings().await.map_err(store_error)
}

pub async fn meeting_metrics(
    ctx: &ApiContext,
    now: DateTime<Utc>,
) -> Result<MeetingMetrics, ApiError> {
    let meetings = list_meetings(ctx).await?;
    Ok(compute_meeting_metrics(&meetings, now))
}

/// Counts meetings since Monday 00:00 UTC of `now`'s week. Meetings with
/// unparsable dates only count toward the all-time total.
pub fn compute_meeting_metrics(meetings: &[Meeting], now: DateTime<Utc>) -> MeetingMetrics {
    let week_start = dates::week_start(now);
    let week_start_at = week_start.and_time(NaiveTime::MIN);
    let parsed: Vec<_> = meetings
        .iter()
        .filter_map(|m| dates::parse_sheet_datetime(&m.date))
        .collect();

    MeetingMetrics {
        this_week: parsed.iter().filter(|at| **at >= week_start_at).count(),
        week_start,
        today: now.date_naive(),
        all_time: meetings.len(),
        earliest: parsed.iter().min().map(|at| at.date()),
    }
}

pub async fn firms_overview(ctx: &ApiContext, query: &FirmQuery) -> Result<FirmsOverview, ApiError> {
    let bookings = ctx.firms.list_bookings().await.map_err(store_error)?;
    Ok(firms::overview(&bookings, query))
}

pub async fn export_firms_csv(ctx: &ApiContext, query: &FirmQuery) -> Result<String, ApiError> {
    let columns = firms::parse_columns(query.columns.as_deref()).map_err(ApiError::validation)?;
    let overview = firms_overview(ctx, query).await?;
    info!(rows = overview.firms.len(), columns = columns.len(), "api: firms exported");
    Ok(firms::export_csv(&overview.firms, &columns))
}

pub async fn firm_summary(ctx: &ApiContext, name: &str) -> Result<SummaryResponse, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("firm name is required"));
    }
    let summary = ctx.summarizer.summarize(name).await.map_err(|err| match err {
        SummaryError::NotConfigured => ApiError::new(ErrorCode::Unavailable, err.to_string()),
        other => {
            warn!(firm = name, error = %other, "api: firm summary failed");
            ApiError::new(ErrorCode::Unavailable, other.to_string())
        }
    })?;
    Ok(SummaryResponse { summary })
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(id) => ApiError::not_found(format!("Deal {id} not found")),
        StoreError::Conflict { .. } => ApiError::new(ErrorCode::Conflict, err.to_string()),
        StoreError::Validation(message) => ApiError::validation(message),
        StoreError::PermissionDenied(message) => {
            warn!(%message, "api: spreadsheet permission denied");
            ApiError::new(
                ErrorCode::Forbidden,
                "Permission denied. Make sure the service account has access to the spreadsheet.",
            )
        }
        StoreError::Schema(sheet) => ApiError::new(
            ErrorCode::SchemaMismatch,
            format!(
                "Sheet \"{sheet}\" not found. Make sure you have a sheet named \"{sheet}\" in your spreadsheet."
            ),
        ),
        StoreError::Unavailable(message) => {
            error!(%message, "api: store unavailable");
            ApiError::new(ErrorCode::Unavailable, message)
        }
        StoreError::Write(message) => {
            error!(%message, "api: store rejected write");
            ApiError::internal(message)
        }
    }
}
