use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use server_api::{
    create_deal, delete_deal, export_firms_csv, firm_summary, firms_overview, list_deals,
    list_meetings, list_stages, meeting_metrics,
    summary::{FirmSummarizer, MissingSummarizer, OpenAiSummarizer, SummaryConfig},
    update_deal, ApiContext,
};
use sheets::{GoogleSheetsClient, ServiceAccount, SheetBackend};
use shared::{
    domain::{Deal, DealDraft, DealRecord, Meeting},
    error::{ApiError, ErrorCode},
    protocol::{
        AckResponse, DealsResponse, DeleteDealQuery, FirmQuery, FirmsOverview, MeetingMetrics,
        StagesResponse, SummaryQuery, SummaryResponse, UpdateDealResponse,
    },
    stages::StageRegistry,
};
use storage::{
    readers::{FIRMS_HEADER, MEETINGS_HEADER},
    DealStore, FirmStore, MeetingStore, SqliteSheet, PIPELINE_HEADER,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, normalize_database_url, Settings, StoreBackend};

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let backend = open_backend(&settings).await?;
    let api = build_context(&settings, backend)?;
    let app = build_router(Arc::new(AppState {
        api,
        max_body_bytes: settings.max_body_bytes,
    }));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, backend = ?settings.store_backend, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_backend(settings: &Settings) -> anyhow::Result<Arc<dyn SheetBackend>> {
    match settings.store_backend {
        StoreBackend::Google => {
            let spreadsheet_id = settings
                .spreadsheet_id
                .clone()
                .context("GOOGLE_SPREADSHEET_ID is not set")?;
            let email = settings
                .service_account_email
                .clone()
                .context("GOOGLE_SERVICE_ACCOUNT_EMAIL is not set")?;
            let key = settings
                .private_key
                .as_deref()
                .context("GOOGLE_PRIVATE_KEY is not set")?;

            let mut account = ServiceAccount::new(email, key);
            if let Some(token_uri) = &settings.token_uri {
                account = account.with_token_uri(token_uri.clone());
            }
            let client = GoogleSheetsClient::with_base_url(
                &settings.sheets_base_url,
                spreadsheet_id,
                Arc::new(account),
            )?;
            info!(base = %settings.sheets_base_url, "using google sheets store");
            Ok(Arc::new(client))
        }
        StoreBackend::Sqlite => {
            let database_url = normalize_database_url(&settings.database_url);
            let sheet = SqliteSheet::new(&database_url).await.map_err(|error| {
                error!(
                    %database_url,
                    %error,
                    "failed to open SQLite database; verify parent directory exists and permissions are correct"
                );
                error
            })?;
            sheet
                .ensure_sheet(&settings.pipeline_sheet, &PIPELINE_HEADER)
                .await?;
            sheet
                .ensure_sheet(&settings.meetings_sheet, &MEETINGS_HEADER)
                .await?;
            sheet.ensure_sheet(&settings.firms_sheet, &FIRMS_HEADER).await?;
            info!(%database_url, "using local sqlite sheet store");
            Ok(Arc::new(sheet))
        }
    }
}

fn build_context(settings: &Settings, backend: Arc<dyn SheetBackend>) -> anyhow::Result<ApiContext> {
    let stages = Arc::new(StageRegistry::standard());
    let summarizer: Arc<dyn FirmSummarizer> = match &settings.summary_api_key {
        Some(api_key) => Arc::new(OpenAiSummarizer::new(SummaryConfig {
            endpoint: settings.summary_endpoint.clone(),
            api_key: api_key.clone(),
            model: settings.summary_model.clone(),
            timeout_secs: settings.summary_timeout_secs,
        })?),
        None => {
            warn!("SUMMARY_API_KEY not set; firm summaries disabled");
            Arc::new(MissingSummarizer)
        }
    };

    Ok(ApiContext {
        deals: Arc::new(DealStore::with_sheet(
            backend.clone(),
            stages.clone(),
            settings.pipeline_sheet.clone(),
        )),
        meetings: Arc::new(MeetingStore::with_sheet(
            backend.clone(),
            settings.meetings_sheet.clone(),
        )),
        firms: Arc::new(FirmStore::with_sheet(backend, settings.firms_sheet.clone())),
        stages,
        summarizer,
    })
}

fn build_router(state: Arc<AppState>) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/pipeline",
            get(http_list_deals)
                .post(http_create_deal)
                .put(http_update_deal)
                .delete(http_delete_deal),
        )
        .route("/api/stages", get(http_list_stages))
        .route("/api/meetings", get(http_list_meetings))
        .route("/api/meetings/metrics", get(http_meeting_metrics))
        .route("/api/firms", get(http_firms_overview))
        .route("/api/firms/export", get(http_export_firms))
        .route("/api/firms/summary", get(http_firm_summary))
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(state)
}

fn api_failure(err: ApiError) -> HttpError {
    let status =
        StatusCode::from_u16(err.code.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err))
}

fn bad_request(message: impl Into<String>) -> HttpError {
    api_failure(ApiError::new(ErrorCode::Validation, message))
}

/// Keeps the extractor's status (400, 413, 415, 422) but answers with the
/// error envelope.
fn rejected(status: StatusCode, message: String) -> HttpError {
    (status, Json(ApiError::new(ErrorCode::Validation, message)))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_deals(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DealsResponse>, HttpError> {
    let deals = list_deals(&state.api).await.map_err(api_failure)?;
    Ok(Json(deals))
}

async fn http_create_deal(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DealDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Deal>), HttpError> {
    let Json(draft) = payload.map_err(|e| rejected(e.status(), e.body_text()))?;
    let deal = create_deal(&state.api, draft).await.map_err(api_failure)?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn http_update_deal(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DealRecord>, JsonRejection>,
) -> Result<Json<UpdateDealResponse>, HttpError> {
    let Json(record) = payload.map_err(|e| rejected(e.status(), e.body_text()))?;
    let response = update_deal(&state.api, record).await.map_err(api_failure)?;
    Ok(Json(response))
}

async fn http_delete_deal(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DeleteDealQuery>, QueryRejection>,
) -> Result<Json<AckResponse>, HttpError> {
    let Query(q) = query.map_err(|_| bad_request("id query parameter is required"))?;
    let response = delete_deal(&state.api, &q.id).await.map_err(api_failure)?;
    Ok(Json(response))
}

async fn http_list_stages(State(state): State<Arc<AppState>>) -> Json<StagesResponse> {
    Json(list_stages(&state.api))
}

async fn http_list_meetings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Meeting>>, HttpError> {
    let meetings = list_meetings(&state.api).await.map_err(api_failure)?;
    Ok(Json(meetings))
}

async fn http_meeting_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MeetingMetrics>, HttpError> {
    let metrics = meeting_metrics(&state.api, Utc::now())
        .await
        .map_err(api_failure)?;
    Ok(Json(metrics))
}

async fn http_firms_overview(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FirmQuery>, QueryRejection>,
) -> Result<Json<FirmsOverview>, HttpError> {
    let Query(q) = query.map_err(|e| bad_request(e.body_text()))?;
    let overview = firms_overview(&state.api, &q).await.map_err(api_failure)?;
    Ok(Json(overview))
}

async fn http_export_firms(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FirmQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Query(q) = query.map_err(|e| bad_request(e.body_text()))?;
    let csv = export_firms_csv(&state.api, &q).await.map_err(api_failure)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"firms.csv\""),
        ],
        csv,
    ))
}

async fn http_firm_summary(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> Result<Json<SummaryResponse>, HttpError> {
    let Query(q) = query.map_err(|_| bad_request("name query parameter is required"))?;
    let summary = firm_summary(&state.api, &q.name).await.map_err(api_failure)?;
    Ok(Json(summary))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
