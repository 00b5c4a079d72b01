use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use shared::{
    domain::{Deal, DealDraft, DealId},
    error::{ApiError, ErrorCode},
    protocol::{AckResponse, DealsResponse, StagesResponse, UpdateDealResponse},
    stages::Stage,
};
use tracing::{debug, warn};
use url::Url;

pub mod controller;
pub mod error;
pub mod kanban;
pub mod mutation;

pub use controller::{BoardController, BoardEvent, BoardSnapshot, MoveOutcome};
pub use error::BoardError;
pub use kanban::{group_by_stage, BoardColumns, DragState, DropTarget, KanbanBoard, MoveIntent};

/// Operations the board needs from the pipeline service.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    async fn list_deals(&self) -> Result<Vec<Deal>, BoardError>;
    async fn create_deal(&self, draft: &DealDraft) -> Result<Deal, BoardError>;
    async fn update_deal(&self, deal: &Deal) -> Result<UpdateDealResponse, BoardError>;
    async fn delete_deal(&self, id: &DealId) -> Result<(), BoardError>;
    async fn list_stages(&self) -> Result<Vec<Stage>, BoardError>;
}

pub struct HttpPipelineClient {
    http: Client,
    base_url: Url,
}

impl HttpPipelineClient {
    pub fn new(server_url: &str) -> Result<Self, BoardError> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self, BoardError> {
        let mut raw = server_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)
            .map_err(|err| BoardError::Transport(format!("invalid server url '{server_url}': {err}")))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BoardError> {
        self.base_url
            .join(path)
            .map_err(|err| BoardError::Transport(format!("invalid endpoint '{path}': {err}")))
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineClient {
    async fn list_deals(&self) -> Result<Vec<Deal>, BoardError> {
        let response = self.http.get(self.endpoint("api/pipeline")?).send().await?;
        let body: DealsResponse = checked(response).await?.json().await?;
        debug!(count = body.deals.len(), "fetched pipeline");
        Ok(body.deals)
    }

    async fn create_deal(&self, draft: &DealDraft) -> Result<Deal, BoardError> {
        let response = self
            .http
            .post(self.endpoint("api/pipeline")?)
            .json(draft)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    async fn update_deal(&self, deal: &Deal) -> Result<UpdateDealResponse, BoardError> {
        let response = self
            .http
            .put(self.endpoint("api/pipeline")?)
            .json(deal)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    async fn delete_deal(&self, id: &DealId) -> Result<(), BoardError> {
        let response = self
            .http
            .delete(self.endpoint("api/pipeline")?)
            .query(&[("id", id.as_str())])
            .send()
            .await?;
        let ack: AckResponse = checked(response).await?.json().await?;
        if !ack.success {
            return Err(ApiError::internal(format!("delete of deal {id} was not acknowledged")).into());
        }
        Ok(())
    }

    async fn list_stages(&self) -> Result<Vec<Stage>, BoardError> {
        let response = self.http.get(self.endpoint("api/stages")?).send().await?;
        let body: StagesResponse = checked(response).await?.json().await?;
        Ok(body.stages)
    }
}

/// Passes successful responses through and turns everything else into the
/// server's error envelope, synthesizing one when the body is not JSON.
async fn checked(response: Response) -> Result<Response, BoardError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let message = if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        };
        ApiError::new(code_for_status(status), message)
    });
    warn!(%status, code = ?error.code, message = %error.message, "pipeline request failed");
    Err(error.into())
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::CONFLICT => ErrorCode::Conflict,
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            ErrorCode::Validation
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ErrorCode::Unavailable
        }
        _ => ErrorCode::Internal,
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
