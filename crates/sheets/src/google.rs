//! Google Sheets v4 `values` API client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::{first_row_of_a1, AccessTokenProvider, SheetBackend, SheetError, SheetRange};

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    major_dimension: &'static str,
    values: [&'a [String]; 1],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
}

pub struct GoogleSheetsClient {
    http: Client,
    base_url: Url,
    spreadsheet_id: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GoogleSheetsClient {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, SheetError> {
        Self::with_base_url(DEFAULT_SHEETS_BASE_URL, spreadsheet_id, tokens)
    }

    pub fn with_base_url(
        base_url: &str,
        spreadsheet_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, SheetError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SheetError::Unavailable(format!("invalid sheets base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SheetError::Unavailable(format!(
                "sheets base url cannot be a base: {base_url}"
            )));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            spreadsheet_id: spreadsheet_id.into(),
            tokens,
        })
    }

    fn values_url(&self, target: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", &self.spreadsheet_id, "values", target]);
        }
        url
    }

    async fn checked(response: Response, target: &str) -> Result<Response, SheetError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = classify_failure(status, &body);
        warn!(%status, target, error = %err, "sheets: request failed");
        Err(err)
    }
}

/// Maps a failed Sheets API response onto the error taxonomy.
pub fn classify_failure(status: StatusCode, body: &str) -> SheetError {
    let message = serde_json::from_str::<GoogleErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    match status {
        StatusCode::UNAUTHORIZED => SheetError::Auth(message),
        StatusCode::FORBIDDEN => SheetError::PermissionDenied(message),
        StatusCode::NOT_FOUND => SheetError::RangeNotFound(message),
        StatusCode::BAD_REQUEST if message.contains("Unable to parse range") => {
            SheetError::RangeNotFound(message)
        }
        StatusCode::TOO_MANY_REQUESTS => SheetError::Unavailable(message),
        s if s.is_server_error() => SheetError::Unavailable(message),
        _ => SheetError::Rejected(message),
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetBackend for GoogleSheetsClient {
    async fn read_rows(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, SheetError> {
        let a1 = range.a1();
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.values_url(&a1))
            .query(&[("majorDimension", "ROWS")])
            .bearer_auth(token)
            .send()
            .await?;
        let body: ValueRange = Self::checked(response, &a1).await?.json().await?;

        let rows: Vec<Vec<String>> = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        debug!(range = %a1, rows = rows.len(), "sheets: read rows");
        Ok(rows)
    }

    async fn write_row(
        &self,
        range: &SheetRange,
        row: u32,
        cells: &[String],
    ) -> Result<(), SheetError> {
        let a1 = range.row_a1(row);
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .put(self.values_url(&a1))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&ValueRangeBody {
                range: Some(&a1),
                major_dimension: "ROWS",
                values: [cells],
            })
            .send()
            .await?;
        Self::checked(response, &a1).await?;
        info!(range = %a1, "sheets: row written");
        Ok(())
    }

    async fn append_row(&self, range: &SheetRange, cells: &[String]) -> Result<u32, SheetError> {
        let a1 = range.a1();
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(self.values_url(&format!("{a1}:append")))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&ValueRangeBody {
                range: None,
                major_dimension: "ROWS",
                values: [cells],
            })
            .send()
            .await?;
        let body: AppendResponse = Self::checked(response, &a1).await?.json().await?;

        let row = first_row_of_a1(&body.updates.updated_range).ok_or_else(|| {
            SheetError::Decode(format!(
                "append returned unparsable range {}",
                body.updates.updated_range
            ))
        })?;
        info!(range = %body.updates.updated_range, row, "sheets: row appended");
        Ok(row)
    }

    async fn clear_row(&self, range: &SheetRange, row: u32) -> Result<(), SheetError> {
        let a1 = range.row_a1(row);
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(self.values_url(&format!("{a1}:clear")))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::checked(response, &a1).await?;
        info!(range = %a1, "sheets: row cleared");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/google_tests.rs"]
mod tests;
