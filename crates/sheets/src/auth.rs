//! Bearer tokens for the Sheets API via a Google service account.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::SheetError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, SheetError>;
}

/// A fixed token, for local proxies and tests.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, SheetError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub(crate) iss: String,
    pub(crate) scope: String,
    pub(crate) aud: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct ServiceAccount {
    http: Client,
    client_email: String,
    private_key_pem: String,
    token_uri: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccount {
    /// `private_key` may carry literal `\n` sequences, as it does when pasted
    /// into an environment variable.
    pub fn new(client_email: impl Into<String>, private_key: &str) -> Self {
        Self {
            http: Client::new(),
            client_email: client_email.into(),
            private_key_pem: private_key.replace("\\n", "\n"),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub(crate) fn claims(&self, now: DateTime<Utc>) -> AssertionClaims {
        AssertionClaims {
            iss: self.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ASSERTION_TTL_SECS)).timestamp(),
        }
    }

    pub(crate) fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, SheetError> {
        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .map_err(|e| SheetError::Auth(format!("invalid service account key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &self.claims(now), &key)
            .map_err(|e| SheetError::Auth(format!("failed to sign assertion: {e}")))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, SheetError> {
        let assertion = self.signed_assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        info!(
            client_email = %self.client_email,
            expires_in = body.expires_in,
            "sheets: service account token issued"
        );
        Ok(CachedToken {
            token: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccount {
    async fn access_token(&self) -> Result<String, SheetError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(token.token.clone());
            }
            debug!("sheets: cached token near expiry, refreshing");
        }

        let fresh = self.exchange(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
