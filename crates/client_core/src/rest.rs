//! HTTP adapters for a GoTrue/PostgREST-style backend: a password-grant
//! auth endpoint plus a table resource at `rest/v1/leads`.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use shared::{
    domain::{LeadId, LeadStatus},
    error::{ApiException, ErrorCode},
    protocol::{Credentials, LeadRecord, NewLead, StatusPatch},
};
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

use crate::{LeadDataService, SessionProvider};

const LEADS_PATH: &str = "rest/v1/leads";

/// Shared connection state: one HTTP client, the project base URL, the
/// public API key, and the bearer token of the current session (if any).
#[derive(Debug)]
pub struct RestConnection {
    http: Client,
    base_url: Url,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestConnection {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Arc<Self>> {
        let mut base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid base url '{base_url}'"))?;
        // Url::join replaces the last path segment unless the base ends
        // with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Arc::new(Self {
            http: Client::new(),
            base_url,
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        }))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    async fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("apikey", &self.api_key);
        match self.access_token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        status if status.is_client_error() => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}

/// Extracts the collaborator's own description from an error response so
/// it can surface to the user verbatim.
async fn into_remote_error(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<RemoteErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.message.or(parsed.msg).or(parsed.error_description))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            }
        });
    ApiException::new(code_for_status(status), message).into()
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(into_remote_error(response).await)
    }
}

pub struct RestSessionProvider {
    conn: Arc<RestConnection>,
}

impl RestSessionProvider {
    pub fn new(conn: Arc<RestConnection>) -> Self {
        Self { conn }
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrantResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[async_trait]
impl SessionProvider for RestSessionProvider {
    async fn session_present(&self) -> Result<bool> {
        Ok(self
            .conn
            .access_token
            .read()
            .await
            .as_deref()
            .is_some_and(|token| !token.is_empty()))
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<()> {
        let url = self.conn.endpoint("auth/v1/token")?;
        let response = self
            .conn
            .http
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.conn.api_key)
            .json(credentials)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let grant: TokenGrantResponse = response.json().await?;
        let mut guard = self.conn.access_token.write().await;
        // A success response without a usable token leaves the session
        // absent; the console surfaces that inconsistency to the user.
        *guard = grant.access_token.filter(|token| !token.is_empty());
        info!("sign-in completed, session present: {}", guard.is_some());
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let url = self.conn.endpoint("auth/v1/logout")?;
        let request = self.conn.authed(self.conn.http.post(url)).await;
        let result = request.send().await;
        // The local token is dropped regardless of what the collaborator
        // answers.
        *self.conn.access_token.write().await = None;
        ensure_success(result?).await?;
        Ok(())
    }
}

pub struct RestLeadService {
    conn: Arc<RestConnection>,
}

impl RestLeadService {
    pub fn new(conn: Arc<RestConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl LeadDataService for RestLeadService {
    async fn list_leads(&self) -> Result<Vec<LeadRecord>> {
        let url = self.conn.endpoint(LEADS_PATH)?;
        let request = self
            .conn
            .authed(self.conn.http.get(url))
            .await
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let response = ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<()> {
        let url = self.conn.endpoint(LEADS_PATH)?;
        let request = self
            .conn
            .authed(self.conn.http.post(url))
            .await
            .header("Prefer", "return=minimal")
            .json(&[lead]);
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    async fn update_status(&self, id: LeadId, status: LeadStatus) -> Result<()> {
        let url = self.conn.endpoint(LEADS_PATH)?;
        let request = self
            .conn
            .authed(self.conn.http.patch(url))
            .await
            .query(&[("id", format!("eq.{}", id.0))])
            .json(&StatusPatch { status });
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    async fn delete_lead(&self, id: LeadId) -> Result<()> {
        let url = self.conn.endpoint(LEADS_PATH)?;
        let request = self
            .conn
            .authed(self.conn.http.delete(url))
            .await
            .query(&[("id", format!("eq.{}", id.0))]);
        ensure_success(request.send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
