//! Fetching a project's target grade history.
//!
//! Every failure is turned into a [`FetchError`]; nothing raises past this
//! module. The engine decides what the user gets to see.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use thiserror::Error;

use crate::config::{ApiConfig, Endpoint};
use crate::history::HistoryResponse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx response.
    #[error("server returned {0}")]
    Server(StatusCode),
    /// Body was not a history payload.
    #[error("malformed history payload: {0}")]
    Parse(String),
}

/// Source of history payloads. The HTTP implementation is [`HttpFetcher`];
/// tests script their own.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn fetch(&self, project_id: u64) -> Result<HistoryResponse, FetchError>;
}

pub struct HttpFetcher {
    http_client: HttpClient,
    base_url: String,
    endpoint: Endpoint,
    auth_token: Option<String>,
    username: Option<String>,
}

impl HttpFetcher {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            endpoint: config.endpoint,
            auth_token: config.auth_token.clone(),
            username: config.username.clone(),
        })
    }

    pub fn url_for(&self, project_id: u64) -> String {
        match self.endpoint {
            Endpoint::Histories => format!(
                "{}/projects/{}/target_grade_histories",
                self.base_url, project_id
            ),
            Endpoint::Project => format!("{}/projects/{}", self.base_url, project_id),
        }
    }
}

#[async_trait]
impl HistoryFetcher for HttpFetcher {
    async fn fetch(&self, project_id: u64) -> Result<HistoryResponse, FetchError> {
        let url = self.url_for(project_id);
        tracing::debug!(%url, "Fetching target grade history");

        let mut request = self.http_client.get(&url);
        if let Some(ref token) = self.auth_token {
            request = request.header("Auth-Token", token);
        }
        if let Some(ref username) = self.username {
            request = request.header("Username", username);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Server(status));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let response = parse_response(&body)?;

        if let Some(total) = response.total_histories {
            let received = response.target_grade_histories.len() as u64;
            if total > received {
                tracing::warn!(
                    project_id,
                    total,
                    received,
                    "Server reported more history entries than it returned"
                );
            }
        }

        Ok(response)
    }
}

/// Decode a response body.
pub fn parse_response(body: &[u8]) -> Result<HistoryResponse, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Parse(e.to_string()))
}
