//! Control API collaborator for the world ops console.
//!
//! [`ControlApi`] is the seam the console talks through; [`HttpControlApi`]
//! is the REST implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use woc_core::commands::CommandCatalog;
use woc_core::dispatch::{DispatchRequest, DispatchResponse};
use woc_core::telemetry::{TelemetryHistory, TelemetryRange};
use woc_core::FleetSnapshot;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const ERROR_BODY_MAX_CHARS: usize = 240;

#[derive(Debug, Error)]
pub enum ControlApiError {
    #[error("control api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("control api {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to decode control api {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid control api configuration: {0}")]
    Config(String),
}

impl ControlApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ControlApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn fetch_fleet(&self) -> Result<FleetSnapshot, ControlApiError>;

    async fn fetch_catalog(&self) -> Result<CommandCatalog, ControlApiError>;

    async fn execute(&self, request: &DispatchRequest)
        -> Result<DispatchResponse, ControlApiError>;

    async fn fetch_history(
        &self,
        world_id: u32,
        range: TelemetryRange,
    ) -> Result<TelemetryHistory, ControlApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpControlApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpControlApi {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        request_timeout_ms: u64,
    ) -> Result<Self, ControlApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("woc-mission-control"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token.map(str::trim).filter(|value| !value.is_empty()) {
            let auth_header = format!("Bearer {token}");
            let value = HeaderValue::from_str(&auth_header)
                .map_err(|err| ControlApiError::Config(format!("authorization header: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(|err| ControlApiError::Config(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn request_json<T>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ControlApiError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|source| ControlApiError::Transport { operation, source })?;
        let status = response.status();
        debug!(event = "control_api_response", operation, status = status.as_u16());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlApiError::Status {
                operation,
                status: status.as_u16(),
                body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| ControlApiError::Decode { operation, source })
    }
}

#[async_trait]
impl ControlApi for HttpControlApi {
    async fn fetch_fleet(&self) -> Result<FleetSnapshot, ControlApiError> {
        self.request_json("fleet", self.http.get(self.url("/api/fleet")))
            .await
    }

    async fn fetch_catalog(&self) -> Result<CommandCatalog, ControlApiError> {
        self.request_json("command catalog", self.http.get(self.url("/api/commands")))
            .await
    }

    async fn execute(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchResponse, ControlApiError> {
        self.request_json(
            "execute command",
            self.http
                .post(self.url("/api/commands/execute"))
                .json(request),
        )
        .await
    }

    async fn fetch_history(
        &self,
        world_id: u32,
        range: TelemetryRange,
    ) -> Result<TelemetryHistory, ControlApiError> {
        self.request_json(
            "telemetry history",
            self.http
                .get(self.url(&format!("/api/worlds/{world_id}/telemetry")))
                .query(&[("range", range.as_str())]),
        )
        .await
    }
}

pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut truncated = trimmed.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
