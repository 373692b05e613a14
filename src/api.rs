use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::TORN_API_BASE;
use crate::types::{BarsResponse, CompanyResponse, FactionResponse, IconsResponse, ProfileResponse};

/// Upstream error codes that mean the credential itself is bad.
const CODE_KEY_EMPTY: u8 = 1;
const CODE_KEY_INCORRECT: u8 = 2;
/// Upstream error code for per-key request throttling.
const CODE_RATE_LIMIT: u8 = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("http status {0}")]
    Http(u16),
    /// Distinct from other failures so pollers can back off instead of
    /// hammering a throttled key.
    #[error("rate limited")]
    RateLimited,
    /// Fatal at startup; the process is useless without a valid key.
    #[error("invalid api key")]
    InvalidKey,
    #[error("api error {code}: {message}")]
    Upstream { code: u8, message: String },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Transient failures resolve themselves on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Http(_) | ApiError::RateLimited
        )
    }
}

/// Thin client over the Torn REST API, one static key.
#[derive(Debug, Clone)]
pub struct TornApi {
    http: reqwest::Client,
    key: String,
}

impl TornApi {
    pub fn new(key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            key: key.into(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        scope: &str,
        id: Option<u64>,
        selections: &str,
    ) -> Result<T, ApiError> {
        let id_part = id.map(|i| i.to_string()).unwrap_or_default();
        let url = format!(
            "{TORN_API_BASE}/{scope}/{id_part}?selections={selections}&key={}",
            self.key
        );
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ApiError::RateLimited);
        }
        if !status.is_success() {
            return Err(ApiError::Http(status.as_u16()));
        }

        let body: serde_json::Value = resp.json().await?;
        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(|c| c.as_u64()).unwrap_or(0) as u8;
            let message = err
                .get("error")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(match code {
                CODE_RATE_LIMIT => ApiError::RateLimited,
                CODE_KEY_EMPTY | CODE_KEY_INCORRECT => ApiError::InvalidKey,
                _ => ApiError::Upstream { code, message },
            });
        }

        debug!("GET {scope}/{id_part} selections={selections} ok");
        serde_json::from_value(body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Profile of another player.
    pub async fn profile(&self, id: u64) -> Result<ProfileResponse, ApiError> {
        self.get("user", Some(id), "profile").await
    }

    /// Own profile; doubles as the startup credential check.
    pub async fn own_profile(&self) -> Result<ProfileResponse, ApiError> {
        self.get("user", None, "profile").await
    }

    /// Faction roster plus coarse faction data.
    pub async fn faction(&self, id: u64) -> Result<FactionResponse, ApiError> {
        self.get("faction", Some(id), "basic").await
    }

    /// Own resource bars and chain counter.
    pub async fn bars(&self) -> Result<BarsResponse, ApiError> {
        self.get("user", None, "bars").await
    }

    /// Own active status badges.
    pub async fn icons(&self) -> Result<IconsResponse, ApiError> {
        self.get("user", None, "icons").await
    }

    /// Employee effectiveness for the operator's company.
    pub async fn company(&self) -> Result<CompanyResponse, ApiError> {
        self.get("company", None, "employees").await
    }
}
