use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use super::EndpointKind;
use crate::config::Config;

/// Failure modes of a single upstream call. Constructed here and nowhere
/// else; callers propagate these by value instead of re-wrapping them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The provider answered with a non-success status; the message is the
    /// provider's own where it sent one.
    #[error("upstream rejected the request: {0}")]
    UpstreamRejected(String),
    /// The request went out but no usable response came back.
    #[error("no response from upstream: {0}")]
    UpstreamUnreachable(String),
    /// The per-call deadline elapsed before a response arrived.
    #[error("upstream request timed out")]
    Timeout,
    /// A local failure before any network I/O happened.
    #[error("could not construct upstream request: {0}")]
    RequestConstruction(String),
}

/// HTTP client for the OpenWeatherMap API. Performs exactly one GET per
/// `fetch` call; caching and fan-out are layered on top by the gateway.
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("TekiTempest/1.0")
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .map_err(|e| FetchError::RequestConstruction(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.openweather_base_url.clone(),
            api_key: config.openweather_api_key.clone(),
        })
    }

    /// Performs one GET against the provider, appending the API key to the
    /// logical parameters. No retries: a failed call is classified and
    /// reported, never replayed.
    pub async fn fetch(
        &self,
        kind: EndpointKind,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, kind.path());
        let mut query: Vec<(&str, &str)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        query.push(("appid", self.api_key.as_str()));

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%kind, %status, "upstream rejected request");
            return Err(FetchError::UpstreamRejected(rejection_message(status, &body)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::UpstreamRejected(format!("malformed response body: {e}")))
    }
}

fn classify_send_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_builder() {
        FetchError::RequestConstruction(error.to_string())
    } else {
        FetchError::UpstreamUnreachable(error.to_string())
    }
}

/// Prefers the provider's own `{"message": ...}` error body when the
/// rejection carries one; falls back to the status line plus raw body.
fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}
