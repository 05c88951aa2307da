//! HTTP clients for the remote quota and collection services.
//!
//! `ureq` is blocking, so every call runs on tokio's blocking pool. Timeouts
//! are enforced by the agent and surface as transport failures.

use super::{RemoteCollectionService, RemoteError, RemoteQuota, RemoteQuotaService};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Status the server uses for "limit already exhausted".
const TOO_MANY_REQUESTS: u16 = 429;
const CONFLICT: u16 = 409;

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Runs a blocking request on the blocking pool and maps join failures.
async fn run_blocking<T, F>(f: F) -> Result<T, RemoteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RemoteError::transport(format!("request task failed: {}", e)))?
}

fn read_response(
    result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<(u16, String), RemoteError> {
    let mut response = result.map_err(|e| RemoteError::transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| RemoteError::transport(format!("failed to read response: {}", e)))?;
    Ok((status, body))
}

/// Client for `GET remaining-quota` and quota-consuming actions.
#[derive(Clone)]
pub struct HttpQuotaClient {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpQuotaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            endpoint: endpoint.into(),
        }
    }

    /// Performs a quota-consuming action (`POST`), returning the remaining
    /// count when the server includes one.
    pub async fn perform_action(
        &self,
        action_url: &str,
        body: Value,
    ) -> Result<Option<u32>, RemoteError> {
        let agent = self.agent.clone();
        let url = action_url.to_string();
        run_blocking(move || {
            let payload =
                serde_json::to_string(&body).map_err(|e| RemoteError::parse(e.to_string()))?;
            let (status, text) = read_response(
                agent
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .send(payload),
            )?;
            parse_action_response(status, &text)
        })
        .await
    }
}

#[async_trait]
impl RemoteQuotaService for HttpQuotaClient {
    async fn fetch_remaining(&self) -> Result<RemoteQuota, RemoteError> {
        let agent = self.agent.clone();
        let url = self.endpoint.clone();
        run_blocking(move || {
            let (status, body) = read_response(agent.get(&url).call())?;
            parse_quota_response(status, &body)
        })
        .await
    }
}

/// Client for the favorites collection.
#[derive(Clone)]
pub struct HttpCollectionClient {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpCollectionClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RemoteCollectionService for HttpCollectionClient {
    async fn add(&self, item_type: &str, item: Value) -> Result<Vec<Value>, RemoteError> {
        let agent = self.agent.clone();
        let url = self.endpoint.clone();
        let payload = serde_json::json!({ "type": item_type, "item": item });
        run_blocking(move || {
            let payload =
                serde_json::to_string(&payload).map_err(|e| RemoteError::parse(e.to_string()))?;
            let (status, body) = read_response(
                agent
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .send(payload),
            )?;
            parse_collection_response(status, &body)
        })
        .await
    }

    async fn remove(&self, item_type: &str, id: &str) -> Result<Vec<Value>, RemoteError> {
        let agent = self.agent.clone();
        let url = self.endpoint.clone();
        let item_type = item_type.to_string();
        let id = id.to_string();
        run_blocking(move || {
            let (status, body) = read_response(
                agent
                    .delete(&url)
                    .query("type", &item_type)
                    .query("id", &id)
                    .call(),
            )?;
            parse_collection_response(status, &body)
        })
        .await
    }

    async fn list(&self, item_type: &str) -> Result<Vec<Value>, RemoteError> {
        let agent = self.agent.clone();
        let url = self.endpoint.clone();
        let item_type = item_type.to_string();
        run_blocking(move || {
            let (status, body) = read_response(agent.get(&url).query("type", &item_type).call())?;
            parse_collection_response(status, &body)
        })
        .await
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Parses the body of `GET remaining-quota`.
pub fn parse_quota_response(status: u16, body: &str) -> Result<RemoteQuota, RemoteError> {
    if status == TOO_MANY_REQUESTS {
        return Err(RemoteError::rejected(rejection_reason(body)));
    }
    if !is_success(status) {
        return Err(RemoteError::transport(format!("HTTP {}", status)));
    }

    let quota: RemoteQuota =
        serde_json::from_str(body).map_err(|e| RemoteError::parse(e.to_string()))?;
    if !quota.unlimited && quota.remaining.is_none() {
        return Err(RemoteError::parse("missing remaining count"));
    }
    Ok(quota)
}

/// Parses the response of a quota-consuming action.
pub fn parse_action_response(status: u16, body: &str) -> Result<Option<u32>, RemoteError> {
    if status == TOO_MANY_REQUESTS {
        return Err(RemoteError::rejected(rejection_reason(body)));
    }
    if !is_success(status) {
        return Err(RemoteError::transport(format!("HTTP {}", status)));
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        // Actions are not required to answer with JSON.
        Err(_) => return Ok(None),
    };
    Ok(value["remaining"]
        .as_u64()
        .map(|r| u32::try_from(r).unwrap_or(u32::MAX)))
}

/// Parses a collection response: a bare array or `{ "items": [...] }`.
pub fn parse_collection_response(status: u16, body: &str) -> Result<Vec<Value>, RemoteError> {
    if status == CONFLICT || status == TOO_MANY_REQUESTS {
        return Err(RemoteError::rejected(rejection_reason(body)));
    }
    if !is_success(status) {
        return Err(RemoteError::transport(format!("HTTP {}", status)));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| RemoteError::parse(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(RemoteError::parse("expected an array of items")),
        },
        _ => Err(RemoteError::parse("expected an array of items")),
    }
}

/// Extracts the human-readable reason from a rejection body.
pub fn rejection_reason(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["reason", "error", "message"] {
            if let Some(reason) = value[field].as_str() {
                return reason.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('{') {
        "limit reached".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
