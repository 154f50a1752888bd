// HTTP backend via reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{BackendError, SnapshotBackend, classify};
use crate::config::BackendConfig;
use crate::models::Snapshot;

pub struct HttpBackend {
    client: Client,
    snapshot_url: String,
    reset_url: String,
    api_token: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            snapshot_url: format!("{}{}", base, config.snapshot_path),
            reset_url: format!("{}{}", base, config.reset_path),
            api_token: config.api_token.clone(),
        })
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_snapshot(&self) -> Result<Snapshot, BackendError> {
        let response = self
            .authorized(self.client.get(&self.snapshot_url))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        decode_snapshot(status, &text)
    }
}

#[async_trait]
impl SnapshotBackend for HttpBackend {
    #[instrument(skip(self, cancel), fields(backend = "http", operation = "fetch_snapshot"))]
    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot, BackendError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
            result = self.get_snapshot() => result,
        }
    }

    #[instrument(skip(self), fields(backend = "http", operation = "reset_snapshot"))]
    async fn reset_snapshot(&self) -> Result<(), BackendError> {
        let response = self
            .authorized(self.client.post(&self.reset_url))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    classify(e.status().map(|s| s.as_u16()), None, &e.to_string())
}

/// The feed may send the snapshot bare or inside `{ "data": ... }`. Either way the
/// sample list must be present; a `success: false` envelope or a body without samples
/// is a failure, classified the same way as an error status.
fn decode_snapshot(status: u16, text: &str) -> Result<Snapshot, BackendError> {
    let body: Value =
        serde_json::from_str(text).map_err(|e| BackendError::Decode(e.to_string()))?;
    let declined = body.get("success").and_then(Value::as_bool) == Some(false);
    let payload = body.get("data").filter(|d| d.is_object()).unwrap_or(&body);
    let has_samples = ["slowQueries", "samples"]
        .iter()
        .any(|key| payload.get(*key).is_some_and(Value::is_array));

    if declined || !has_samples {
        let details = ErrorBody::deserialize(&body).unwrap_or_default();
        let message = details
            .message
            .or(details.error)
            .unwrap_or_else(|| "response carried no slow-query samples".to_string());
        let err = classify(Some(status), details.code.as_deref(), &message);
        if declined || err.is_rate_limited() {
            return Err(err);
        }
        return Err(BackendError::Decode(message));
    }
    Snapshot::deserialize(payload).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Passes 2xx through; otherwise reads the body for a code/message and classifies.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .or(body.error)
        .unwrap_or_else(|| if text.is_empty() { status.to_string() } else { text });
    Err(classify(Some(status.as_u16()), body.code.as_deref(), &message))
}
