use std::time::Duration;

use serde_json::Value;

use crate::error::FetchFailure;

/// Client for the Flipside query-result API. Each configured dataset id is a
/// saved query whose latest materialization is served at
/// `/api/v2/queries/{id}/data/latest` as a flat JSON array of records.
///
/// Retry policy lives here, in the ingestion adapter; the engine only sees
/// the final outcome of a fetch.
pub struct FlipsideClient {
    base_url: String,
    http: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl FlipsideClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        Self::new_with_settings(base_url, request_timeout, 0, Duration::ZERO)
    }

    pub fn new_with_settings(
        base_url: &str,
        request_timeout: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            max_retries,
            backoff_base,
        }
    }

    pub fn dataset_url(&self, dataset_id: &str) -> String {
        format!("{}/api/v2/queries/{dataset_id}/data/latest", self.base_url)
    }

    /// Fetches the latest snapshot of a dataset. An empty array is a valid
    /// zero-row response; a non-array payload is a `MalformedPayload`.
    pub async fn fetch_rows(&self, dataset_id: &str) -> Result<Vec<Value>, FetchFailure> {
        let url = self.dataset_url(dataset_id);
        let mut attempt = 0_u32;
        loop {
            match self.fetch_rows_once(dataset_id, &url).await {
                Ok(rows) => return Ok(rows),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    let backoff = self.backoff_base * 2_u32.saturating_pow(attempt);
                    tracing::warn!(
                        dataset = dataset_id,
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "dataset fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_rows_once(
        &self,
        dataset_id: &str,
        url: &str,
    ) -> Result<Vec<Value>, FetchFailure> {
        let transport = |source| FetchFailure::Transport {
            dataset: dataset_id.to_string(),
            source,
        };

        let response = self.http.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status {
                dataset: dataset_id.to_string(),
                status,
            });
        }

        let payload: Value = response.json().await.map_err(transport)?;
        match payload {
            Value::Array(rows) => Ok(rows),
            _ => Err(FetchFailure::MalformedPayload {
                dataset: dataset_id.to_string(),
            }),
        }
    }
}

fn is_retryable(err: &FetchFailure) -> bool {
    match err {
        FetchFailure::Transport { source, .. } => source.is_timeout() || source.is_connect(),
        FetchFailure::Status { status, .. } => status.is_server_error(),
        FetchFailure::MalformedPayload { .. } => false,
    }
}
