//! HTTP client for the external analysis service.
//!
//! Every consumed operation goes through [`HttpAnalysisBackend::send`], which
//! retries 429 and 5xx responses with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::{AnalysisBackend, ServiceError};
use crate::config::Config;

const MAX_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct HttpAnalysisBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpAnalysisBackend {
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.analysis_timeout_secs))
            .build()?;
        let raw_url = config.analysis_service_url.trim();
        let base_url =
            Url::parse(raw_url).map_err(|e| ServiceError::InvalidUrl(format!("{raw_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url,
            token: config.analysis_service_token.clone(),
        })
    }

    /// Appends `segments` to the base URL. Each segment is percent-encoded, so
    /// an id can never add path levels or a query string.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(ServiceError::InvalidUrl(format!("unusable path segment '{bad}'")));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments.iter().copied());
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, ServiceError> {
        let path = url.path().to_string();
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "analysis service call to {} failed (attempt {}), retrying after {}ms",
                    path,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ServiceError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await?;
            // Fault bodies are usually JSON; keep plain text otherwise
            let payload = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(ServiceError::Fault {
                    status: status.as_u16(),
                    body: payload,
                });
                continue;
            }

            if !status.is_success() {
                return Err(ServiceError::Fault {
                    status: status.as_u16(),
                    body: payload,
                });
            }

            debug!("analysis service {} {} -> {}", method, path, status);
            return Ok(payload);
        }

        Err(last_error.unwrap_or(ServiceError::RetriesExhausted {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn find_latest_analysis(&self, subject_id: &str) -> Result<Option<String>, ServiceError> {
        let url = self.endpoint(&["records", subject_id, "latest-analysis"])?;
        let payload = self.send(Method::GET, url, None).await?;
        Ok(record_id(&payload))
    }

    async fn fetch_analysis(&self, analysis_id: &str) -> Result<Value, ServiceError> {
        let url = self.endpoint(&["analyses", analysis_id])?;
        self.send(Method::GET, url, None).await
    }

    async fn analyze_resume(
        &self,
        document_id: &str,
        position_id: Option<&str>,
        bypass_cache: bool,
    ) -> Result<Value, ServiceError> {
        let body = json!({
            "contentDocumentId": document_id,
            "positionId": position_id,
            "bypassCache": bypass_cache,
        });
        let url = self.endpoint(&["analyses", "resume"])?;
        self.send(Method::POST, url, Some(&body)).await
    }

    async fn persist_analysis(
        &self,
        subject_id: &str,
        payload: &Value,
    ) -> Result<String, ServiceError> {
        let body = json!({
            "recordId": subject_id,
            "analysisResults": payload.to_string(),
        });
        let url = self.endpoint(&["records", subject_id, "analyses"])?;
        let response = self.send(Method::POST, url, Some(&body)).await?;
        record_id(&response).ok_or_else(|| {
            ServiceError::Decode("persist response carried no record id".to_string())
        })
    }
}

/// Accepts a bare id string, `null`, or an object with `id`/`analysisId`.
fn record_id(payload: &Value) -> Option<String> {
    let id = match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => payload
            .get("analysisId")
            .or_else(|| payload.get("id"))
            .and_then(|v| v.as_str()),
        _ => None,
    };
    id.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
