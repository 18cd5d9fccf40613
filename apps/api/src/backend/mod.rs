//! Analysis backend: the operations this service consumes from the external
//! analysis service and record store.
//!
//! The lifecycle only ever talks to `Arc<dyn AnalysisBackend>`; the default
//! implementation is [`http::HttpAnalysisBackend`].
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

pub mod http;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response; `body` is the service's fault payload.
    #[error("service fault (status {status})")]
    Fault { status: u16, body: Value },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid analysis service URL: {0}")]
    InvalidUrl(String),

    #[error("retries exhausted after {retries} attempts")]
    RetriesExhausted { retries: u32 },
}

impl ServiceError {
    /// Error value in the shape the reducer understands.
    pub fn to_value(&self) -> Value {
        match self {
            // platform faults often arrive as a list of errors
            ServiceError::Fault { body: list @ Value::Array(_), .. } => list.clone(),
            ServiceError::Fault { status, body } => {
                let body = match body {
                    Value::String(text) => json!({ "message": text }),
                    other => other.clone(),
                };
                json!({ "status": status, "body": body })
            }
            other => json!({ "message": other.to_string() }),
        }
    }

    pub fn reduced(&self) -> String {
        crate::analysis::reduce::reduce(&self.to_value())
    }
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Latest analysis record id for a candidate or job application, if any.
    async fn find_latest_analysis(&self, subject_id: &str) -> Result<Option<String>, ServiceError>;

    /// Raw analysis record projection.
    async fn fetch_analysis(&self, analysis_id: &str) -> Result<Value, ServiceError>;

    /// Runs (or reuses a cached) résumé analysis. `bypass_cache` forces recomputation.
    async fn analyze_resume(
        &self,
        document_id: &str,
        position_id: Option<&str>,
        bypass_cache: bool,
    ) -> Result<Value, ServiceError>;

    /// Persists a serialized analysis and returns the analysis record id.
    async fn persist_analysis(
        &self,
        subject_id: &str,
        payload: &Value,
    ) -> Result<String, ServiceError>;
}
