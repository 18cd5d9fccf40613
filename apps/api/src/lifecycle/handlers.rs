//! Axum route handlers for the analysis API.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::model::AnalysisView;
use crate::analysis::normalize::normalize;
use crate::analysis::reduce::reduce;
use crate::errors::AppError;
use crate::lifecycle::events::RelatedLink;
use crate::lifecycle::state::{SnapshotResponse, Subject, SubjectKind};
use crate::lifecycle::AnalysisLifecycle;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub bypass_cache: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistRequest {
    #[serde(default)]
    pub draft: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ReduceResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedResponse {
    pub record_id: String,
}

fn subject_from_path(kind: &str, id: &str) -> Result<Subject, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::Validation("record id cannot be empty".to_string()));
    }
    let kind = SubjectKind::from_api_name(kind);
    if let SubjectKind::Unsupported(name) = &kind {
        return Err(AppError::Validation(format!("Unsupported object type: {name}")));
    }
    Ok(Subject::new(id.trim(), kind))
}

/// Looks up a lifecycle without creating one.
fn existing(state: &AppState, subject: &Subject) -> Result<Arc<AnalysisLifecycle>, AppError> {
    state.lifecycles.get(subject).ok_or_else(|| {
        AppError::NotFound(format!(
            "No analysis session for {}/{}",
            subject.kind, subject.id
        ))
    })
}

/// An empty body means "save the current analysis". Anything else must be a
/// well-formed JSON `PersistRequest`.
fn persist_draft(headers: &HeaderMap, body: &Bytes) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .map_or(false, |v| v.starts_with("application/json") || v.contains("+json"));
    if !is_json {
        return Err(AppError::Validation(
            "persist body must be sent as application/json".to_string(),
        ));
    }

    let Json(request) = Json::<PersistRequest>::from_bytes(body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    Ok(request.draft)
}

// ────────────────────────────────────────────────────────────────────────────
// Stateless helpers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analysis/normalize
pub async fn handle_normalize(Json(raw): Json<Value>) -> Json<AnalysisView> {
    Json(AnalysisView::from(normalize(&raw)))
}

/// POST /api/v1/errors/reduce
pub async fn handle_reduce(Json(error): Json<Value>) -> Json<ReduceResponse> {
    Json(ReduceResponse {
        message: reduce(&error),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/subjects/:kind/:id
pub async fn handle_get_snapshot(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let lifecycle = existing(&state, &subject_from_path(&kind, &id)?)?;
    Ok(Json(lifecycle.snapshot().into()))
}

/// POST /api/v1/subjects/:kind/:id/load
pub async fn handle_load(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let lifecycle = state.lifecycles.get_or_create(&subject_from_path(&kind, &id)?);
    Ok(Json(lifecycle.load().await.into()))
}

/// POST /api/v1/subjects/:kind/:id/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let lifecycle = state.lifecycles.get_or_create(&subject_from_path(&kind, &id)?);
    let snapshot = lifecycle
        .analyze_document(&request.document_id, request.bypass_cache)
        .await;
    Ok(Json(snapshot.into()))
}

/// POST /api/v1/subjects/:kind/:id/reanalyze
pub async fn handle_reanalyze(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let lifecycle = existing(&state, &subject_from_path(&kind, &id)?)?;
    Ok(Json(lifecycle.force_reanalyze().await.into()))
}

/// POST /api/v1/subjects/:kind/:id/persist
///
/// With a `draft` body the draft is saved; with an empty body the current
/// analysis is. Saving the current analysis needs an existing session.
pub async fn handle_persist(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SnapshotResponse>, AppError> {
    let subject = subject_from_path(&kind, &id)?;
    let draft = persist_draft(&headers, &body)?;
    let lifecycle = match draft {
        Some(_) => state.lifecycles.get_or_create(&subject),
        None => existing(&state, &subject)?,
    };
    Ok(Json(lifecycle.persist(draft).await.into()))
}

/// POST /api/v1/subjects/:kind/:id/reset
///
/// Resets the session and drops it from the registry.
pub async fn handle_reset(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let subject = subject_from_path(&kind, &id)?;
    let lifecycle = existing(&state, &subject)?;
    let snapshot = lifecycle.reset();
    state.lifecycles.remove(&subject);
    Ok(Json(snapshot.into()))
}

/// GET /api/v1/subjects/:kind/:id/related/:link
pub async fn handle_related(
    State(state): State<AppState>,
    Path((kind, id, link)): Path<(String, String, RelatedLink)>,
) -> Result<Json<RelatedResponse>, AppError> {
    let lifecycle = existing(&state, &subject_from_path(&kind, &id)?)?;
    let record_id = lifecycle.open_related(link).ok_or_else(|| {
        AppError::NotFound(format!("No {link:?} record linked to this analysis"))
    })?;
    Ok(Json(RelatedResponse { record_id }))
}
