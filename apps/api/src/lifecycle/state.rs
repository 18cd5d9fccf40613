use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::model::{AnalysisModel, AnalysisView};

pub const ANALYSIS_RECORD_OBJECT: &str = "AiAnalysisResult__c";
pub const CANDIDATE_OBJECT: &str = "Candidate__c";
pub const JOB_APPLICATION_OBJECT: &str = "Job_Application__c";

/// Host object type of the record page a lifecycle is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    AnalysisRecord,
    Candidate,
    JobApplication,
    Unsupported(String),
}

impl SubjectKind {
    /// Parses a host object API name. Short aliases are accepted for the HTTP routes.
    pub fn from_api_name(name: &str) -> Self {
        match name {
            ANALYSIS_RECORD_OBJECT | "analysis" => SubjectKind::AnalysisRecord,
            CANDIDATE_OBJECT | "candidate" => SubjectKind::Candidate,
            JOB_APPLICATION_OBJECT | "job-application" | "job_application" => {
                SubjectKind::JobApplication
            }
            other => SubjectKind::Unsupported(other.to_string()),
        }
    }

    pub fn api_name(&self) -> &str {
        match self {
            SubjectKind::AnalysisRecord => ANALYSIS_RECORD_OBJECT,
            SubjectKind::Candidate => CANDIDATE_OBJECT,
            SubjectKind::JobApplication => JOB_APPLICATION_OBJECT,
            SubjectKind::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

impl Serialize for SubjectKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.api_name())
    }
}

impl<'de> Deserialize<'de> for SubjectKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(SubjectKind::from_api_name(&name))
    }
}

/// The record an analysis is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub kind: SubjectKind,
}

impl Subject {
    pub fn new(id: impl Into<String>, kind: SubjectKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Loading,
    Ready(AnalysisModel),
    Error(String),
}

impl LifecycleState {
    pub fn model(&self) -> Option<&AnalysisModel> {
        match self {
            LifecycleState::Ready(model) => Some(model),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Loading => "loading",
            LifecycleState::Ready(_) => "ready",
            LifecycleState::Error(_) => "error",
        }
    }
}

/// Point-in-time copy of a lifecycle, tagged with its subject and document.
#[derive(Debug, Clone)]
pub struct LifecycleSnapshot {
    pub subject: Subject,
    pub state: LifecycleState,
    pub document_id: Option<String>,
    pub analysis_id: Option<String>,
    pub draft: Option<Value>,
    pub saving: bool,
    pub updated_at: DateTime<Utc>,
}

/// JSON form of a snapshot as returned by the HTTP API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub subject: Subject,
    pub state: &'static str,
    pub analysis: Option<AnalysisView>,
    pub error: Option<String>,
    pub document_id: Option<String>,
    pub analysis_id: Option<String>,
    pub draft: Option<Value>,
    pub saving: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<LifecycleSnapshot> for SnapshotResponse {
    fn from(snapshot: LifecycleSnapshot) -> Self {
        let state = snapshot.state.label();
        let (analysis, error) = match snapshot.state {
            LifecycleState::Ready(model) => (Some(AnalysisView::from(model)), None),
            LifecycleState::Error(message) => (None, Some(message)),
            LifecycleState::Idle | LifecycleState::Loading => (None, None),
        };
        Self {
            subject: snapshot.subject,
            state,
            analysis,
            error,
            document_id: snapshot.document_id,
            analysis_id: snapshot.analysis_id,
            draft: snapshot.draft,
            saving: snapshot.saving,
            updated_at: snapshot.updated_at,
        }
    }
}
