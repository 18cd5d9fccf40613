//! Host-facing side channels: toast-style notifications, record navigation and
//! the completion events a parent view listens to.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::analysis::model::AnalysisModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            title: "Success".to_string(),
            message: message.into(),
            severity: Severity::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Fire-and-forget notification channel.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Fire-and-forget navigation channel.
pub trait Navigator: Send + Sync {
    fn navigate_to_record(&self, record_id: &str);
}

/// Default notifier: writes notifications to the tracing pipeline.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Error => error!(title = %n.title, "{}", n.message),
            Severity::Warning => warn!(title = %n.title, "{}", n.message),
            Severity::Info | Severity::Success => info!(title = %n.title, "{}", n.message),
        }
    }
}

/// Default navigator: the host performs navigation, the service only records it.
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate_to_record(&self, record_id: &str) {
        info!(record_id, "navigate to record");
    }
}

/// Events raised after a successful analysis or save.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnalysisEvent {
    #[serde(rename_all = "camelCase")]
    AnalysisComplete {
        success: bool,
        model: Box<AnalysisModel>,
    },
    #[serde(rename_all = "camelCase")]
    AnalysisSaved {
        success: bool,
        analysis_record_id: String,
    },
}

/// Records an analysis can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelatedLink {
    Analysis,
    Candidate,
    Position,
    JobApplication,
}
