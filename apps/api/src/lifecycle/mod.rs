//! Analysis lifecycle: one instance per subject record.
//!
//! States: `Idle → Loading → Ready | Error`. `load`, `analyze_document` and
//! `reset` each start a new generation; a response is applied only while its
//! generation is still current, so a superseded request can never overwrite
//! the state of a newer one (last writer wins). The state mutex is never held
//! across an `.await`.

pub mod events;
pub mod handlers;
pub mod registry;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::analysis::normalize::normalize;
use crate::analysis::persist::{coerce_draft, payload_from_model};
use crate::backend::AnalysisBackend;
use crate::lifecycle::events::{AnalysisEvent, Navigator, Notification, Notifier, RelatedLink};
use crate::lifecycle::state::{LifecycleSnapshot, LifecycleState, Subject, SubjectKind};

const NO_ANALYSIS_FOUND: &str = "No analysis found for this record.";
const NO_DOCUMENT: &str = "Please upload a CV file first";
const NO_DOCUMENT_TO_REANALYZE: &str = "No CV found for analysis";
const NOTHING_TO_SAVE: &str = "No analysis results to save";
const MISSING_RECORD_ID: &str = "Missing record ID";
const INVALID_DRAFT: &str = "Analysis draft must be a JSON object";

/// Collaborators shared by every lifecycle the service creates.
#[derive(Clone)]
pub struct LifecycleContext {
    pub backend: Arc<dyn AnalysisBackend>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
    pub event_capacity: usize,
}

struct Inner {
    state: LifecycleState,
    generation: u64,
    document_id: Option<String>,
    analysis_id: Option<String>,
    draft: Option<Value>,
    saving: bool,
    updated_at: DateTime<Utc>,
}

pub struct AnalysisLifecycle {
    subject: Subject,
    context: LifecycleContext,
    events: broadcast::Sender<AnalysisEvent>,
    inner: Mutex<Inner>,
}

impl AnalysisLifecycle {
    pub fn new(subject: Subject, context: LifecycleContext) -> Self {
        let (events, _) = broadcast::channel(context.event_capacity.max(1));
        Self {
            subject,
            context,
            events,
            inner: Mutex::new(Inner {
                state: LifecycleState::Idle,
                generation: 0,
                document_id: None,
                analysis_id: None,
                draft: None,
                saving: false,
                updated_at: Utc::now(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        let inner = self.lock();
        LifecycleSnapshot {
            subject: self.subject.clone(),
            state: inner.state.clone(),
            document_id: inner.document_id.clone(),
            analysis_id: inner.analysis_id.clone(),
            draft: inner.draft.clone(),
            saving: inner.saving,
            updated_at: inner.updated_at,
        }
    }

    /// Loads the analysis attached to the subject record.
    ///
    /// Analysis records are their own analysis, so the lookup is skipped and the
    /// record is fetched directly. Candidates and job applications resolve
    /// their latest analysis first.
    pub async fn load(&self) -> LifecycleSnapshot {
        let generation = self.begin(None);
        info!(subject = %self.subject.id, kind = %self.subject.kind, "loading analysis");

        let lookup = match &self.subject.kind {
            SubjectKind::AnalysisRecord => Ok(Some(self.subject.id.clone())),
            SubjectKind::Candidate | SubjectKind::JobApplication => {
                self.context
                    .backend
                    .find_latest_analysis(&self.subject.id)
                    .await
            }
            SubjectKind::Unsupported(name) => {
                let message = format!("Unsupported object type: {name}");
                self.fail(generation, message.clone(), message);
                return self.snapshot();
            }
        };

        let fetched = match lookup {
            Ok(Some(analysis_id)) => {
                if !self.is_current(generation) {
                    debug!(subject = %self.subject.id, "load superseded before fetch");
                    return self.snapshot();
                }
                self.context
                    .backend
                    .fetch_analysis(&analysis_id)
                    .await
                    .map(|raw| (analysis_id, raw))
            }
            Ok(None) => {
                let message = NO_ANALYSIS_FOUND.to_string();
                self.fail(generation, message.clone(), message);
                return self.snapshot();
            }
            Err(e) => Err(e),
        };

        match fetched {
            Ok((analysis_id, raw)) => {
                let model = normalize(&raw);
                self.apply(generation, |inner| {
                    inner.analysis_id = Some(analysis_id);
                    inner.state = LifecycleState::Ready(model);
                });
            }
            Err(e) => {
                let message = format!("Error loading analysis: {}", e.reduced());
                self.fail(generation, message.clone(), message);
            }
        }

        self.snapshot()
    }

    /// Analyzes an uploaded document. `bypass_cache` forces the service to
    /// recompute instead of returning a stored result for the same document.
    pub async fn analyze_document(
        &self,
        document_id: &str,
        bypass_cache: bool,
    ) -> LifecycleSnapshot {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            self.context.notifier.notify(Notification::error(NO_DOCUMENT));
            return self.snapshot();
        }

        let generation = self.begin(Some(document_id.to_string()));
        let position_id = match self.subject.kind {
            SubjectKind::JobApplication => Some(self.subject.id.as_str()),
            _ => None,
        };
        info!(
            subject = %self.subject.id,
            document_id,
            bypass_cache,
            generation,
            "analyzing document"
        );

        match self
            .context
            .backend
            .analyze_resume(document_id, position_id, bypass_cache)
            .await
        {
            Ok(raw) => {
                let model = normalize(&raw);
                let applied = self.apply(generation, |inner| {
                    inner.analysis_id = None;
                    inner.state = LifecycleState::Ready(model.clone());
                });
                if applied {
                    let _ = self.events.send(AnalysisEvent::AnalysisComplete {
                        success: true,
                        model: Box::new(model),
                    });
                    self.context
                        .notifier
                        .notify(Notification::success("CV analysis completed successfully"));
                }
            }
            Err(e) => {
                let reduced = e.reduced();
                let notice = format!("An error occurred during CV analysis: {reduced}");
                self.fail(generation, reduced, notice);
            }
        }

        self.snapshot()
    }

    /// Re-runs the last analysis with the cache bypassed; no re-upload needed.
    pub async fn force_reanalyze(&self) -> LifecycleSnapshot {
        let document_id = self.lock().document_id.clone();
        match document_id {
            Some(document_id) => self.analyze_document(&document_id, true).await,
            None => {
                self.context
                    .notifier
                    .notify(Notification::error(NO_DOCUMENT_TO_REANALYZE));
                self.snapshot()
            }
        }
    }

    /// Persists `draft` if given, otherwise the current model.
    ///
    /// A draft is retained until it is saved, so a failed save can be retried
    /// without re-entering data. Failure never changes the lifecycle state.
    pub async fn persist(&self, draft: Option<Value>) -> LifecycleSnapshot {
        let prepared = self.prepare_persist(draft);
        let (payload, generation, from_draft) = match prepared {
            Ok(prepared) => prepared,
            Err(message) => {
                self.context.notifier.notify(Notification::error(message));
                return self.snapshot();
            }
        };

        info!(subject = %self.subject.id, from_draft, "persisting analysis");
        let result = self
            .context
            .backend
            .persist_analysis(&self.subject.id, &payload)
            .await;

        match result {
            Ok(analysis_id) => {
                {
                    let mut inner = self.lock();
                    inner.saving = false;
                    if from_draft {
                        inner.draft = None;
                    }
                    if inner.generation == generation {
                        inner.analysis_id = Some(analysis_id.clone());
                        if from_draft {
                            inner.state = LifecycleState::Ready(normalize(&payload));
                        }
                    } else {
                        debug!(
                            subject = %self.subject.id,
                            "save finished after a newer request; state kept"
                        );
                    }
                    inner.updated_at = Utc::now();
                }
                let _ = self.events.send(AnalysisEvent::AnalysisSaved {
                    success: true,
                    analysis_record_id: analysis_id,
                });
                self.context
                    .notifier
                    .notify(Notification::success("Analysis results saved successfully"));
            }
            Err(e) => {
                {
                    let mut inner = self.lock();
                    inner.saving = false;
                    inner.updated_at = Utc::now();
                }
                let reduced = e.reduced();
                warn!(subject = %self.subject.id, error = %reduced, "saving analysis failed");
                self.context.notifier.notify(Notification::error(format!(
                    "Failed to save analysis results: {reduced}"
                )));
            }
        }

        self.snapshot()
    }

    /// Back to `Idle`, dropping the draft, document and analysis ids. Any
    /// request still in flight is ignored when it returns.
    pub fn reset(&self) -> LifecycleSnapshot {
        {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = LifecycleState::Idle;
            inner.document_id = None;
            inner.analysis_id = None;
            inner.draft = None;
            inner.saving = false;
            inner.updated_at = Utc::now();
        }
        info!(subject = %self.subject.id, "analysis reset");
        self.snapshot()
    }

    /// Resolves the record id behind `link` for the current analysis.
    pub fn related_record(&self, link: RelatedLink) -> Option<String> {
        let inner = self.lock();
        let related = inner.state.model().map(|m| &m.related);
        let own_id =
            |kind: SubjectKind| (self.subject.kind == kind).then(|| self.subject.id.clone());

        match link {
            RelatedLink::Analysis => inner
                .analysis_id
                .clone()
                .or_else(|| own_id(SubjectKind::AnalysisRecord)),
            RelatedLink::Candidate => related
                .and_then(|r| r.candidate_id.clone())
                .or_else(|| own_id(SubjectKind::Candidate)),
            RelatedLink::Position => related.and_then(|r| r.position_id.clone()),
            RelatedLink::JobApplication => related
                .and_then(|r| r.job_application_id.clone())
                .or_else(|| own_id(SubjectKind::JobApplication)),
        }
    }

    /// Asks the host to open the linked record. No-op when the link is unset.
    pub fn open_related(&self, link: RelatedLink) -> Option<String> {
        let record_id = self.related_record(link);
        match &record_id {
            Some(id) => self.context.navigator.navigate_to_record(id),
            None => warn!(subject = %self.subject.id, ?link, "no record id to navigate to"),
        }
        record_id
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new generation and enters `Loading`.
    fn begin(&self, document_id: Option<String>) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = LifecycleState::Loading;
        if let Some(document_id) = document_id {
            inner.document_id = Some(document_id);
        }
        inner.updated_at = Utc::now();
        inner.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Applies `update` only if `generation` is still current.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(
                subject = %self.subject.id,
                stale = generation,
                current = inner.generation,
                "ignoring superseded response"
            );
            return false;
        }
        update(&mut *inner);
        inner.updated_at = Utc::now();
        true
    }

    fn fail(&self, generation: u64, state_message: String, notice: String) {
        if self.apply(generation, |inner| inner.state = LifecycleState::Error(state_message)) {
            self.context.notifier.notify(Notification::error(notice));
        }
    }

    fn prepare_persist(&self, draft: Option<Value>) -> Result<(Value, u64, bool), &'static str> {
        if self.subject.id.trim().is_empty() {
            return Err(MISSING_RECORD_ID);
        }

        let mut inner = self.lock();
        if let Some(draft) = draft {
            if !draft.is_object() {
                return Err(INVALID_DRAFT);
            }
            inner.draft = Some(draft);
        }

        let payload = match (&inner.draft, inner.state.model()) {
            (Some(draft), _) => coerce_draft(draft, &self.subject).ok_or(INVALID_DRAFT)?,
            (None, Some(model)) => payload_from_model(model, &self.subject),
            (None, None) => return Err(NOTHING_TO_SAVE),
        };

        let from_draft = inner.draft.is_some();
        inner.saving = true;
        inner.updated_at = Utc::now();
        Ok((payload, inner.generation, from_draft))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators shared by lifecycle, registry and route tests.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Notify;

    use super::LifecycleContext;
    use crate::backend::{AnalysisBackend, ServiceError};
    use crate::lifecycle::events::{Navigator, Notification, Notifier};

    fn fault(body: &Value) -> ServiceError {
        ServiceError::Fault {
            status: 500,
            body: body.clone(),
        }
    }

    /// Signals `.0` when a call reaches it, then waits for `.1`.
    pub type Gate = (Arc<Notify>, Arc<Notify>);

    async fn pass(gate: &Option<Gate>) {
        if let Some((started, release)) = gate {
            started.notify_one();
            release.notified().await;
        }
    }

    /// Scripted backend. `Err` values are fault bodies.
    #[derive(Default)]
    pub struct FakeBackend {
        pub latest: Mutex<HashMap<String, Result<Option<String>, Value>>>,
        pub records: Mutex<HashMap<String, Value>>,
        pub analysis: Mutex<Option<Result<Value, Value>>>,
        pub forced_analysis: Mutex<Option<Result<Value, Value>>>,
        pub persist_result: Mutex<Option<Result<String, Value>>>,
        /// Holds non-forced analyses.
        pub gate: Option<Gate>,
        /// Holds latest-analysis lookups.
        pub lookup_gate: Option<Gate>,
        /// Holds saves.
        pub persist_gate: Option<Gate>,
        pub calls: Mutex<Vec<String>>,
        pub persisted: Mutex<Vec<Value>>,
    }

    impl FakeBackend {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record_call(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl AnalysisBackend for FakeBackend {
        async fn find_latest_analysis(
            &self,
            subject_id: &str,
        ) -> Result<Option<String>, ServiceError> {
            self.record_call(format!("find:{subject_id}"));
            pass(&self.lookup_gate).await;
            match self.latest.lock().unwrap().get(subject_id).cloned() {
                Some(Ok(found)) => Ok(found),
                Some(Err(body)) => Err(fault(&body)),
                None => Ok(None),
            }
        }

        async fn fetch_analysis(&self, analysis_id: &str) -> Result<Value, ServiceError> {
            self.record_call(format!("fetch:{analysis_id}"));
            self.records
                .lock()
                .unwrap()
                .get(analysis_id)
                .cloned()
                .ok_or_else(|| fault(&serde_json::json!({"message": "record not found"})))
        }

        async fn analyze_resume(
            &self,
            document_id: &str,
            position_id: Option<&str>,
            bypass_cache: bool,
        ) -> Result<Value, ServiceError> {
            self.record_call(format!(
                "analyze:{document_id}:{}:{bypass_cache}",
                position_id.unwrap_or("-")
            ));
            if !bypass_cache {
                pass(&self.gate).await;
            }
            let scripted = if bypass_cache {
                self.forced_analysis.lock().unwrap().clone()
            } else {
                self.analysis.lock().unwrap().clone()
            };
            match scripted {
                Some(Ok(raw)) => Ok(raw),
                Some(Err(body)) => Err(fault(&body)),
                None => Err(ServiceError::Decode("no scripted analysis".to_string())),
            }
        }

        async fn persist_analysis(
            &self,
            subject_id: &str,
            payload: &Value,
        ) -> Result<String, ServiceError> {
            self.record_call(format!("persist:{subject_id}"));
            self.persisted.lock().unwrap().push(payload.clone());
            pass(&self.persist_gate).await;
            match self.persist_result.lock().unwrap().clone() {
                Some(Ok(id)) => Ok(id),
                Some(Err(body)) => Err(fault(&body)),
                None => Err(ServiceError::Decode("no scripted save".to_string())),
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier(pub Mutex<Vec<Notification>>);

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|n| n.message.clone()).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    #[derive(Default)]
    pub struct RecordingNavigator(pub Mutex<Vec<String>>);

    impl Navigator for RecordingNavigator {
        fn navigate_to_record(&self, record_id: &str) {
            self.0.lock().unwrap().push(record_id.to_string());
        }
    }

    pub struct Harness {
        pub backend: Arc<FakeBackend>,
        pub notifier: Arc<RecordingNotifier>,
        pub navigator: Arc<RecordingNavigator>,
        pub context: LifecycleContext,
    }

    pub fn harness(backend: FakeBackend) -> Harness {
        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let context = LifecycleContext {
            backend: backend.clone(),
            notifier: notifier.clone(),
            navigator: navigator.clone(),
            event_capacity: 16,
        };
        Harness {
            backend,
            notifier,
            navigator,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{harness, FakeBackend, Gate};
    use super::*;
    use crate::analysis::model::RecommendationLevel;
    use crate::lifecycle::events::Severity;
    use serde_json::json;
    use tokio::sync::{broadcast::error::TryRecvError, Notify};

    fn candidate() -> Subject {
        Subject::new("a01CAND", SubjectKind::Candidate)
    }

    fn score_of(snapshot: &LifecycleSnapshot) -> Option<f64> {
        snapshot.state.model().map(|m| m.match_score_percent)
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(candidate(), h.context);
        assert_eq!(lc.snapshot().state, LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_load_analysis_record_skips_lookup() {
        let backend = FakeBackend::default();
        backend
            .records
            .lock()
            .unwrap()
            .insert("a0X1".to_string(), json!({"MatchScore__c": 82, "Certifications__c": "CKA"}));
        let h = harness(backend);
        let subject = Subject::new("a0X1", SubjectKind::AnalysisRecord);
        let lc = AnalysisLifecycle::new(subject, h.context);

        let snapshot = lc.load().await;
        assert_eq!(score_of(&snapshot), Some(82.0));
        assert_eq!(snapshot.analysis_id.as_deref(), Some("a0X1"));
        assert_eq!(h.backend.calls(), vec!["fetch:a0X1"]);
    }

    #[tokio::test]
    async fn test_load_candidate_resolves_latest() {
        let backend = FakeBackend::default();
        backend
            .latest
            .lock()
            .unwrap()
            .insert("a01CAND".to_string(), Ok(Some("a0X9".to_string())));
        backend.records.lock().unwrap().insert(
            "a0X9".to_string(),
            json!({"MatchScore__c": 0.61, "MatchingSkills__c": "Java"}),
        );
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.load().await;
        let model = snapshot.state.model().expect("ready");
        assert!((model.match_score_percent - 61.0).abs() < 1e-9);
        assert_eq!(model.recommendation_level, RecommendationLevel::Recommended);
        assert_eq!(h.backend.calls(), vec!["find:a01CAND", "fetch:a0X9"]);
    }

    #[tokio::test]
    async fn test_load_without_analysis_is_error() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.load().await;
        assert_eq!(snapshot.state, LifecycleState::Error(NO_ANALYSIS_FOUND.to_string()));
        assert_eq!(h.notifier.messages(), vec![NO_ANALYSIS_FOUND]);
    }

    #[tokio::test]
    async fn test_load_failure_is_reduced() {
        let backend = FakeBackend::default();
        backend.latest.lock().unwrap().insert(
            "a01CAND".to_string(),
            Err(json!({"message": "INSUFFICIENT_ACCESS"})),
        );
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.load().await;
        assert_eq!(
            snapshot.state,
            LifecycleState::Error("Error loading analysis: INSUFFICIENT_ACCESS".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_unsupported_kind_makes_no_call() {
        let h = harness(FakeBackend::default());
        let subject = Subject::new("001ACC", SubjectKind::Unsupported("Account".to_string()));
        let lc = AnalysisLifecycle::new(subject, h.context);

        let snapshot = lc.load().await;
        assert_eq!(
            snapshot.state,
            LifecycleState::Error("Unsupported object type: Account".to_string())
        );
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_passes_position_for_job_application() {
        let backend = FakeBackend::default();
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 70})));
        let h = harness(backend);
        let subject = Subject::new("a02APP", SubjectKind::JobApplication);
        let lc = AnalysisLifecycle::new(subject, h.context);

        lc.analyze_document("069DOC", false).await;
        assert_eq!(h.backend.calls(), vec!["analyze:069DOC:a02APP:false"]);
    }

    #[tokio::test]
    async fn test_analyze_success_emits_completion() {
        let backend = FakeBackend::default();
        *backend.analysis.lock().unwrap() =
            Some(Ok(json!({"matchScore": "88", "matchedSkills": ["Rust"]})));
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);
        let mut events = lc.subscribe();

        let snapshot = lc.analyze_document(" 069DOC ", false).await;
        assert_eq!(score_of(&snapshot), Some(88.0));
        assert_eq!(snapshot.document_id.as_deref(), Some("069DOC"));
        assert_eq!(h.backend.calls(), vec!["analyze:069DOC:-:false"]);

        match events.try_recv() {
            Ok(AnalysisEvent::AnalysisComplete { success, model }) => {
                assert!(success);
                assert_eq!(model.matched_skills, vec!["Rust"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let notes = h.notifier.0.lock().unwrap().clone();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn test_analyze_failure_sets_error_and_notifies() {
        let backend = FakeBackend::default();
        *backend.analysis.lock().unwrap() = Some(Err(json!({"message": "Document is empty"})));
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);
        let mut events = lc.subscribe();

        let snapshot = lc.analyze_document("069DOC", false).await;
        assert_eq!(snapshot.state, LifecycleState::Error("Document is empty".to_string()));
        assert_eq!(
            h.notifier.messages(),
            vec!["An error occurred during CV analysis: Document is empty"]
        );
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_analyze_without_document_is_user_error() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.analyze_document("   ", false).await;
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(h.notifier.messages(), vec![NO_DOCUMENT]);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_force_reanalyze_reuses_document() {
        let backend = FakeBackend::default();
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 40})));
        *backend.forced_analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 55})));
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        lc.analyze_document("069DOC", false).await;
        let snapshot = lc.force_reanalyze().await;
        assert_eq!(score_of(&snapshot), Some(55.0));
        assert_eq!(
            h.backend.calls(),
            vec!["analyze:069DOC:-:false", "analyze:069DOC:-:true"]
        );
    }

    #[tokio::test]
    async fn test_force_reanalyze_without_document() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.force_reanalyze().await;
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(h.notifier.messages(), vec![NO_DOCUMENT_TO_REANALYZE]);
    }

    #[tokio::test]
    async fn test_newer_analysis_supersedes_in_flight_one() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = FakeBackend {
            gate: Some((started.clone(), release.clone())),
            ..FakeBackend::default()
        };
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 10})));
        *backend.forced_analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 90})));
        let h = harness(backend);
        let lc = Arc::new(AnalysisLifecycle::new(candidate(), h.context));
        let mut events = lc.subscribe();

        let first = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.analyze_document("docA", false).await })
        };
        started.notified().await;

        let second = lc.analyze_document("docA", true).await;
        assert_eq!(score_of(&second), Some(90.0));

        release.notify_one();
        first.await.expect("first task");

        assert_eq!(score_of(&lc.snapshot()), Some(90.0));
        match events.try_recv() {
            Ok(AnalysisEvent::AnalysisComplete { model, .. }) => {
                assert_eq!(model.match_score_percent, 90.0)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_response() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = FakeBackend {
            gate: Some((started.clone(), release.clone())),
            ..FakeBackend::default()
        };
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 10})));
        let h = harness(backend);
        let lc = Arc::new(AnalysisLifecycle::new(candidate(), h.context));

        let pending = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.analyze_document("docA", false).await })
        };
        started.notified().await;

        let snapshot = lc.reset();
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(snapshot.document_id, None);

        release.notify_one();
        pending.await.expect("pending task");
        assert_eq!(lc.snapshot().state, LifecycleState::Idle);
        assert!(h.notifier.messages().is_empty());
    }

    fn gated_load_backend(gate: Gate) -> FakeBackend {
        let backend = FakeBackend {
            lookup_gate: Some(gate),
            ..FakeBackend::default()
        };
        backend
            .latest
            .lock()
            .unwrap()
            .insert("a01CAND".to_string(), Ok(Some("a0X1".to_string())));
        backend.records.lock().unwrap().insert(
            "a0X1".to_string(),
            json!({"MatchScore__c": 20, "Certifications__c": null}),
        );
        backend
    }

    #[tokio::test]
    async fn test_analyze_supersedes_in_flight_load() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = gated_load_backend((started.clone(), release.clone()));
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 90})));
        let h = harness(backend);
        let lc = Arc::new(AnalysisLifecycle::new(candidate(), h.context));

        let pending = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.load().await })
        };
        started.notified().await;

        let analyzed = lc.analyze_document("docB", false).await;
        assert_eq!(score_of(&analyzed), Some(90.0));

        release.notify_one();
        let after_load = pending.await.expect("load task");
        assert_eq!(score_of(&after_load), Some(90.0));

        let snapshot = lc.snapshot();
        assert_eq!(score_of(&snapshot), Some(90.0));
        assert_eq!(snapshot.analysis_id, None);
        assert_eq!(snapshot.document_id.as_deref(), Some("docB"));
        assert!(!h.backend.calls().iter().any(|c| c.starts_with("fetch:")));
        assert_eq!(h.notifier.messages(), vec!["CV analysis completed successfully"]);
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_load() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let h = harness(gated_load_backend((started.clone(), release.clone())));
        let lc = Arc::new(AnalysisLifecycle::new(candidate(), h.context));

        let pending = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.load().await })
        };
        started.notified().await;
        assert_eq!(lc.snapshot().state, LifecycleState::Loading);

        lc.reset();
        release.notify_one();
        pending.await.expect("load task");

        let snapshot = lc.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(snapshot.analysis_id, None);
        assert_eq!(h.backend.calls(), vec!["find:a01CAND"]);
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_save_finishing_after_newer_analysis_keeps_state() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = FakeBackend {
            persist_gate: Some((started.clone(), release.clone())),
            ..FakeBackend::default()
        };
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 40})));
        *backend.forced_analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 90})));
        *backend.persist_result.lock().unwrap() = Some(Ok("a0SAVED".to_string()));
        let h = harness(backend);
        let lc = Arc::new(AnalysisLifecycle::new(candidate(), h.context));
        let mut events = lc.subscribe();

        lc.analyze_document("docA", false).await;
        let pending = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.persist(Some(json!({"matchScore": 55}))).await })
        };
        started.notified().await;
        assert!(lc.snapshot().saving);

        let reanalyzed = lc.force_reanalyze().await;
        assert_eq!(score_of(&reanalyzed), Some(90.0));

        release.notify_one();
        let saved = pending.await.expect("persist task");
        assert_eq!(score_of(&saved), Some(90.0));
        assert_eq!(saved.draft, None);
        assert_eq!(saved.analysis_id, None);
        assert!(!saved.saving);

        let persisted = h.backend.persisted.lock().unwrap().clone();
        assert_eq!(persisted[0]["matchScore"], json!(55));

        let received: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| match event {
                AnalysisEvent::AnalysisComplete { model, .. } => {
                    format!("complete:{}", model.match_score_percent)
                }
                AnalysisEvent::AnalysisSaved { analysis_record_id, .. } => {
                    format!("saved:{analysis_record_id}")
                }
            })
            .collect();
        assert_eq!(received, vec!["complete:40", "complete:90", "saved:a0SAVED"]);
    }

    #[tokio::test]
    async fn test_stale_save_still_announces_record() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = FakeBackend {
            persist_gate: Some((started.clone(), release.clone())),
            ..FakeBackend::default()
        };
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 40})));
        *backend.persist_result.lock().unwrap() = Some(Ok("a0SAVED".to_string()));
        let h = harness(backend);
        let lc = Arc::new(AnalysisLifecycle::new(candidate(), h.context));

        lc.analyze_document("docA", false).await;
        let mut events = lc.subscribe();
        let pending = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.persist(None).await })
        };
        started.notified().await;

        lc.reset();
        release.notify_one();
        let saved = pending.await.expect("persist task");

        assert_eq!(saved.state, LifecycleState::Idle);
        assert_eq!(saved.analysis_id, None);
        match events.try_recv() {
            Ok(AnalysisEvent::AnalysisSaved { success, analysis_record_id }) => {
                assert!(success);
                assert_eq!(analysis_record_id, "a0SAVED");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            h.notifier.messages().last().map(String::as_str),
            Some("Analysis results saved successfully")
        );
    }

    #[tokio::test]
    async fn test_persist_model_success() {
        let backend = FakeBackend::default();
        *backend.analysis.lock().unwrap() =
            Some(Ok(json!({"matchScore": 77, "matchedSkills": "Rust"})));
        *backend.persist_result.lock().unwrap() = Some(Ok("a0XNEW".to_string()));
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);
        let mut events = lc.subscribe();

        lc.analyze_document("069DOC", false).await;
        let snapshot = lc.persist(None).await;

        assert_eq!(snapshot.analysis_id.as_deref(), Some("a0XNEW"));
        assert_eq!(score_of(&snapshot), Some(77.0));
        assert!(!snapshot.saving);

        let persisted = h.backend.persisted.lock().unwrap().clone();
        assert_eq!(persisted[0]["matchedSkills"], json!(["Rust"]));
        assert_eq!(persisted[0]["recordId"], json!("a01CAND"));

        let _complete = events.try_recv();
        match events.try_recv() {
            Ok(AnalysisEvent::AnalysisSaved { success, analysis_record_id }) => {
                assert!(success);
                assert_eq!(analysis_record_id, "a0XNEW");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_model_and_draft() {
        let backend = FakeBackend::default();
        *backend.analysis.lock().unwrap() = Some(Ok(json!({"matchScore": 64})));
        *backend.persist_result.lock().unwrap() = Some(Err(json!({
            "message": "failed to save analysis results: Duplicate value"
        })));
        let h = harness(backend);
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let before = lc.analyze_document("069DOC", false).await;
        let draft = json!({"matchScore": "70", "matchedSkills": "Go"});
        let after = lc.persist(Some(draft.clone())).await;

        assert_eq!(after.state, before.state);
        assert_eq!(after.draft, Some(draft));
        assert!(!after.saving);
        assert_eq!(
            h.notifier.messages().last().map(String::as_str),
            Some("Failed to save analysis results: Duplicate value")
        );

        // retry without re-entering the draft
        *h.backend.persist_result.lock().unwrap() = Some(Ok("a0XOK".to_string()));
        let retried = lc.persist(None).await;
        assert_eq!(retried.analysis_id.as_deref(), Some("a0XOK"));
        assert_eq!(retried.draft, None);
        assert_eq!(score_of(&retried), Some(70.0));
        let persisted = h.backend.persisted.lock().unwrap().clone();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[1]["matchedSkills"], json!(["Go"]));
        assert_eq!(persisted[1]["matchScore"], json!(70.0));
    }

    #[tokio::test]
    async fn test_persist_without_anything_is_user_error() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.persist(None).await;
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(h.notifier.messages(), vec![NOTHING_TO_SAVE]);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_persist_rejects_non_object_draft() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(candidate(), h.context);

        let snapshot = lc.persist(Some(json!("not a draft"))).await;
        assert_eq!(snapshot.draft, None);
        assert_eq!(h.notifier.messages(), vec![INVALID_DRAFT]);
    }

    #[tokio::test]
    async fn test_persist_requires_record_id() {
        let h = harness(FakeBackend::default());
        let lc = AnalysisLifecycle::new(Subject::new("", SubjectKind::Candidate), h.context);

        lc.persist(Some(json!({"matchScore": 1}))).await;
        assert_eq!(h.notifier.messages(), vec![MISSING_RECORD_ID]);
    }

    #[tokio::test]
    async fn test_open_related_navigates_to_linked_record() {
        let backend = FakeBackend::default();
        backend.records.lock().unwrap().insert(
            "a0X1".to_string(),
            json!({
                "MatchScore__c": 50,
                "Certifications__c": null,
                "Candidate__c": "a01C",
                "Position__c": "a03P"
            }),
        );
        let h = harness(backend);
        let subject = Subject::new("a0X1", SubjectKind::AnalysisRecord);
        let lc = AnalysisLifecycle::new(subject, h.context);
        lc.load().await;

        assert_eq!(lc.open_related(RelatedLink::Candidate).as_deref(), Some("a01C"));
        assert_eq!(lc.open_related(RelatedLink::Position).as_deref(), Some("a03P"));
        assert_eq!(lc.open_related(RelatedLink::JobApplication), None);
        assert_eq!(lc.open_related(RelatedLink::Analysis).as_deref(), Some("a0X1"));
        assert_eq!(
            h.navigator.0.lock().unwrap().clone(),
            vec!["a01C", "a03P", "a0X1"]
        );
    }
}
