//! Serialization of a model or a user-edited draft into the payload accepted
//! by the persistence call.

use serde_json::{json, Map, Value};

use crate::analysis::extract::parse_score;
use crate::analysis::model::AnalysisModel;
use crate::lifecycle::state::Subject;

/// Fields the persistence call requires to be arrays.
const ARRAY_FIELDS: &[&str] = &[
    "matchedSkills",
    "missingSkills",
    "additionalSkills",
    "keyHighlights",
    "potentialConcerns",
    "certifications",
];

/// Builds the persistence payload from a normalized model.
pub fn payload_from_model(model: &AnalysisModel, subject: &Subject) -> Value {
    json!({
        "matchScore": model.match_score_percent,
        "matchedSkills": model.matched_skills,
        "missingSkills": model.missing_skills,
        "additionalSkills": model.additional_skills,
        "keyHighlights": model.key_highlights,
        "potentialConcerns": model.potential_concerns,
        "certifications": model.certifications,
        "analysisSummary": model.summary,
        "summary": model.summary,
        "recommendationLevel": model.recommendation_label(),
        "recommendations": model.recommendations,
        "candidateName": model.candidate_name,
        "candidateEmail": model.candidate_email,
        "education": model.education_summary,
        "recordId": subject.id,
        "objectApiName": subject.kind.api_name(),
    })
}

/// Coerces a user-edited draft into the persistence payload. Returns `None`
/// when the draft is not a JSON object.
pub fn coerce_draft(draft: &Value, subject: &Subject) -> Option<Value> {
    let mut fields: Map<String, Value> = draft.as_object()?.clone();

    for key in ARRAY_FIELDS {
        if let Some(value) = fields.get_mut(*key) {
            if !value.is_array() && !is_blank(value) {
                let scalar = value.take();
                *value = Value::Array(vec![scalar]);
            }
        }
    }

    if let Some(level) = fields.get_mut("recommendationLevel") {
        match level {
            Value::String(_) | Value::Null => {}
            other => *other = Value::String(scalar_to_string(other)),
        }
    }

    if let Some(score) = fields.get_mut("matchScore") {
        if score.is_string() {
            let parsed = parse_score(Some(&*score)).and_then(serde_json::Number::from_f64);
            if let Some(parsed) = parsed {
                *score = Value::Number(parsed);
            }
        }
    }

    let summary_missing = fields.get("summary").map_or(true, is_blank);
    if summary_missing {
        if let Some(summary) = fields.get("analysisSummary").filter(|v| !is_blank(v)).cloned() {
            fields.insert("summary".to_string(), summary);
        }
    }

    fields.insert("recordId".to_string(), Value::String(subject.id.clone()));
    fields.insert(
        "objectApiName".to_string(),
        Value::String(subject.kind.api_name().to_string()),
    );

    Some(Value::Object(fields))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
