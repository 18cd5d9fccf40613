//! Result normalizer: turns a raw analysis payload of any known historical
//! shape into an [`AnalysisModel`]. Total: malformed or missing fields degrade
//! to defaults, nothing here returns an error.

use serde_json::Value;
use tracing::debug;

use crate::analysis::extract::{education, line_list, parse_score, skill_list, text};
use crate::analysis::model::{
    AnalysisModel, RecommendationLevel, RecommendationSource, RelatedRecords,
};
use crate::analysis::shape::{first_present, PayloadShape};

pub fn normalize(raw: &Value) -> AnalysisModel {
    let shape = PayloadShape::detect(raw);
    let fields = shape.fields();
    let get = |keys: &'static [&'static str]| first_present(raw, keys);

    let match_score_percent = score_percent(get(fields.score), shape);

    let (recommendation_level, recommendation_source) =
        match explicit_level(get(fields.recommendation_level)) {
            Some(level) => (level, RecommendationSource::Payload),
            None => (
                RecommendationLevel::from_score(match_score_percent),
                RecommendationSource::Derived,
            ),
        };

    let recommendations = text(get(fields.recommendations))
        .unwrap_or_else(|| recommendation_level.narrative().to_string());

    let model = AnalysisModel {
        match_score_percent,
        matched_skills: skill_list(get(fields.matched_skills)),
        missing_skills: skill_list(get(fields.missing_skills)),
        additional_skills: skill_list(get(fields.additional_skills)),
        skills: skill_list(get(fields.skills)),
        key_highlights: line_list(get(fields.key_highlights)),
        potential_concerns: line_list(get(fields.potential_concerns)),
        certifications: line_list(get(fields.certifications)),
        recommendation_level,
        recommendation_source,
        recommendations,
        candidate_name: identity(raw, "candidateName", "name"),
        candidate_email: identity(raw, "candidateEmail", "email"),
        education_summary: education(raw.get("education")),
        summary: text(get(fields.summary)).unwrap_or_default(),
        related: RelatedRecords {
            candidate_id: text(get(fields.candidate_id)),
            position_id: text(get(fields.position_id)),
            job_application_id: text(get(fields.job_application_id)),
        },
        shape,
        raw: raw.clone(),
    };

    debug!(
        shape = ?model.shape,
        score = model.match_score_percent,
        level = ?model.recommendation_level,
        matched = model.matched_skills.len(),
        missing = model.missing_skills.len(),
        highlights = model.key_highlights.len(),
        "normalized analysis payload"
    );

    model
}

fn score_percent(value: Option<&Value>, shape: PayloadShape) -> f64 {
    let Some(score) = parse_score(value) else {
        return 0.0;
    };
    // v1 records store a fraction; anything above 1 was already written as a percentage
    let score = if shape.fractional_score() && score <= 1.0 {
        score * 100.0
    } else {
        score
    };
    score.clamp(0.0, 100.0)
}

fn explicit_level(value: Option<&Value>) -> Option<RecommendationLevel> {
    let label = match value? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    RecommendationLevel::parse(&label)
}

/// Direct field first, then `personalInfo.<nested>`.
fn identity(raw: &Value, direct: &str, nested: &str) -> String {
    text(raw.get(direct))
        .or_else(|| text(raw.get("personalInfo").and_then(|p| p.get(nested))))
        .unwrap_or_default()
}
