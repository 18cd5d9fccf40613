//! Payload shape detection.
//!
//! The analysis payload has gone through several historical shapes. Rather than
//! probing arbitrary properties, each known shape gets an explicit field table
//! and the normalizer only ever reads the keys listed there.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A known historical shape of the raw analysis payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// camelCase response returned directly by the resume analyzer.
    #[default]
    AnalyzerResponse,
    /// First persisted record projection; `MatchScore__c` is a 0–1 fraction.
    AnalysisRecordV1,
    /// Current persisted record projection; `MatchScore__c` is a percentage.
    AnalysisRecordV2,
}

/// Which payload keys feed each model field, in priority order.
#[derive(Debug)]
pub struct FieldTable {
    pub score: &'static [&'static str],
    pub matched_skills: &'static [&'static str],
    pub missing_skills: &'static [&'static str],
    pub additional_skills: &'static [&'static str],
    pub skills: &'static [&'static str],
    pub summary: &'static [&'static str],
    pub recommendation_level: &'static [&'static str],
    pub recommendations: &'static [&'static str],
    pub key_highlights: &'static [&'static str],
    pub potential_concerns: &'static [&'static str],
    pub certifications: &'static [&'static str],
    pub candidate_id: &'static [&'static str],
    pub position_id: &'static [&'static str],
    pub job_application_id: &'static [&'static str],
}

const ANALYZER_FIELDS: FieldTable = FieldTable {
    score: &["matchScore", "matchScorePercent", "score"],
    matched_skills: &["matchedSkills", "matchingSkills"],
    missing_skills: &["missingSkills"],
    additional_skills: &["additionalSkills"],
    skills: &["skills"],
    summary: &["analysisSummary", "summary"],
    recommendation_level: &["recommendationLevel"],
    recommendations: &["recommendations"],
    key_highlights: &["keyHighlights"],
    potential_concerns: &["potentialConcerns"],
    certifications: &["certifications"],
    candidate_id: &[],
    position_id: &[],
    job_application_id: &[],
};

const RECORD_FIELDS: FieldTable = FieldTable {
    score: &["MatchScore__c"],
    matched_skills: &["MatchingSkills__c"],
    missing_skills: &["MissingSkills__c"],
    additional_skills: &["AdditionalSkills__c"],
    skills: &[],
    summary: &["AnalysisSummary__c"],
    recommendation_level: &["RecommendationLevel__c"],
    recommendations: &[],
    key_highlights: &["KeyHighlights__c"],
    potential_concerns: &["PotentialConcerns__c"],
    certifications: &["Certifications__c"],
    candidate_id: &["Candidate__c"],
    position_id: &["Position__c"],
    job_application_id: &["Job_Application__c"],
};

/// Keys that only ever appear on a persisted analysis record.
const RECORD_MARKERS: &[&str] = &[
    "MatchScore__c",
    "MatchingSkills__c",
    "MissingSkills__c",
    "AdditionalSkills__c",
    "AnalysisSummary__c",
    "RecommendationLevel__c",
    "KeyHighlights__c",
    "PotentialConcerns__c",
    "RawAnalysisResults__c",
    "Certifications__c",
];

impl PayloadShape {
    /// Inspects which known keys are present. Non-objects are treated as
    /// analyzer responses (they normalize to defaults either way).
    pub fn detect(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return PayloadShape::AnalyzerResponse;
        };

        if !RECORD_MARKERS.iter().any(|k| obj.contains_key(*k)) {
            return PayloadShape::AnalyzerResponse;
        }

        // The v1 projection predates the certifications column.
        if obj.contains_key("MatchScore__c") && !obj.contains_key("Certifications__c") {
            PayloadShape::AnalysisRecordV1
        } else {
            PayloadShape::AnalysisRecordV2
        }
    }

    pub fn fields(&self) -> &'static FieldTable {
        match self {
            PayloadShape::AnalyzerResponse => &ANALYZER_FIELDS,
            PayloadShape::AnalysisRecordV1 | PayloadShape::AnalysisRecordV2 => &RECORD_FIELDS,
        }
    }

    /// True when this shape stores the score as a 0–1 fraction.
    pub fn fractional_score(&self) -> bool {
        matches!(self, PayloadShape::AnalysisRecordV1)
    }
}

/// Returns the first non-null value among `keys`.
pub fn first_present<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| raw.get(*k))
        .find(|v| !v.is_null())
}
