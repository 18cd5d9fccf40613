use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::shape::PayloadShape;

/// Canonical 4-tier recommendation scale. The legacy 3-tier
/// `High`/`Medium`/`Low` labels map onto it when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecommendationLevel {
    NotRecommended,
    Consider,
    Recommended,
    HighlyRecommended,
}

impl RecommendationLevel {
    /// ≥80 HighlyRecommended, ≥60 Recommended, ≥40 Consider, else NotRecommended.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RecommendationLevel::HighlyRecommended
        } else if score >= 60.0 {
            RecommendationLevel::Recommended
        } else if score >= 40.0 {
            RecommendationLevel::Consider
        } else {
            RecommendationLevel::NotRecommended
        }
    }

    /// Parses an explicit level, ignoring case, whitespace, `_` and `-`.
    /// Returns `None` for unknown labels (including the placeholder "None").
    pub fn parse(label: &str) -> Option<Self> {
        let key: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "highlyrecommended" | "high" => Some(RecommendationLevel::HighlyRecommended),
            "recommended" | "medium" => Some(RecommendationLevel::Recommended),
            "consider" => Some(RecommendationLevel::Consider),
            "notrecommended" | "low" => Some(RecommendationLevel::NotRecommended),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecommendationLevel::HighlyRecommended => "Highly Recommended",
            RecommendationLevel::Recommended => "Recommended",
            RecommendationLevel::Consider => "Consider",
            RecommendationLevel::NotRecommended => "Not Recommended",
        }
    }

    /// Fallback narrative used when the payload carries none.
    pub fn narrative(&self) -> &'static str {
        match self {
            RecommendationLevel::HighlyRecommended => {
                "This candidate has strong skills that match the job requirements. Recommend scheduling a technical interview."
            }
            RecommendationLevel::Recommended => {
                "This candidate has relevant skills but may need additional training. Consider a preliminary interview to assess potential."
            }
            RecommendationLevel::Consider => {
                "This candidate covers part of the requirements. Further assessment is advised before moving forward."
            }
            RecommendationLevel::NotRecommended => {
                "This candidate does not match the key requirements for this position. Consider for other roles."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Payload,
    Derived,
}

/// Display severity of a match score: ≥80 High, ≥60 Medium, else Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSeverity {
    Low,
    Medium,
    High,
}

impl ScoreSeverity {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ScoreSeverity::High
        } else if score >= 60.0 {
            ScoreSeverity::Medium
        } else {
            ScoreSeverity::Low
        }
    }
}

/// Record links carried by a persisted analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRecords {
    pub candidate_id: Option<String>,
    pub position_id: Option<String>,
    pub job_application_id: Option<String>,
}

/// Normalized, presentation-ready analysis. Built only by
/// [`crate::analysis::normalize::normalize`]; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisModel {
    pub match_score_percent: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub additional_skills: Vec<String>,
    pub skills: Vec<String>,
    pub key_highlights: Vec<String>,
    pub potential_concerns: Vec<String>,
    pub certifications: Vec<String>,
    pub recommendation_level: RecommendationLevel,
    pub recommendation_source: RecommendationSource,
    pub recommendations: String,
    pub candidate_name: String,
    pub candidate_email: String,
    pub education_summary: String,
    pub summary: String,
    pub related: RelatedRecords,
    pub shape: PayloadShape,
    pub raw: Value,
}

impl AnalysisModel {
    pub fn formatted_score(&self) -> String {
        format!("{}%", self.match_score_percent.round() as i64)
    }

    pub fn score_severity(&self) -> ScoreSeverity {
        ScoreSeverity::from_score(self.match_score_percent)
    }

    pub fn recommendation_label(&self) -> &'static str {
        self.recommendation_level.label()
    }

    pub fn has_candidate_details(&self) -> bool {
        !self.candidate_name.is_empty()
            || !self.candidate_email.is_empty()
            || !self.education_summary.is_empty()
    }
}

/// Model plus the derived display fields, as served over HTTP.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    #[serde(flatten)]
    pub model: AnalysisModel,
    pub match_score_formatted: String,
    pub score_severity: ScoreSeverity,
    pub recommendation_label: &'static str,
    pub has_candidate_details: bool,
}

impl From<AnalysisModel> for AnalysisView {
    fn from(model: AnalysisModel) -> Self {
        Self {
            match_score_formatted: model.formatted_score(),
            score_severity: model.score_severity(),
            recommendation_label: model.recommendation_label(),
            has_candidate_details: model.has_candidate_details(),
            model,
        }
    }
}
