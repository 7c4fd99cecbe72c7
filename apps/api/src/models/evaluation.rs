use serde::{Deserialize, Serialize};

/// Per-answer evaluation returned by the evaluation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_sample_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actionable_steps: Option<Vec<String>>,
    /// Suggested follow-up. The controller always asks the generation service instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
}

/// In-progress coaching for the current draft. Replaced, never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerGuidance {
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub tips: Vec<String>,
}

/// Terminal artifact of a practice session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub readiness_score: f64,
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub strength_areas: Vec<String>,
    #[serde(default)]
    pub weak_areas: Vec<String>,
    #[serde(default)]
    pub key_improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReadinessReport {
    pub fn is_error(&self) -> bool {
        self.error.unwrap_or(false)
    }
}
