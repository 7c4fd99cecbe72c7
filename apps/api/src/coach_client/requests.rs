//! Request bodies for the interview service. Every body is POSTed to the same
//! endpoint and discriminated by its `action` field.

use serde::Serialize;
use uuid::Uuid;

use crate::models::setup::{ExperienceLevel, HiringMarket, SessionSetup};
use crate::models::transcript::Turn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServiceRequest<'a> {
    GenerateQuestion(&'a QuestionRequest),
    EvaluateAnswer(&'a EvaluationRequest),
    GetAnswerGuidance(&'a GuidanceRequest),
    GenerateSummary(&'a SummaryRequest),
}

impl ServiceRequest<'_> {
    pub fn action(&self) -> &'static str {
        match self {
            ServiceRequest::GenerateQuestion(_) => "generate_question",
            ServiceRequest::EvaluateAnswer(_) => "evaluate_answer",
            ServiceRequest::GetAnswerGuidance(_) => "get_answer_guidance",
            ServiceRequest::GenerateSummary(_) => "generate_summary",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    #[serde(flatten)]
    pub setup: SessionSetup,
    /// Prior turns for follow-up coherence. Omitted for the opening question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Turn>>,
    pub user_id: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    #[serde(flatten)]
    pub setup: SessionSetup,
    pub question: String,
    pub answer: String,
    pub user_id: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceRequest {
    pub question: String,
    pub answer: String,
    pub job_role: String,
    pub experience_level: ExperienceLevel,
    pub user_id: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub job_role: String,
    pub country: HiringMarket,
    pub full_session: String,
    pub user_id: String,
    pub session_id: Uuid,
    pub answer_count: usize,
    pub question_count: usize,
}
