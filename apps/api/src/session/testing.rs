//! Scripted `InterviewService` for session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::coach_client::requests::{
    EvaluationRequest, GuidanceRequest, QuestionRequest, SummaryRequest,
};
use crate::coach_client::{GeneratedQuestion, InterviewService, ServiceError};
use crate::models::evaluation::{AnswerGuidance, Feedback, ReadinessReport};
use crate::models::transcript::Turn;

/// One scripted outcome. Once a script runs out the service answers normally.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(String),
    RateLimited,
    Fail,
}

impl Scripted {
    fn into_error(self) -> Option<ServiceError> {
        match self {
            Scripted::Ok(_) => None,
            Scripted::RateLimited => Some(ServiceError::RateLimited {
                code: Some("SESSION_LIMIT_REACHED".to_string()),
            }),
            Scripted::Fail => Some(ServiceError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum SummaryOutcome {
    Report(ReadinessReport),
    Incomplete,
    Fail,
}

pub struct ScriptedService {
    questions: Mutex<VecDeque<Scripted>>,
    evaluations: Mutex<VecDeque<Scripted>>,
    evaluation_delay: Duration,
    guidance_delay: Duration,
    guidance_fails: bool,
    summary: SummaryOutcome,

    question_histories: Mutex<Vec<Option<Vec<Turn>>>>,
    evaluation_calls: AtomicUsize,
    guidance_calls: AtomicUsize,
    last_guidance_answer: Mutex<Option<String>>,
    summary_calls: AtomicUsize,
    last_summary_request: Mutex<Option<SummaryRequest>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            questions: Mutex::new(VecDeque::new()),
            evaluations: Mutex::new(VecDeque::new()),
            evaluation_delay: Duration::ZERO,
            guidance_delay: Duration::ZERO,
            guidance_fails: false,
            summary: SummaryOutcome::Report(ReadinessReport {
                readiness_score: 70.0,
                verdict: "High Chance".to_string(),
                summary: "Solid, structured answers.".to_string(),
                strength_areas: vec!["Structure".to_string()],
                weak_areas: vec!["Metrics".to_string()],
                key_improvements: vec!["Quantify impact".to_string()],
                error: None,
                message: None,
            }),
            question_histories: Mutex::new(Vec::new()),
            evaluation_calls: AtomicUsize::new(0),
            guidance_calls: AtomicUsize::new(0),
            last_guidance_answer: Mutex::new(None),
            summary_calls: AtomicUsize::new(0),
            last_summary_request: Mutex::new(None),
        }
    }

    pub fn with_questions(self, script: Vec<Scripted>) -> Self {
        *self.questions.lock().unwrap() = script.into();
        self
    }

    pub fn with_evaluations(self, script: Vec<Scripted>) -> Self {
        *self.evaluations.lock().unwrap() = script.into();
        self
    }

    pub fn with_evaluation_delay(mut self, delay: Duration) -> Self {
        self.evaluation_delay = delay;
        self
    }

    pub fn with_guidance_delay(mut self, delay: Duration) -> Self {
        self.guidance_delay = delay;
        self
    }

    pub fn failing_guidance(mut self) -> Self {
        self.guidance_fails = true;
        self
    }

    pub fn with_summary(mut self, report: ReadinessReport) -> Self {
        self.summary = SummaryOutcome::Report(report);
        self
    }

    pub fn with_incomplete_summary(mut self) -> Self {
        self.summary = SummaryOutcome::Incomplete;
        self
    }

    pub fn failing_summary(mut self) -> Self {
        self.summary = SummaryOutcome::Fail;
        self
    }

    pub fn question_histories(&self) -> Vec<Option<Vec<Turn>>> {
        self.question_histories.lock().unwrap().clone()
    }

    pub fn evaluation_calls(&self) -> usize {
        self.evaluation_calls.load(Ordering::SeqCst)
    }

    pub fn guidance_calls(&self) -> usize {
        self.guidance_calls.load(Ordering::SeqCst)
    }

    pub fn last_guidance_answer(&self) -> Option<String> {
        self.last_guidance_answer.lock().unwrap().clone()
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn last_summary_request(&self) -> Option<SummaryRequest> {
        self.last_summary_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl InterviewService for ScriptedService {
    async fn generate_question(
        &self,
        req: &QuestionRequest,
    ) -> Result<GeneratedQuestion, ServiceError> {
        let asked = {
            let mut histories = self.question_histories.lock().unwrap();
            histories.push(req.history.clone());
            histories.len()
        };
        let scripted = self.questions.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Ok(question)) => Ok(GeneratedQuestion { question }),
            Some(other) => Err(other.into_error().unwrap_or(ServiceError::EmptyQuestion)),
            None => Ok(GeneratedQuestion {
                question: format!("Question {asked}"),
            }),
        }
    }

    async fn evaluate_answer(&self, req: &EvaluationRequest) -> Result<Feedback, ServiceError> {
        self.evaluation_calls.fetch_add(1, Ordering::SeqCst);
        if !self.evaluation_delay.is_zero() {
            tokio::time::sleep(self.evaluation_delay).await;
        }
        let scripted = self.evaluations.lock().unwrap().pop_front();
        if let Some(err) = scripted.and_then(Scripted::into_error) {
            return Err(err);
        }
        Ok(Feedback {
            score: 7.0,
            strengths: vec![format!("Answered: {}", req.question)],
            weaknesses: vec!["Add measurable results".to_string()],
            advice: "Use the STAR structure.".to_string(),
            improved_sample_answer: None,
            actionable_steps: None,
            next_question: None,
        })
    }

    async fn answer_guidance(
        &self,
        req: &GuidanceRequest,
    ) -> Result<AnswerGuidance, ServiceError> {
        self.guidance_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_guidance_answer.lock().unwrap() = Some(req.answer.clone());
        if !self.guidance_delay.is_zero() {
            tokio::time::sleep(self.guidance_delay).await;
        }
        if self.guidance_fails {
            return Err(ServiceError::Api {
                status: 503,
                message: "guidance unavailable".to_string(),
            });
        }
        Ok(AnswerGuidance {
            suggestion: "Mention the outcome".to_string(),
            tips: vec!["Be specific".to_string()],
        })
    }

    async fn generate_summary(
        &self,
        req: &SummaryRequest,
    ) -> Result<ReadinessReport, ServiceError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_summary_request.lock().unwrap() = Some(req.clone());
        match &self.summary {
            SummaryOutcome::Report(report) => Ok(report.clone()),
            SummaryOutcome::Incomplete => Err(ServiceError::IncompleteSession {
                message: None,
                summary: None,
            }),
            SummaryOutcome::Fail => Err(ServiceError::Api {
                status: 400,
                message: "summary rejected".to_string(),
            }),
        }
    }
}
