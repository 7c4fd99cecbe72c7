/// Interview service client: the single point of entry for every call to the
/// external AI interview service (question generation, answer evaluation,
/// answer guidance, session summary).
///
/// No other module talks to the service directly. The session engine depends on
/// the `InterviewService` trait so tests can swap in scripted backends.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod requests;

use crate::models::evaluation::{AnswerGuidance, Feedback, ReadinessReport};
use requests::{EvaluationRequest, GuidanceRequest, QuestionRequest, ServiceRequest, SummaryRequest};

/// Path of the action-dispatched interview endpoint on the service host.
pub const INTERVIEW_ENDPOINT_PATH: &str = "/api/interview-gyani";
/// Sentinel the summary service uses for sessions without answers.
pub const INCOMPLETE_SESSION_SENTINEL: &str = "INCOMPLETE_SESSION";
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Service returned an empty question")]
    EmptyQuestion,

    #[error("Quota exhausted{}", quota_suffix(.code))]
    RateLimited { code: Option<String> },

    #[error("Session has no answers to summarize")]
    IncompleteSession {
        message: Option<String>,
        summary: Option<String>,
    },

    #[error("Request cancelled")]
    Cancelled,
}

fn quota_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

impl ServiceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }
}

#[derive(Debug, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
}

/// Error body shape shared by all actions.
#[derive(Debug, Default, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// The four operations the session engine consumes.
#[async_trait]
pub trait InterviewService: Send + Sync {
    async fn generate_question(&self, req: &QuestionRequest)
        -> Result<GeneratedQuestion, ServiceError>;

    async fn evaluate_answer(&self, req: &EvaluationRequest) -> Result<Feedback, ServiceError>;

    async fn answer_guidance(&self, req: &GuidanceRequest)
        -> Result<AnswerGuidance, ServiceError>;

    async fn generate_summary(&self, req: &SummaryRequest)
        -> Result<ReadinessReport, ServiceError>;
}

/// HTTP implementation over the interview service's JSON endpoint.
///
/// 429 is surfaced immediately as `RateLimited`; transport failures and 5xx
/// responses are retried with exponential backoff.
#[derive(Clone)]
pub struct HttpInterviewService {
    client: Client,
    endpoint: String,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpInterviewService {
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), INTERVIEW_ENDPOINT_PATH),
            max_retries,
            backoff_base: DEFAULT_BACKOFF_BASE,
        })
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one action and returns the raw JSON body of a successful response.
    async fn post(&self, request: ServiceRequest<'_>) -> Result<Value, ServiceError> {
        let action = request.action();
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.backoff_base, attempt);
                warn!(
                    "{action} attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ServiceError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let body = response.text().await.unwrap_or_default();
                let parsed: ServiceErrorBody = serde_json::from_str(&body).unwrap_or_default();
                warn!("{action} rejected by quota: {:?}", parsed.code);
                return Err(ServiceError::RateLimited { code: parsed.code });
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Interview service returned {status} for {action}: {body}");
                last_error = Some(ServiceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let parsed: ServiceErrorBody = serde_json::from_str(&body).unwrap_or_default();
                if parsed.error.as_deref() == Some(INCOMPLETE_SESSION_SENTINEL) {
                    return Err(ServiceError::IncompleteSession {
                        message: parsed.message,
                        summary: parsed.summary,
                    });
                }
                let message = parsed.message.or(parsed.error).unwrap_or(body);
                return Err(ServiceError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: Value = response.json().await?;
            debug!("{action} succeeded on attempt {}", attempt + 1);
            return Ok(body);
        }

        Err(last_error.unwrap_or(ServiceError::Api {
            status: 0,
            message: format!("{action} failed without a response"),
        }))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        request: ServiceRequest<'_>,
    ) -> Result<T, ServiceError> {
        let body = self.post(request).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl InterviewService for HttpInterviewService {
    async fn generate_question(
        &self,
        req: &QuestionRequest,
    ) -> Result<GeneratedQuestion, ServiceError> {
        let generated: GeneratedQuestion =
            self.post_json(ServiceRequest::GenerateQuestion(req)).await?;
        if generated.question.trim().is_empty() {
            return Err(ServiceError::EmptyQuestion);
        }
        Ok(generated)
    }

    async fn evaluate_answer(&self, req: &EvaluationRequest) -> Result<Feedback, ServiceError> {
        self.post_json(ServiceRequest::EvaluateAnswer(req)).await
    }

    async fn answer_guidance(
        &self,
        req: &GuidanceRequest,
    ) -> Result<AnswerGuidance, ServiceError> {
        self.post_json(ServiceRequest::GetAnswerGuidance(req)).await
    }

    async fn generate_summary(
        &self,
        req: &SummaryRequest,
    ) -> Result<ReadinessReport, ServiceError> {
        let body = self.post(ServiceRequest::GenerateSummary(req)).await?;
        parse_summary(body)
    }
}

/// Exponential backoff before retry `attempt` (1-based), capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// A successful summary body may still carry the incomplete-session sentinel.
fn parse_summary(body: Value) -> Result<ReadinessReport, ServiceError> {
    if body.get("error").and_then(Value::as_str) == Some(INCOMPLETE_SESSION_SENTINEL) {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
        return Err(ServiceError::IncompleteSession {
            message: field("message"),
            summary: field("summary"),
        });
    }
    Ok(serde_json::from_value(body)?)
}
