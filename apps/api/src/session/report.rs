//! Readiness report generation from a finished transcript.
//!
//! A session with zero answers never reaches the summary service and always
//! ends in the incomplete-session report, whatever the service says.

use tracing::{info, warn};

use crate::coach_client::requests::SummaryRequest;
use crate::coach_client::{InterviewService, ServiceError};
use crate::models::evaluation::ReadinessReport;
use crate::models::identity::SessionIdentity;
use crate::models::setup::SessionSetup;
use crate::models::transcript::{count_turns, render_transcript, TranscriptCounts, Turn};
use crate::session::store::SessionStorage;
use crate::session::SessionError;

pub const INCOMPLETE_SESSION_VERDICT: &str = "Incomplete Session";
pub const NEEDS_PRACTICE_VERDICT: &str = "Needs Practice";

const INCOMPLETE_MESSAGE: &str =
    "Cannot generate report: No answers were provided during the session.";
const INCOMPLETE_SUMMARY: &str = "You didn't provide any answers during this interview session. \
    Please complete at least one question to generate a readiness report.";
const NO_ANSWERS_WEAK_AREA: &str = "No answers were provided to evaluate";
const NO_ANSWERS_IMPROVEMENT: &str =
    "Complete an interview session by answering at least one question";

/// Score limits for sessions where some questions went unanswered.
#[derive(Debug, Clone, Copy)]
pub struct ReportPolicy {
    pub partial_score_threshold: f64,
    pub partial_score_cap: f64,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self {
            partial_score_threshold: 50.0,
            partial_score_cap: 40.0,
        }
    }
}

/// The one definition of the incomplete-session report.
pub fn incomplete_session_report(
    message: Option<String>,
    summary: Option<String>,
) -> ReadinessReport {
    ReadinessReport {
        readiness_score: 0.0,
        verdict: INCOMPLETE_SESSION_VERDICT.to_string(),
        summary: summary.unwrap_or_else(|| INCOMPLETE_SUMMARY.to_string()),
        strength_areas: Vec::new(),
        weak_areas: vec![NO_ANSWERS_WEAK_AREA.to_string()],
        key_improvements: vec![NO_ANSWERS_IMPROVEMENT.to_string()],
        error: Some(true),
        message: Some(message.unwrap_or_else(|| INCOMPLETE_MESSAGE.to_string())),
    }
}

/// Reconciles a service report with what the transcript actually contains.
pub fn reconcile_report(
    report: ReadinessReport,
    counts: TranscriptCounts,
    policy: &ReportPolicy,
) -> ReadinessReport {
    if counts.is_degenerate() {
        if report.readiness_score != 0.0 || report.verdict != INCOMPLETE_SESSION_VERDICT {
            warn!(
                "Summary service scored {} for a session without answers; overriding",
                report.readiness_score
            );
        }
        return incomplete_session_report(report.message, None);
    }

    let mut report = report;
    if counts.is_partial() && report.readiness_score > policy.partial_score_threshold {
        report.readiness_score = report.readiness_score.min(policy.partial_score_cap);
        report.verdict = NEEDS_PRACTICE_VERDICT.to_string();
    }
    report.readiness_score = report.readiness_score.clamp(0.0, 100.0);
    report
}

pub async fn generate_report(
    service: &dyn InterviewService,
    setup: &SessionSetup,
    identity: &SessionIdentity,
    transcript: &[Turn],
    policy: &ReportPolicy,
) -> Result<ReadinessReport, ServiceError> {
    let counts = count_turns(transcript);

    if counts.is_degenerate() {
        warn!(
            "Session {} ended without answers ({} questions); skipping summary service",
            identity.session_id, counts.questions
        );
        return Ok(incomplete_session_report(None, None));
    }

    if counts.answers < counts.questions {
        warn!(
            "Session {} incomplete: {} questions asked, {} answers provided",
            identity.session_id, counts.questions, counts.answers
        );
    }

    let request = SummaryRequest {
        job_role: setup.job_role.clone(),
        country: setup.country,
        full_session: render_transcript(transcript),
        user_id: identity.effective_user_id(),
        session_id: identity.session_id,
        answer_count: counts.answers,
        question_count: counts.questions,
    };

    let report = match service.generate_summary(&request).await {
        Ok(report) => report,
        Err(ServiceError::IncompleteSession { message, summary }) => {
            warn!(
                "Summary service reported session {} as incomplete",
                identity.session_id
            );
            return Ok(incomplete_session_report(message, summary));
        }
        Err(e) => return Err(e),
    };

    let report = reconcile_report(report, counts, policy);
    info!(
        "Readiness report for session {}: {}/100 ({})",
        identity.session_id, report.readiness_score, report.verdict
    );
    Ok(report)
}

/// Builds the report for the session last persisted under `storage`, for
/// clients that come back after the live session is gone.
pub async fn report_from_storage(
    service: &dyn InterviewService,
    storage: &SessionStorage,
    user_id: Option<String>,
    policy: &ReportPolicy,
) -> Result<ReadinessReport, SessionError> {
    let setup = storage
        .load_setup()
        .await?
        .ok_or(SessionError::MissingSetup)?;
    let session_id = storage
        .current_session_id()
        .await?
        .ok_or(SessionError::MissingTranscript)?;
    let transcript = storage
        .load_transcript()
        .await?
        .ok_or(SessionError::MissingTranscript)?;

    let identity = SessionIdentity::new(session_id, user_id);
    Ok(generate_report(service, &setup, &identity, &transcript, policy).await?)
}
