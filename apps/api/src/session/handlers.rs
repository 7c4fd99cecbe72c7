use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::evaluation::{AnswerGuidance, ReadinessReport};
use crate::models::identity::{Entitlement, PlanInfo};
use crate::models::setup::SessionSetup;
use crate::session::controller::{SessionController, SessionPhase, SessionSnapshot};
use crate::session::report::report_from_storage;
use crate::session::speech::{
    CaptureDirective, KeyChord, RecognitionResult, RecognizerErrorKind, SpeechNotice,
};
use crate::session::SessionError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSetupRequest {
    pub client_id: String,
    pub setup: SessionSetup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// New setup; when absent the stored one is reused.
    #[serde(default)]
    pub setup: Option<SessionSetup>,
    #[serde(default)]
    pub plan: PlanInfo,
}

impl OpenSessionRequest {
    /// Storage namespace: the client id, falling back to the signed-in user.
    fn namespace(&self) -> Option<&str> {
        [self.client_id.as_deref(), self.user_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitAnswerRequest {
    /// Falls back to the current draft when absent.
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechErrorRequest {
    pub error: RecognizerErrorKind,
}

#[derive(Debug, Serialize)]
pub struct SpeechErrorResponse {
    pub notice: Option<SpeechNotice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechEndRequest {
    #[serde(default)]
    pub restart_failed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordingRequest {
    #[serde(default)]
    pub chord: Option<KeyChord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

async fn live_session(state: &AppState, id: Uuid) -> Result<Arc<SessionController>, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// PUT /api/v1/setup
pub async fn handle_save_setup(
    State(state): State<AppState>,
    Json(req): Json<SaveSetupRequest>,
) -> Result<StatusCode, AppError> {
    if req.client_id.trim().is_empty() {
        return Err(AppError::Validation("clientId is required".to_string()));
    }
    req.setup.validate()?;
    state
        .storage(req.client_id.trim())
        .save_setup(&req.setup)
        .await
        .map_err(SessionError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions
///
/// Opens a session and asks the first question. Without a setup, a session
/// still live for this client is returned as is.
pub async fn handle_open_session(
    State(state): State<AppState>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let namespace = req
        .namespace()
        .ok_or_else(|| AppError::Validation("clientId or userId is required".to_string()))?
        .to_string();
    if let Some(setup) = &req.setup {
        setup.validate()?;
    }

    let entitlement = Entitlement::from_plan(&req.plan);
    if !entitlement.allows_practice() {
        return Err(SessionError::NotEntitled.into());
    }

    let stored_id = state
        .storage(&namespace)
        .current_session_id()
        .await
        .map_err(SessionError::from)?;
    if let Some(id) = stored_id {
        if req.setup.is_none() {
            if let Some(live) = state.sessions.get(id).await {
                if live.phase().await != SessionPhase::Ended {
                    info!("Resuming live session {id} for {namespace}");
                    return Ok((StatusCode::OK, Json(live.snapshot().await)));
                }
            }
        }
        // The client's previous session is superseded and must stop writing
        // to the shared storage.
        state.sessions.retire(id).await;
    }

    let controller = SessionController::open(
        req.setup,
        req.user_id,
        entitlement,
        state.session_deps(&namespace),
    )
    .await?;
    let controller = state.sessions.insert(controller).await;

    // A failed first question leaves the session idle and retryable through
    // /next, so the client still gets the session back.
    let snapshot = match controller.start().await {
        Ok(snapshot) => snapshot,
        Err(SessionError::Service(e)) => {
            warn!(
                "First question for session {} failed: {e}",
                controller.session_id()
            );
            controller.snapshot().await
        }
        Err(e) => return Err(e.into()),
    };
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.snapshot().await))
}

/// PUT /api/v1/sessions/:id/draft
pub async fn handle_update_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.update_draft(req.text).await?))
}

/// POST /api/v1/sessions/:id/answer
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.submit_answer(req.answer).await?))
}

/// POST /api/v1/sessions/:id/next
pub async fn handle_next_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.next_question().await?))
}

/// POST /api/v1/sessions/:id/speech
pub async fn handle_speech_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SpeechRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.ingest_speech(&req.results).await?))
}

/// POST /api/v1/sessions/:id/speech/error
pub async fn handle_speech_error(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SpeechErrorRequest>,
) -> Result<Json<SpeechErrorResponse>, AppError> {
    let controller = live_session(&state, id).await?;
    let notice = controller.speech_error(&req.error).await;
    Ok(Json(SpeechErrorResponse { notice }))
}

/// POST /api/v1/sessions/:id/speech/end
pub async fn handle_speech_end(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SpeechEndRequest>,
) -> Result<Json<CaptureDirective>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.speech_ended(req.restart_failed).await))
}

/// POST /api/v1/sessions/:id/recording
pub async fn handle_toggle_recording(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordingRequest>,
) -> Result<Json<CaptureDirective>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.toggle_recording(req.chord.as_ref()).await))
}

/// GET /api/v1/sessions/:id/guidance
pub async fn handle_get_guidance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<AnswerGuidance>>, AppError> {
    let controller = live_session(&state, id).await?;
    Ok(Json(controller.guidance().await))
}

/// DELETE /api/v1/sessions/:id/guidance
pub async fn handle_dismiss_guidance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let controller = live_session(&state, id).await?;
    controller.dismiss_guidance().await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/finish
///
/// The session leaves the registry whatever the outcome; a failed report can
/// be retried from storage via /reports.
pub async fn handle_finish_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReadinessReport>, AppError> {
    let controller = live_session(&state, id).await?;
    let result = controller.finish().await;
    state.sessions.remove(id).await;
    Ok(Json(result?))
}

/// GET /api/v1/reports/:client_id
pub async fn handle_stored_report(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(params): Query<ReportQuery>,
) -> Result<Json<ReadinessReport>, AppError> {
    let report = report_from_storage(
        state.service.as_ref(),
        &state.storage(&client_id),
        params.user_id,
        &state.settings.report,
    )
    .await?;
    Ok(Json(report))
}
