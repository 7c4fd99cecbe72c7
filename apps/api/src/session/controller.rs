//! Question/answer loop controller.
//!
//! Phases: loading → generating → idle → evaluating → feedback → (generating | limited),
//! plus `ended` once the session is finished. At most one controller network call
//! (question generation or answer evaluation) is in flight per session; the phase
//! guards below are what enforce it. The transcript is appended only here.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coach_client::requests::{EvaluationRequest, GuidanceRequest, QuestionRequest};
use crate::coach_client::{InterviewService, ServiceError};
use crate::models::evaluation::{AnswerGuidance, Feedback, ReadinessReport};
use crate::models::identity::{Entitlement, SessionIdentity};
use crate::models::setup::SessionSetup;
use crate::models::transcript::Turn;
use crate::session::guidance::GuidanceAdvisor;
use crate::session::report::{generate_report, ReportPolicy};
use crate::session::speech::{
    append_to_draft, merge_final_results, CaptureDirective, KeyChord, RecognitionResult,
    RecognizerErrorKind, SpeechCapture, SpeechNotice, TranscriptNormalizer,
};
use crate::session::store::SessionStorage;
use crate::session::{SessionError, SessionSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Loading,
    Generating,
    Idle,
    Evaluating,
    Feedback,
    Limited,
    Ended,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Loading => "loading",
            SessionPhase::Generating => "generating",
            SessionPhase::Idle => "idle",
            SessionPhase::Evaluating => "evaluating",
            SessionPhase::Feedback => "feedback",
            SessionPhase::Limited => "limited",
            SessionPhase::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestionTrigger {
    Start,
    Next,
}

impl QuestionTrigger {
    fn action(self) -> &'static str {
        match self {
            QuestionTrigger::Start => "start the interview",
            QuestionTrigger::Next => "ask the next question",
        }
    }
}

/// Client-facing view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: uuid::Uuid,
    pub user_id: String,
    pub setup: SessionSetup,
    pub phase: SessionPhase,
    pub current_question: Option<String>,
    pub question_count: u32,
    pub transcript: Vec<Turn>,
    pub draft: String,
    pub draft_word_count: usize,
    pub feedback: Option<Feedback>,
    pub guidance: Option<AnswerGuidance>,
    pub recording: bool,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
}

struct ControllerState {
    phase: SessionPhase,
    transcript: Vec<Turn>,
    current_question: Option<String>,
    /// Set when question generation failed; `next_question` retries.
    awaiting_question: bool,
    draft: String,
    feedback: Option<Feedback>,
    question_count: u32,
    last_error: Option<String>,
    speech: SpeechCapture,
}

impl ControllerState {
    fn accepts_answer(&self) -> bool {
        self.phase == SessionPhase::Idle && !self.awaiting_question
    }
}

/// Collaborators a controller needs; cloned from `AppState` per session.
#[derive(Clone)]
pub struct SessionDeps {
    pub service: Arc<dyn InterviewService>,
    pub storage: SessionStorage,
    pub normalizer: Arc<TranscriptNormalizer>,
    pub settings: SessionSettings,
}

pub struct SessionController {
    setup: SessionSetup,
    identity: SessionIdentity,
    started_at: DateTime<Utc>,
    service: Arc<dyn InterviewService>,
    storage: SessionStorage,
    normalizer: Arc<TranscriptNormalizer>,
    guidance: GuidanceAdvisor,
    report_policy: ReportPolicy,
    cancel: CancellationToken,
    state: Mutex<ControllerState>,
}

impl SessionController {
    /// Opens a session in `loading`.
    ///
    /// A provided setup starts a new practice session for the storage namespace;
    /// without one, the stored setup and session id are reused.
    pub async fn open(
        setup: Option<SessionSetup>,
        user_id: Option<String>,
        entitlement: Entitlement,
        deps: SessionDeps,
    ) -> Result<Self, SessionError> {
        if !entitlement.allows_practice() {
            return Err(SessionError::NotEntitled);
        }

        let SessionDeps {
            service,
            storage,
            normalizer,
            settings,
        } = deps;

        let setup = match setup {
            Some(setup) => {
                storage.clear_session().await?;
                storage.save_setup(&setup).await?;
                setup
            }
            None => storage
                .load_setup()
                .await?
                .ok_or(SessionError::MissingSetup)?,
        };

        let session_id = storage.session_id_or_new().await?;
        let identity = SessionIdentity::new(session_id, user_id);
        storage.save_transcript(&[]).await?;

        info!(
            "Opened practice session {} for {} ({} / {:?})",
            session_id,
            identity.effective_user_id(),
            setup.job_role,
            setup.interview_type
        );

        Ok(Self {
            guidance: GuidanceAdvisor::new(Arc::clone(&service), settings.guidance),
            setup,
            identity,
            started_at: Utc::now(),
            service,
            storage,
            normalizer,
            report_policy: settings.report,
            cancel: CancellationToken::new(),
            state: Mutex::new(ControllerState {
                phase: SessionPhase::Loading,
                transcript: Vec::new(),
                current_question: None,
                awaiting_question: false,
                draft: String::new(),
                feedback: None,
                question_count: 0,
                last_error: None,
                speech: SpeechCapture::new(settings.restart_delay),
            }),
        })
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.identity.session_id
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    #[cfg(test)]
    pub async fn transcript(&self) -> Vec<Turn> {
        self.state.lock().await.transcript.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        self.snapshot_locked(&state).await
    }

    /// Generates the opening question.
    pub async fn start(&self) -> Result<SessionSnapshot, SessionError> {
        self.request_question(QuestionTrigger::Start).await
    }

    /// Moves from feedback to the next question, or retries a failed generation.
    pub async fn next_question(&self) -> Result<SessionSnapshot, SessionError> {
        self.request_question(QuestionTrigger::Next).await
    }

    async fn request_question(
        &self,
        trigger: QuestionTrigger,
    ) -> Result<SessionSnapshot, SessionError> {
        let request = {
            let mut state = self.state.lock().await;
            match (trigger, state.phase) {
                (_, SessionPhase::Ended) => return Err(SessionError::Ended),
                (_, SessionPhase::Limited) => return Err(SessionError::Limited),
                (_, SessionPhase::Generating) => return Err(SessionError::QuestionInFlight),
                (_, SessionPhase::Evaluating) => return Err(SessionError::EvaluationInFlight),
                (QuestionTrigger::Start, SessionPhase::Loading) => {}
                (QuestionTrigger::Next, SessionPhase::Feedback) => {
                    state.feedback = None;
                    state.draft.clear();
                    state.speech.stop();
                }
                (QuestionTrigger::Next, SessionPhase::Idle) if state.awaiting_question => {}
                (trigger, phase) => {
                    return Err(SessionError::InvalidTransition {
                        action: trigger.action(),
                        phase,
                    })
                }
            }

            self.guidance.reset_turn().await;
            state.phase = SessionPhase::Generating;
            state.last_error = None;

            QuestionRequest {
                setup: self.setup.clone(),
                history: (!state.transcript.is_empty()).then(|| state.transcript.clone()),
                user_id: self.identity.effective_user_id(),
                session_id: self.identity.session_id,
            }
        };

        let result = self
            .guarded(self.service.generate_question(&request))
            .await;

        let mut state = self.state.lock().await;
        if state.phase != SessionPhase::Generating {
            debug!(
                "Session {} left generating while the question was in flight",
                self.identity.session_id
            );
            return Err(SessionError::Ended);
        }

        let outcome = match result {
            Ok(generated) if !generated.question.trim().is_empty() => {
                state.transcript.push(Turn::bot(generated.question.clone()));
                state.current_question = Some(generated.question);
                state.question_count += 1;
                state.awaiting_question = false;
                state.phase = SessionPhase::Idle;
                info!(
                    "Session {}: question {} ready",
                    self.identity.session_id, state.question_count
                );
                Ok(())
            }
            Ok(_) => Err(ServiceError::EmptyQuestion),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {}
            Err(ServiceError::Cancelled) => return Err(SessionError::Ended),
            Err(e) if e.is_rate_limited() => {
                warn!(
                    "Session {} hit the practice limit while generating: {e}",
                    self.identity.session_id
                );
                state.phase = SessionPhase::Limited;
            }
            Err(e) => {
                warn!(
                    "Session {}: question generation failed: {e}",
                    self.identity.session_id
                );
                state.phase = SessionPhase::Idle;
                state.awaiting_question = true;
                state.last_error = Some("Error generating question. Please try again.".to_string());
                return Err(SessionError::Service(e));
            }
        }

        let transcript = state.transcript.clone();
        let snapshot = self.snapshot_locked(&state).await;
        drop(state);

        self.persist(&transcript).await;
        Ok(snapshot)
    }

    /// Replaces the draft answer and schedules guidance for it.
    pub async fn update_draft(&self, text: String) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        self.ensure_editable(&state, "edit the answer")?;

        state.draft = text;
        self.schedule_guidance(&state).await;
        Ok(self.snapshot_locked(&state).await)
    }

    /// Submits `answer`, or the current draft when `None`.
    ///
    /// Blank answers and submissions while an evaluation is in flight are rejected
    /// without touching the transcript or the phase.
    pub async fn submit_answer(
        &self,
        answer: Option<String>,
    ) -> Result<SessionSnapshot, SessionError> {
        let (request, text) = {
            let mut state = self.state.lock().await;
            let text = answer.unwrap_or_else(|| state.draft.clone());
            if text.trim().is_empty() {
                return Err(SessionError::EmptyAnswer);
            }
            match state.phase {
                SessionPhase::Evaluating => return Err(SessionError::EvaluationInFlight),
                SessionPhase::Ended => return Err(SessionError::Ended),
                SessionPhase::Limited => return Err(SessionError::Limited),
                _ if state.accepts_answer() => {}
                phase => {
                    return Err(SessionError::InvalidTransition {
                        action: "submit an answer",
                        phase,
                    })
                }
            }

            let question = state.current_question.clone().unwrap_or_default();
            state.transcript.push(Turn::user(text.clone()));
            state.draft = text.clone();
            state.phase = SessionPhase::Evaluating;
            state.last_error = None;
            self.guidance.cancel().await;

            let request = EvaluationRequest {
                setup: self.setup.clone(),
                question,
                answer: text.clone(),
                user_id: self.identity.effective_user_id(),
                session_id: self.identity.session_id,
            };
            (request, text)
        };

        let result = self.guarded(self.service.evaluate_answer(&request)).await;

        let mut state = self.state.lock().await;
        if state.phase != SessionPhase::Evaluating {
            debug!(
                "Session {} left evaluating while the answer was in flight",
                self.identity.session_id
            );
            return Err(SessionError::Ended);
        }

        match result {
            Ok(feedback) => {
                info!(
                    "Session {}: answer {} scored {}",
                    self.identity.session_id, state.question_count, feedback.score
                );
                state.feedback = Some(feedback);
                state.phase = SessionPhase::Feedback;
            }
            Err(ServiceError::Cancelled) => return Err(SessionError::Ended),
            Err(e) if e.is_rate_limited() => {
                warn!(
                    "Session {} hit the practice limit while evaluating: {e}",
                    self.identity.session_id
                );
                state.phase = SessionPhase::Limited;
            }
            Err(e) => {
                warn!(
                    "Session {}: answer evaluation failed: {e}",
                    self.identity.session_id
                );
                if state.transcript.last() == Some(&Turn::user(text.clone())) {
                    state.transcript.pop();
                }
                state.draft = text;
                state.phase = SessionPhase::Idle;
                state.last_error = Some("Analysis failed. Try again.".to_string());
                return Err(SessionError::Service(e));
            }
        }

        let transcript = state.transcript.clone();
        let snapshot = self.snapshot_locked(&state).await;
        drop(state);

        self.persist(&transcript).await;
        Ok(snapshot)
    }

    /// Merges final recognizer results into the draft. Results arriving outside
    /// `idle` are dropped.
    pub async fn ingest_speech(
        &self,
        results: &[RecognitionResult],
    ) -> Result<SessionSnapshot, SessionError> {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Ended {
            return Err(SessionError::Ended);
        }
        if !state.accepts_answer() {
            debug!(
                "Session {}: dropping speech results while {}",
                self.identity.session_id, state.phase
            );
            return Ok(self.snapshot_locked(&state).await);
        }

        if let Some(chunk) = merge_final_results(&self.normalizer, results) {
            append_to_draft(&mut state.draft, &chunk);
            self.schedule_guidance(&state).await;
        }
        Ok(self.snapshot_locked(&state).await)
    }

    pub async fn speech_error(&self, kind: &RecognizerErrorKind) -> Option<SpeechNotice> {
        let mut state = self.state.lock().await;
        if *kind != RecognizerErrorKind::NoSpeech {
            warn!(
                "Session {}: speech recognition error {kind:?}",
                self.identity.session_id
            );
        }
        state.speech.on_error(kind)
    }

    pub async fn speech_ended(&self, restart_failed: bool) -> CaptureDirective {
        let mut state = self.state.lock().await;
        if restart_failed {
            warn!(
                "Session {}: recognizer failed to restart",
                self.identity.session_id
            );
            state.speech.on_restart_failed();
            return CaptureDirective::Nothing;
        }
        state.speech.on_end()
    }

    /// Toggles recording. Only honoured in `idle`; a chord that is not the
    /// recording shortcut is ignored.
    pub async fn toggle_recording(&self, chord: Option<&KeyChord>) -> CaptureDirective {
        if chord.is_some_and(|c| !c.is_recording_toggle()) {
            return CaptureDirective::Nothing;
        }
        let mut state = self.state.lock().await;
        if !state.accepts_answer() {
            return CaptureDirective::Nothing;
        }
        state.speech.toggle()
    }

    /// Latest guidance, only while the answer is still being drafted.
    pub async fn guidance(&self) -> Option<AnswerGuidance> {
        let state = self.state.lock().await;
        if state.accepts_answer() {
            self.guidance.current().await
        } else {
            None
        }
    }

    pub async fn dismiss_guidance(&self) {
        self.guidance.dismiss().await;
    }

    /// Ends the session from any phase and produces the readiness report.
    /// In-flight controller requests are cancelled and their results discarded.
    pub async fn finish(&self) -> Result<ReadinessReport, SessionError> {
        let transcript = self.end().await.ok_or(SessionError::Ended)?;

        info!(
            "Session {} finished after {} turns",
            self.identity.session_id,
            transcript.len()
        );
        self.persist(&transcript).await;

        let report = generate_report(
            self.service.as_ref(),
            &self.setup,
            &self.identity,
            &transcript,
            &self.report_policy,
        )
        .await?;
        Ok(report)
    }

    /// Moves to `ended` without producing a report: stops recording, drops
    /// guidance and cancels in-flight requests. Returns the final transcript,
    /// or `None` if the session had already ended.
    pub async fn end(&self) -> Option<Vec<Turn>> {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Ended {
            return None;
        }
        state.phase = SessionPhase::Ended;
        state.speech.stop();
        self.guidance.cancel().await;
        self.cancel.cancel();
        Some(state.transcript.clone())
    }

    fn ensure_editable(
        &self,
        state: &ControllerState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        match state.phase {
            SessionPhase::Ended => Err(SessionError::Ended),
            SessionPhase::Limited => Err(SessionError::Limited),
            _ if state.accepts_answer() => Ok(()),
            phase => Err(SessionError::InvalidTransition { action, phase }),
        }
    }

    /// Must be called with the state lock held so a concurrent transition out of
    /// `idle` cannot slip between the phase check and the scheduling.
    async fn schedule_guidance(&self, state: &MutexGuard<'_, ControllerState>) {
        let Some(question) = state.current_question.clone() else {
            return;
        };
        self.guidance
            .on_draft_changed(GuidanceRequest {
                question,
                answer: state.draft.clone(),
                job_role: self.setup.job_role.clone(),
                experience_level: self.setup.experience_level,
                user_id: self.identity.effective_user_id(),
                session_id: self.identity.session_id,
            })
            .await;
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ServiceError::Cancelled),
            result = call => result,
        }
    }

    /// Writes the transcript only while this session still owns the client's
    /// storage; a newer session for the same client must not be overwritten.
    async fn persist(&self, transcript: &[Turn]) {
        match self.storage.current_session_id().await {
            Ok(Some(id)) if id == self.identity.session_id => {}
            Ok(owner) => {
                warn!(
                    "Session {} no longer owns its storage (current: {owner:?}); transcript not persisted",
                    self.identity.session_id
                );
                return;
            }
            Err(e) => {
                warn!(
                    "Failed to check storage owner for session {}: {e}",
                    self.identity.session_id
                );
                return;
            }
        }
        if let Err(e) = self.storage.save_transcript(transcript).await {
            warn!(
                "Failed to persist transcript for session {}: {e}",
                self.identity.session_id
            );
        }
    }

    async fn snapshot_locked(&self, state: &ControllerState) -> SessionSnapshot {
        let guidance = if state.accepts_answer() {
            self.guidance.current().await
        } else {
            None
        };
        SessionSnapshot {
            session_id: self.identity.session_id,
            user_id: self.identity.effective_user_id(),
            setup: self.setup.clone(),
            phase: state.phase,
            current_question: state.current_question.clone(),
            question_count: state.question_count,
            transcript: state.transcript.clone(),
            draft: state.draft.clone(),
            draft_word_count: state.draft.split_whitespace().count(),
            feedback: state.feedback.clone(),
            guidance,
            recording: state.speech.is_recording(),
            last_error: state.last_error.clone(),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::setup::{ExperienceLevel, HiringMarket, InterviewType};
    use crate::models::transcript::Role;
    use crate::session::speech::{Alternative, DialectCorrections};
    use crate::session::store::{MemorySessionStore, SessionStore};
    use crate::session::testing::{Scripted, ScriptedService};

    fn setup() -> SessionSetup {
        SessionSetup {
            job_role: "Backend Engineer".to_string(),
            experience_level: ExperienceLevel::MidCareer,
            country: HiringMarket::GlobalUs,
            interview_type: InterviewType::Behavioral,
        }
    }

    fn premium() -> Entitlement {
        Entitlement {
            interview_premium: true,
        }
    }

    fn deps(service: Arc<ScriptedService>, store: Arc<dyn SessionStore>) -> SessionDeps {
        SessionDeps {
            service,
            storage: SessionStorage::new(store, "tab-1"),
            normalizer: Arc::new(
                TranscriptNormalizer::new(&DialectCorrections::default()).unwrap(),
            ),
            settings: SessionSettings::default(),
        }
    }

    async fn open_with(service: Arc<ScriptedService>) -> SessionController {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        SessionController::open(Some(setup()), None, premium(), deps(service, store))
            .await
            .unwrap()
    }

    async fn started(service: Arc<ScriptedService>) -> SessionController {
        let controller = open_with(service).await;
        controller.start().await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_open_requires_entitlement() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let result = SessionController::open(
            Some(setup()),
            None,
            Entitlement::default(),
            deps(Arc::new(ScriptedService::new()), store),
        )
        .await;
        assert!(matches!(result, Err(SessionError::NotEntitled)));
    }

    #[tokio::test]
    async fn test_open_without_setup_needs_stored_setup() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let service = Arc::new(ScriptedService::new());
        let missing =
            SessionController::open(None, None, premium(), deps(service.clone(), store.clone()))
                .await;
        assert!(matches!(missing, Err(SessionError::MissingSetup)));

        SessionStorage::new(store.clone(), "tab-1")
            .save_setup(&setup())
            .await
            .unwrap();
        let controller = SessionController::open(None, None, premium(), deps(service, store))
            .await
            .unwrap();
        assert_eq!(controller.phase().await, SessionPhase::Loading);
    }

    #[tokio::test]
    async fn test_reopen_reuses_session_id() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let service = Arc::new(ScriptedService::new());
        let first = SessionController::open(
            Some(setup()),
            None,
            premium(),
            deps(service.clone(), store.clone()),
        )
        .await
        .unwrap();
        let resumed = SessionController::open(None, None, premium(), deps(service, store))
            .await
            .unwrap();
        assert_eq!(first.session_id(), resumed.session_id());
    }

    #[tokio::test]
    async fn test_start_generates_first_question() {
        let service = Arc::new(ScriptedService::new());
        let controller = open_with(service.clone()).await;

        let snapshot = controller.start().await.unwrap();

        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.question_count, 1);
        assert_eq!(snapshot.transcript, vec![Turn::bot("Question 1")]);
        assert_eq!(snapshot.current_question.as_deref(), Some("Question 1"));
        assert!(service.question_histories()[0].is_none());
    }

    #[tokio::test]
    async fn test_blank_submission_is_a_no_op() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service.clone()).await;

        for blank in ["", "   ", "\n\t"] {
            let result = controller.submit_answer(Some(blank.to_string())).await;
            assert!(matches!(result, Err(SessionError::EmptyAnswer)));
        }
        assert!(matches!(
            controller.submit_answer(None).await,
            Err(SessionError::EmptyAnswer)
        ));

        assert_eq!(controller.phase().await, SessionPhase::Idle);
        assert_eq!(controller.transcript().await.len(), 1);
        assert_eq!(service.evaluation_calls(), 0);
    }

    #[tokio::test]
    async fn test_double_submit_rejected_while_evaluating() {
        let service =
            Arc::new(ScriptedService::new().with_evaluation_delay(Duration::from_millis(200)));
        let controller = Arc::new(started(service.clone()).await);

        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                controller
                    .submit_answer(Some("I led the migration".to_string()))
                    .await
            })
        };
        while controller.phase().await != SessionPhase::Evaluating {
            tokio::task::yield_now().await;
        }

        let second = controller
            .submit_answer(Some("I led the migration".to_string()))
            .await;
        assert!(matches!(second, Err(SessionError::EvaluationInFlight)));

        let snapshot = first.await.unwrap().unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Feedback);
        assert_eq!(service.evaluation_calls(), 1);
        let user_turns = snapshot
            .transcript
            .iter()
            .filter(|t| t.role == Role::User)
            .count();
        assert_eq!(user_turns, 1);
    }

    #[tokio::test]
    async fn test_transcript_alternates_over_cycles() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service.clone()).await;
        let cycles = 3;

        for i in 0..cycles {
            let snapshot = controller
                .submit_answer(Some(format!("Answer {}", i + 1)))
                .await
                .unwrap();
            assert_eq!(snapshot.phase, SessionPhase::Feedback);
            assert!(snapshot.feedback.is_some());
            if i + 1 < cycles {
                controller.next_question().await.unwrap();
            }
        }

        let transcript = controller.transcript().await;
        assert_eq!(transcript.len(), 2 * cycles);
        for (i, turn) in transcript.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Bot } else { Role::User };
            assert_eq!(turn.role, expected, "turn {i}");
        }
        let histories = service.question_histories();
        assert_eq!(histories.len(), cycles);
        assert_eq!(histories[2].as_ref().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn test_next_question_clears_turn_state() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service).await;
        controller
            .submit_answer(Some("My answer".to_string()))
            .await
            .unwrap();

        let snapshot = controller.next_question().await.unwrap();

        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.question_count, 2);
        assert!(snapshot.feedback.is_none());
        assert!(snapshot.draft.is_empty());
        assert_eq!(snapshot.current_question.as_deref(), Some("Question 2"));
    }

    #[tokio::test]
    async fn test_next_question_requires_feedback() {
        let controller = started(Arc::new(ScriptedService::new())).await;
        let result = controller.next_question().await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition {
                phase: SessionPhase::Idle,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_on_start_limits_session() {
        let service = Arc::new(ScriptedService::new().with_questions(vec![Scripted::RateLimited]));
        let controller = open_with(service).await;

        let snapshot = controller.start().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Limited);
        assert!(matches!(
            controller.submit_answer(Some("hi there".to_string())).await,
            Err(SessionError::Limited)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_on_next_question_limits_session() {
        let service = Arc::new(ScriptedService::new().with_questions(vec![
            Scripted::Ok("Question 1".to_string()),
            Scripted::RateLimited,
        ]));
        let controller = started(service).await;
        controller
            .submit_answer(Some("Answer".to_string()))
            .await
            .unwrap();

        let snapshot = controller.next_question().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Limited);
        assert!(matches!(
            controller.next_question().await,
            Err(SessionError::Limited)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_on_evaluation_limits_session() {
        let service =
            Arc::new(ScriptedService::new().with_evaluations(vec![Scripted::RateLimited]));
        let controller = started(service).await;

        let snapshot = controller
            .submit_answer(Some("Answer".to_string()))
            .await
            .unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Limited);
    }

    #[tokio::test]
    async fn test_failed_generation_allows_retry() {
        let service = Arc::new(ScriptedService::new().with_questions(vec![
            Scripted::Fail,
            Scripted::Ok("Recovered question".to_string()),
        ]));
        let controller = open_with(service).await;

        let failed = controller.start().await;
        assert!(matches!(failed, Err(SessionError::Service(_))));
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert!(snapshot.last_error.is_some());
        assert!(matches!(
            controller.submit_answer(Some("early".to_string())).await,
            Err(SessionError::InvalidTransition { .. })
        ));

        let retried = controller.next_question().await.unwrap();
        assert_eq!(retried.phase, SessionPhase::Idle);
        assert_eq!(retried.transcript, vec![Turn::bot("Recovered question")]);
        assert!(retried.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_evaluation_rolls_back_answer() {
        let service = Arc::new(ScriptedService::new().with_evaluations(vec![Scripted::Fail]));
        let controller = started(service.clone()).await;

        let result = controller
            .submit_answer(Some("My first attempt".to_string()))
            .await;
        assert!(matches!(result, Err(SessionError::Service(_))));

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.transcript.len(), 1);
        assert_eq!(snapshot.draft, "My first attempt");

        let retried = controller.submit_answer(None).await.unwrap();
        assert_eq!(retried.phase, SessionPhase::Feedback);
        assert_eq!(retried.transcript.len(), 2);
        assert_eq!(service.evaluation_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_guidance_does_not_block_submit() {
        let service = Arc::new(ScriptedService::new().with_guidance_delay(Duration::from_secs(60)));
        let controller = started(service.clone()).await;

        controller
            .update_draft("I resolved the outage by rolling back".to_string())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(service.guidance_calls(), 1);

        let snapshot = controller.submit_answer(None).await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Feedback);
        assert!(snapshot.guidance.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guidance_visible_while_idle() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service.clone()).await;

        controller
            .update_draft("I resolved the outage by rolling back".to_string())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1600)).await;

        assert!(controller.guidance().await.is_some());
        assert!(controller.snapshot().await.guidance.is_some());

        controller.dismiss_guidance().await;
        assert!(controller.guidance().await.is_none());
    }

    #[tokio::test]
    async fn test_draft_locked_outside_idle() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service).await;
        controller
            .submit_answer(Some("Answer".to_string()))
            .await
            .unwrap();

        let result = controller.update_draft("more".to_string()).await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition {
                phase: SessionPhase::Feedback,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_speech_results_merge_into_draft() {
        let controller = started(Arc::new(ScriptedService::new())).await;
        controller
            .update_draft("Typed start".to_string())
            .await
            .unwrap();

        let results = vec![RecognitionResult {
            is_final: true,
            alternatives: vec![Alternative {
                transcript: "um and then we dont stop".to_string(),
                confidence: Some(0.9),
            }],
        }];
        let snapshot = controller.ingest_speech(&results).await.unwrap();

        assert_eq!(snapshot.draft, "Typed start And then we don't stop");
        assert_eq!(snapshot.draft_word_count, 7);
    }

    #[tokio::test]
    async fn test_recording_toggle_only_in_idle() {
        let controller = started(Arc::new(ScriptedService::new())).await;
        let chord = KeyChord {
            key: " ".to_string(),
            ctrl_key: true,
            meta_key: false,
        };

        assert_eq!(
            controller.toggle_recording(Some(&chord)).await,
            CaptureDirective::Start
        );
        assert_eq!(
            controller.speech_ended(false).await,
            CaptureDirective::RestartAfter { delay_ms: 100 }
        );

        controller
            .submit_answer(Some("Answer".to_string()))
            .await
            .unwrap();
        assert_eq!(
            controller.toggle_recording(Some(&chord)).await,
            CaptureDirective::Nothing
        );

        let snapshot = controller.next_question().await.unwrap();
        assert!(!snapshot.recording);
    }

    #[tokio::test]
    async fn test_finish_produces_report_and_ends() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service.clone()).await;
        controller
            .submit_answer(Some("A thoughtful answer".to_string()))
            .await
            .unwrap();

        let report = controller.finish().await.unwrap();
        assert_eq!(service.summary_calls(), 1);
        assert!(!report.is_error());
        assert_eq!(controller.phase().await, SessionPhase::Ended);
        assert!(matches!(
            controller.next_question().await,
            Err(SessionError::Ended)
        ));
        assert!(matches!(controller.finish().await, Err(SessionError::Ended)));
    }

    #[tokio::test]
    async fn test_finish_without_answers_is_incomplete() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service.clone()).await;

        let report = controller.finish().await.unwrap();
        assert_eq!(report.readiness_score, 0.0);
        assert_eq!(report.verdict, "Incomplete Session");
        assert_eq!(service.summary_calls(), 0);
    }

    #[tokio::test]
    async fn test_finish_cancels_in_flight_evaluation() {
        let service =
            Arc::new(ScriptedService::new().with_evaluation_delay(Duration::from_secs(30)));
        let controller = Arc::new(started(service).await);

        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                controller
                    .submit_answer(Some("Long answer".to_string()))
                    .await
            })
        };
        while controller.phase().await != SessionPhase::Evaluating {
            tokio::task::yield_now().await;
        }

        controller.finish().await.unwrap();
        assert!(matches!(pending.await.unwrap(), Err(SessionError::Ended)));
        assert_eq!(controller.phase().await, SessionPhase::Ended);
    }

    #[tokio::test]
    async fn test_transcript_persisted_after_each_turn() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let service = Arc::new(ScriptedService::new());
        let controller = SessionController::open(
            Some(setup()),
            None,
            premium(),
            deps(service, store.clone()),
        )
        .await
        .unwrap();
        controller.start().await.unwrap();
        controller
            .submit_answer(Some("Answer".to_string()))
            .await
            .unwrap();

        let stored = SessionStorage::new(store, "tab-1")
            .load_transcript()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, controller.transcript().await);
    }

    #[tokio::test]
    async fn test_superseded_session_does_not_overwrite_storage() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let service = Arc::new(ScriptedService::new());
        let old = SessionController::open(
            Some(setup()),
            None,
            premium(),
            deps(service.clone(), store.clone()),
        )
        .await
        .unwrap();
        old.start().await.unwrap();
        old.submit_answer(Some("Answer from the old session".to_string()))
            .await
            .unwrap();

        let replacement = SessionController::open(
            Some(setup()),
            None,
            premium(),
            deps(service, store.clone()),
        )
        .await
        .unwrap();
        assert_ne!(old.session_id(), replacement.session_id());

        old.next_question().await.unwrap();

        let storage = SessionStorage::new(store, "tab-1");
        assert_eq!(storage.load_transcript().await.unwrap(), Some(Vec::new()));
        assert_eq!(
            storage.current_session_id().await.unwrap(),
            Some(replacement.session_id())
        );
    }

    #[tokio::test]
    async fn test_end_cancels_without_report() {
        let service = Arc::new(ScriptedService::new());
        let controller = started(service.clone()).await;

        assert_eq!(controller.end().await.map(|t| t.len()), Some(1));
        assert!(controller.end().await.is_none());
        assert_eq!(controller.phase().await, SessionPhase::Ended);
        assert_eq!(service.summary_calls(), 0);
        assert!(matches!(controller.finish().await, Err(SessionError::Ended)));
    }
}
