//! Debounced answer-guidance side channel.
//!
//! Every draft change schedules one delayed request and aborts the previous
//! one. Responses are applied only if no newer draft, cancellation or turn
//! change happened since they were scheduled (generation counter).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coach_client::requests::GuidanceRequest;
use crate::coach_client::InterviewService;
use crate::models::evaluation::AnswerGuidance;

#[derive(Debug, Clone, Copy)]
pub struct GuidanceSettings {
    pub debounce: Duration,
    /// Drafts must be longer than this (in characters) to get guidance.
    pub min_chars: usize,
}

impl Default for GuidanceSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            min_chars: 10,
        }
    }
}

#[derive(Default)]
struct AdvisorSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    guidance: Option<AnswerGuidance>,
    dismissed: bool,
}

impl AdvisorSlot {
    fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.guidance = None;
        self.generation
    }
}

#[derive(Clone)]
pub struct GuidanceAdvisor {
    service: Arc<dyn InterviewService>,
    settings: GuidanceSettings,
    slot: Arc<Mutex<AdvisorSlot>>,
}

impl GuidanceAdvisor {
    pub fn new(service: Arc<dyn InterviewService>, settings: GuidanceSettings) -> Self {
        Self {
            service,
            settings,
            slot: Arc::new(Mutex::new(AdvisorSlot::default())),
        }
    }

    /// Reacts to a new draft. Short drafts clear guidance instead of scheduling.
    pub async fn on_draft_changed(&self, request: GuidanceRequest) {
        let mut slot = self.slot.lock().await;
        let generation = slot.invalidate();

        if request.answer.chars().count() <= self.settings.min_chars || slot.dismissed {
            return;
        }

        let service = Arc::clone(&self.service);
        let shared = Arc::clone(&self.slot);
        let debounce = self.settings.debounce;

        slot.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            match service.answer_guidance(&request).await {
                Ok(guidance) => {
                    let mut slot = shared.lock().await;
                    if slot.generation == generation && !slot.dismissed {
                        slot.guidance = Some(guidance);
                        slot.pending = None;
                    } else {
                        debug!(
                            "Discarding stale guidance for session {} (generation {generation})",
                            request.session_id
                        );
                    }
                }
                Err(e) => warn!(
                    "Answer guidance failed for session {}: {e}",
                    request.session_id
                ),
            }
        }));
    }

    /// Drops pending and current guidance; called whenever the controller leaves idle.
    pub async fn cancel(&self) {
        self.slot.lock().await.invalidate();
    }

    /// Hides guidance for the remainder of the current turn.
    pub async fn dismiss(&self) {
        let mut slot = self.slot.lock().await;
        slot.invalidate();
        slot.dismissed = true;
    }

    /// Starts a fresh turn: cancels everything and lifts a dismissal.
    pub async fn reset_turn(&self) {
        let mut slot = self.slot.lock().await;
        slot.invalidate();
        slot.dismissed = false;
    }

    pub async fn current(&self) -> Option<AnswerGuidance> {
        self.slot.lock().await.guidance.clone()
    }
}
