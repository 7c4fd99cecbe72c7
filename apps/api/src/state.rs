use std::sync::Arc;

use crate::coach_client::InterviewService;
use crate::config::Config;
use crate::session::controller::SessionDeps;
use crate::session::registry::SessionRegistry;
use crate::session::speech::TranscriptNormalizer;
use crate::session::store::{SessionStorage, SessionStore};
use crate::session::SessionSettings;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Kept for handlers that need runtime settings beyond `SessionSettings`.
    #[allow(dead_code)]
    pub config: Config,
    /// Interview service client. HTTP in production, scripted in tests.
    pub service: Arc<dyn InterviewService>,
    /// Backend for per-client session storage (Redis or memory).
    pub store: Arc<dyn SessionStore>,
    pub sessions: SessionRegistry,
    pub normalizer: Arc<TranscriptNormalizer>,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn storage(&self, namespace: &str) -> SessionStorage {
        SessionStorage::new(Arc::clone(&self.store), namespace)
    }

    pub fn session_deps(&self, namespace: &str) -> SessionDeps {
        SessionDeps {
            service: Arc::clone(&self.service),
            storage: self.storage(namespace),
            normalizer: Arc::clone(&self.normalizer),
            settings: self.settings,
        }
    }
}
