// Interview practice session engine.
// controller: question/answer state machine. guidance: debounced coaching.
// speech: voice input normalization. report: readiness report.
// store: ephemeral session storage. registry + handlers: HTTP surface.

pub mod controller;
pub mod guidance;
pub mod handlers;
pub mod registry;
pub mod report;
pub mod speech;
pub mod store;

#[cfg(test)]
pub mod testing;

use std::time::Duration;

use thiserror::Error;

use crate::coach_client::ServiceError;
use crate::session::controller::SessionPhase;
use crate::session::guidance::GuidanceSettings;
use crate::session::report::ReportPolicy;
use crate::session::store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Interview practice requires an interview plan")]
    NotEntitled,

    #[error("No interview setup found. Complete the setup first.")]
    MissingSetup,

    #[error("No practice transcript found")]
    MissingTranscript,

    #[error("Answer cannot be empty")]
    EmptyAnswer,

    #[error("An answer is already being evaluated")]
    EvaluationInFlight,

    #[error("A question is already being generated")]
    QuestionInFlight,

    #[error("Cannot {action} while the session is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },

    #[error("Practice limit reached. Upgrade to continue.")]
    Limited,

    #[error("Session has ended")]
    Ended,

    #[error("Interview service failed: {0}")]
    Service(#[from] ServiceError),

    #[error("Session storage failed: {0}")]
    Store(#[from] StoreError),
}

/// Tunables shared by every session the service hosts.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub guidance: GuidanceSettings,
    pub restart_delay: Duration,
    pub report: ReportPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            guidance: GuidanceSettings::default(),
            restart_delay: speech::DEFAULT_RESTART_DELAY,
            report: ReportPolicy::default(),
        }
    }
}
