pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Setup screen
        .route("/api/v1/setup", put(handlers::handle_save_setup))
        // Practice sessions
        .route("/api/v1/sessions", post(handlers::handle_open_session))
        .route("/api/v1/sessions/:id", get(handlers::handle_get_session))
        .route(
            "/api/v1/sessions/:id/draft",
            put(handlers::handle_update_draft),
        )
        .route(
            "/api/v1/sessions/:id/answer",
            post(handlers::handle_submit_answer),
        )
        .route(
            "/api/v1/sessions/:id/next",
            post(handlers::handle_next_question),
        )
        .route(
            "/api/v1/sessions/:id/speech",
            post(handlers::handle_speech_results),
        )
        .route(
            "/api/v1/sessions/:id/speech/error",
            post(handlers::handle_speech_error),
        )
        .route(
            "/api/v1/sessions/:id/speech/end",
            post(handlers::handle_speech_end),
        )
        .route(
            "/api/v1/sessions/:id/recording",
            post(handlers::handle_toggle_recording),
        )
        .route(
            "/api/v1/sessions/:id/guidance",
            get(handlers::handle_get_guidance).delete(handlers::handle_dismiss_guidance),
        )
        .route(
            "/api/v1/sessions/:id/finish",
            post(handlers::handle_finish_session),
        )
        // Reports
        .route(
            "/api/v1/reports/:client_id",
            get(handlers::handle_stored_report),
        )
        .with_state(state)
}
