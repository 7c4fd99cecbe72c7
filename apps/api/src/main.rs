mod coach_client;
mod config;
mod errors;
mod models;
mod routes;
mod session;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::coach_client::HttpInterviewService;
use crate::config::Config;
use crate::routes::build_router;
use crate::session::guidance::GuidanceSettings;
use crate::session::registry::SessionRegistry;
use crate::session::speech::{DialectCorrections, TranscriptNormalizer};
use crate::session::store::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::session::SessionSettings;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Session storage: Redis when configured, process memory otherwise
    let store: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisSessionStore::open(url, config.session_ttl)?),
        None => {
            info!("REDIS_URL not set; session storage kept in memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    // Initialize interview service client
    let service = HttpInterviewService::new(
        &config.interview_service_url,
        config.service_timeout,
        config.service_max_retries,
    )?
    .with_backoff_base(config.service_backoff);
    info!(
        "Interview service client initialized (endpoint: {}, retries: {})",
        service.endpoint(),
        config.service_max_retries
    );

    let corrections = DialectCorrections::default();
    let normalizer = TranscriptNormalizer::new(&corrections)?;
    info!("Transcript normalizer ready ({} corrections)", corrections.len());

    let settings = SessionSettings {
        guidance: GuidanceSettings {
            debounce: config.guidance_debounce,
            min_chars: config.guidance_min_chars,
        },
        ..SessionSettings::default()
    };

    // Live sessions idle for longer than the storage TTL are ended and dropped
    let sessions = SessionRegistry::new();
    sessions.spawn_sweeper(
        config.session_ttl,
        SWEEP_INTERVAL.min(config.session_ttl).max(Duration::from_secs(1)),
    );
    info!("Idle session sweeper started (ttl {}s)", config.session_ttl.as_secs());

    // Build app state
    let state = AppState {
        config: config.clone(),
        service: Arc::new(service),
        store,
        sessions,
        normalizer: Arc::new(normalizer),
        settings,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web client host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
