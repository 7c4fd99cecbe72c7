use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub interview_service_url: String,
    /// Session storage falls back to process memory when unset.
    pub redis_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub guidance_debounce: Duration,
    pub guidance_min_chars: usize,
    pub service_timeout: Duration,
    pub service_max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub service_backoff: Duration,
    /// Redis key expiry and idle eviction for live sessions.
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            interview_service_url: require_env("INTERVIEW_SERVICE_URL")?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            guidance_debounce: Duration::from_millis(parse_env("GUIDANCE_DEBOUNCE_MS", 1500)?),
            guidance_min_chars: parse_env("GUIDANCE_MIN_CHARS", 10)?,
            service_timeout: Duration::from_secs(parse_env("SERVICE_TIMEOUT_SECS", 60)?),
            service_max_retries: parse_env("SERVICE_MAX_RETRIES", 2)?,
            service_backoff: Duration::from_millis(parse_env("SERVICE_BACKOFF_MS", 500)?),
            session_ttl: Duration::from_secs(parse_env("SESSION_TTL_SECS", 86_400)?),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
