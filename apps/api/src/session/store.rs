//! Ephemeral session storage: setup, session id and transcript for one client,
//! kept across requests the way a browser tab keeps them across page navigations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::setup::SessionSetup;
use crate::models::transcript::Turn;

pub const SETUP_KEY: &str = "interview_setup";
pub const SESSION_ID_KEY: &str = "current_session_id";
pub const TRANSCRIPT_KEY: &str = "full_session";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Stored value is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Stored session id is not a UUID: {0}")]
    SessionId(#[from] uuid::Error),
}

/// Raw key-value backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn clear(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Redis-backed store. Every write refreshes the key's TTL so abandoned
/// sessions expire on their own.
pub struct RedisSessionStore {
    client: redis::Client,
    ttl: Duration,
}

impl RedisSessionStore {
    pub fn open(redis_url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        info!("Redis session store initialized (ttl {}s)", ttl.as_secs());
        Ok(Self { client, ttl })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, self.ttl.as_secs()).await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// Typed view over a `SessionStore`, namespaced to one client.
#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn SessionStore>,
    namespace: String,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn SessionStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub async fn load_setup(&self) -> Result<Option<SessionSetup>, StoreError> {
        match self.store.load(&self.key(SETUP_KEY)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn save_setup(&self, setup: &SessionSetup) -> Result<(), StoreError> {
        let raw = serde_json::to_string(setup)?;
        self.store.save(&self.key(SETUP_KEY), &raw).await
    }

    pub async fn load_transcript(&self) -> Result<Option<Vec<Turn>>, StoreError> {
        match self.store.load(&self.key(TRANSCRIPT_KEY)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn save_transcript(&self, turns: &[Turn]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(turns)?;
        self.store.save(&self.key(TRANSCRIPT_KEY), &raw).await
    }

    pub async fn current_session_id(&self) -> Result<Option<Uuid>, StoreError> {
        match self.store.load(&self.key(SESSION_ID_KEY)).await? {
            Some(raw) => Ok(Some(Uuid::parse_str(raw.trim())?)),
            None => Ok(None),
        }
    }

    /// Returns the stored session id, or generates and stores a fresh one.
    pub async fn session_id_or_new(&self) -> Result<Uuid, StoreError> {
        if let Some(id) = self.current_session_id().await? {
            return Ok(id);
        }
        let id = Uuid::new_v4();
        self.store
            .save(&self.key(SESSION_ID_KEY), &id.to_string())
            .await?;
        Ok(id)
    }

    /// Forgets the session id and transcript. The setup is kept so the next
    /// session can start with the same configuration.
    pub async fn clear_session(&self) -> Result<(), StoreError> {
        self.store.clear(&self.key(SESSION_ID_KEY)).await?;
        self.store.clear(&self.key(TRANSCRIPT_KEY)).await
    }
}
