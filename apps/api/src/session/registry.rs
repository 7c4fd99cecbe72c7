use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::controller::SessionController;

struct Entry {
    controller: Arc<SessionController>,
    last_touched: Instant,
}

/// Live sessions hosted by this process, keyed by session id.
///
/// Every lookup refreshes the entry; entries untouched for longer than the
/// idle TTL are ended and dropped by `evict_idle`.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a controller. A previous controller with the same id is ended.
    pub async fn insert(&self, controller: SessionController) -> Arc<SessionController> {
        let controller = Arc::new(controller);
        let previous = self.sessions.write().await.insert(
            controller.session_id(),
            Entry {
                controller: Arc::clone(&controller),
                last_touched: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            debug!("Replaced live session {}", controller.session_id());
            previous.controller.end().await;
        }
        controller
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionController>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_touched = Instant::now();
        Some(Arc::clone(&entry.controller))
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<SessionController>> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.controller)
    }

    /// Ends and removes a live session, e.g. when a new one replaces it.
    pub async fn retire(&self, id: Uuid) -> bool {
        match self.remove(id).await {
            Some(controller) => {
                controller.end().await;
                info!("Retired live session {id}");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ends and removes every session idle for longer than `ttl`.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let expired: Vec<Arc<SessionController>> = {
            let mut sessions = self.sessions.write().await;
            let now = Instant::now();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_touched) > ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| sessions.remove(id))
                .map(|entry| entry.controller)
                .collect()
        };

        for controller in &expired {
            controller.end().await;
        }
        if !expired.is_empty() {
            info!("Evicted {} idle sessions", expired.len());
        }
        expired.len()
    }

    /// Runs `evict_idle` every `period` until the returned task is aborted.
    pub fn spawn_sweeper(&self, ttl: Duration, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                registry.evict_idle(ttl).await;
            }
        })
    }
}
