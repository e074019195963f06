use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

use super::session::Session;
use crate::metrics::prometheus as metrics;

/// Live subscribed sessions, keyed by `Session::key`.
///
/// Only registered sessions can submit shares or receive jobs.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

/// Read view held by the broadcaster while it schedules deliveries.
pub struct RegistrySnapshot<'a> {
    guard: RwLockReadGuard<'a, HashMap<u64, Arc<Session>>>,
}

impl RegistrySnapshot<'_> {
    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }

    pub fn authorized(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.guard.values().filter(|s| s.is_authorized())
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if sessions.insert(session.key(), session).is_none() {
            metrics::set_registered_sessions(sessions.len());
        }
    }

    /// Remove a session; false if it was not registered.
    pub async fn unregister(&self, key: u64) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&key).is_some();
        if removed {
            metrics::set_registered_sessions(sessions.len());
        }
        removed
    }

    pub async fn contains(&self, key: u64) -> bool {
        self.sessions.read().await.contains_key(&key)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn authorized_count(&self) -> usize {
        self.sessions.read().await.values().filter(|s| s.is_authorized()).count()
    }

    pub async fn snapshot(&self) -> RegistrySnapshot<'_> {
        RegistrySnapshot {
            guard: self.sessions.read().await,
        }
    }
}
