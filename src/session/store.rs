//! Session storage capability
//!
//! The guard never touches global state: it is handed a [`SessionStore`].
//! The in-memory implementation shards lookups across a concurrent map and
//! gives each session its own mutex, so requests from unrelated sessions never
//! wait on each other.

use super::{Session, SessionId};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub type SessionHandle = Arc<Mutex<Session>>;

/// Locks a session, recovering the state if a previous holder panicked
pub fn lock(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Option<SessionHandle>;

    /// Returns the existing session or creates one stamped with `now`
    fn get_or_create(&self, id: &SessionId, now: Instant) -> SessionHandle;

    fn put(&self, session: Session) -> SessionHandle;

    fn evict(&self, id: &SessionId) -> bool;

    /// Removes sessions idle for at least `idle_timeout`, returning their ids
    fn evict_expired(&self, now: Instant, idle_timeout: Duration) -> Vec<SessionId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn get_or_create(&self, id: &SessionId, now: Instant) -> SessionHandle {
        let entry = self.sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session = %id, "Creating session");
            Arc::new(Mutex::new(Session::new(id.clone(), now)))
        });
        Arc::clone(entry.value())
    }

    fn put(&self, session: Session) -> SessionHandle {
        let id = session.id().clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(id, Arc::clone(&handle));
        handle
    }

    fn evict(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn evict_expired(&self, now: Instant, idle_timeout: Duration) -> Vec<SessionId> {
        let mut expired = Vec::new();
        self.sessions.retain(|id, handle| {
            if lock(handle).is_expired(now, idle_timeout) {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Periodically evicts idle sessions until the returned task is aborted.
///
/// `on_evicted` receives the ids removed by each sweep that evicted any.
pub fn spawn_expiry_sweeper<F>(
    store: Arc<dyn SessionStore>,
    idle_timeout: Duration,
    interval: Duration,
    on_evicted: F,
) -> JoinHandle<()>
where
    F: Fn(&[SessionId]) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = store.evict_expired(Instant::now(), idle_timeout);
            if !expired.is_empty() {
                info!(count = expired.len(), remaining = store.len(), "Evicted idle sessions");
                on_evicted(&expired);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_handle() {
        let store = InMemorySessionStore::new();
        let id = SessionId::generate();
        let now = Instant::now();

        let a = store.get_or_create(&id, now);
        let b = store.get_or_create(&id, now);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_get_evict() {
        let store = InMemorySessionStore::new();
        let id = SessionId::generate();
        store.put(Session::new(id.clone(), Instant::now()));

        assert!(store.get(&id).is_some());
        assert!(store.evict(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.evict(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_evict_expired_keeps_active_and_fresh_sessions() {
        let store = InMemorySessionStore::new();
        let start = Instant::now();
        let idle = SessionId::generate();
        let busy = SessionId::generate();
        let fresh = SessionId::generate();

        store.get_or_create(&idle, start);
        lock(&store.get_or_create(&busy, start))
            .claim_build("d1")
            .unwrap();
        let later = start + Duration::from_secs(600);
        lock(&store.get_or_create(&fresh, start)).touch(later);

        let expired = store.evict_expired(later, Duration::from_secs(300));
        assert_eq!(expired, vec![idle.clone()]);
        assert!(store.get(&idle).is_none());
        assert!(store.get(&busy).is_some());
        assert!(store.get(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_sweeper_evicts_idle_sessions() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        store.get_or_create(&SessionId::generate(), Instant::now());

        let id = SessionId::generate();
        store.get_or_create(&id, Instant::now());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let sweeper = spawn_expiry_sweeper(
            Arc::clone(&store),
            Duration::from_millis(10),
            Duration::from_millis(20),
            move |ids| {
                let _ = tx.send(ids.to_vec());
            },
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert!(store.is_empty());
        let mut evicted: Vec<SessionId> = Vec::new();
        while let Ok(ids) = rx.try_recv() {
            evicted.extend(ids);
        }
        assert_eq!(evicted.len(), 2);
        assert!(evicted.contains(&id));
    }
}
