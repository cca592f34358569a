//! Process-scoped map from user id to session.
//!
//! Created at startup, drained at shutdown, passed around as an explicit dependency.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::handle::Credential;
use super::session::Session;

/// Concurrent user → session map. Sharded: unrelated users never share a lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing session for `user_id`, or a new disconnected one inserted atomically.
    ///
    /// Concurrent callers for the same user all receive the same `Arc<Session>`. A session
    /// holding a different credential is replaced by a fresh one and the old one is closed
    /// in the background. The access is recorded while the entry is still locked, so an idle
    /// sweep can never evict the session between lookup and use.
    pub fn get_or_create(&self, user_id: &str, credential: &Credential) -> Arc<Session> {
        let mut replaced = None;
        let session = match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().credential() == credential {
                    occupied.get().touch();
                    Arc::clone(occupied.get())
                } else {
                    let fresh = Arc::new(Session::new(user_id, credential.clone()));
                    fresh.touch();
                    replaced = Some(occupied.insert(Arc::clone(&fresh)));
                    fresh
                }
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(
                    event = "mcp.session.created",
                    user_id,
                    "creating mcp session"
                );
                let fresh = Arc::new(Session::new(user_id, credential.clone()));
                fresh.touch();
                vacant.insert(Arc::clone(&fresh));
                fresh
            }
        };
        if let Some(old) = replaced {
            tracing::info!(
                event = "mcp.session.credential_changed",
                user_id,
                "credential changed; replacing mcp session"
            );
            close_in_background(old);
        }
        session
    }

    /// Non-creating lookup. Does not count as an access.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and close the session if present. Returns whether one was closed.
    pub async fn remove(&self, user_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(user_id) else {
            return false;
        };
        session.close().await
    }

    /// Remove `session` only if it is still the registered one and still idle for longer
    /// than `max_idle` at `now`. The check and the removal are atomic for that key.
    pub(crate) fn remove_if_idle(
        &self,
        user_id: &str,
        session: &Arc<Session>,
        now: Instant,
        max_idle: Duration,
    ) -> Option<Arc<Session>> {
        self.sessions
            .remove_if(user_id, |_, current| {
                Arc::ptr_eq(current, session) && current.idle_for(now) > max_idle
            })
            .map(|(_, removed)| removed)
    }

    /// Remove `session` only if it is still the registered one for `user_id`.
    pub(crate) fn remove_if_current(
        &self,
        user_id: &str,
        session: &Arc<Session>,
    ) -> Option<Arc<Session>> {
        self.sessions
            .remove_if(user_id, |_, current| Arc::ptr_eq(current, session))
            .map(|(_, removed)| removed)
    }

    /// Point-in-time `user_id → connected` view. Takes no session locks.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().is_connected()))
            .collect()
    }

    /// Every registered session, for background sweeps.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session without closing it; the caller owns the closes.
    pub(crate) fn drain(&self) -> Vec<Arc<Session>> {
        let keys: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.sessions.remove(&key).map(|(_, session)| session))
            .collect()
    }
}

fn close_in_background(session: Arc<Session>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                session.close().await;
            });
        }
        Err(_) => tracing::warn!(
            event = "mcp.session.close.skipped",
            user_id = %session.user_id(),
            "no async runtime to close replaced mcp session; dropping its handle unclosed"
        ),
    }
}

#[cfg(test)]
#[path = "../../tests/sessions/registry_eviction.rs"]
mod tests;
