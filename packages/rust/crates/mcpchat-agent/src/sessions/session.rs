//! One user's connection lifecycle.
//!
//! Lifecycle fields sit behind a per-session read/write lock:
//! - uses of the handle (tool calls, probes) hold the read side for the whole call;
//! - transitions (connect, invalidate, close) hold the write side.
//!
//! A close therefore never runs while a call is in flight, and unrelated users never
//! contend on a shared lock.
//!
//! The connect generation and the live flag share one atomic word (`generation << 1 | live`).
//! Only a transition sets the flag or bumps the generation. Failure marks clear the flag with
//! a compare-and-swap against the generation they observed and never take the lock.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedRwLockReadGuard, RwLock, RwLockWriteGuard};
use tokio::time::Instant;

use super::handle::{Credential, ToolHandle};

const LIVE_BIT: u64 = 1;

fn link_generation(link: u64) -> u64 {
    link >> 1
}

fn link_is_live(link: u64) -> bool {
    link & LIVE_BIT == LIVE_BIT
}

pub(crate) struct SessionState {
    handle: Option<Arc<dyn ToolHandle>>,
    closed: bool,
}

/// Lifecycle record of one user's connection to the tool server.
pub struct Session {
    user_id: String,
    credential: Credential,
    created_at: Instant,
    last_accessed_ms: AtomicU64,
    /// `generation << 1 | live`; generation is bumped on every successful connect.
    link: AtomicU64,
    state: Arc<RwLock<SessionState>>,
}

impl Session {
    pub(crate) fn new(user_id: impl Into<String>, credential: Credential) -> Self {
        Self {
            user_id: user_id.into(),
            credential,
            created_at: Instant::now(),
            last_accessed_ms: AtomicU64::new(0),
            link: AtomicU64::new(0),
            state: Arc::new(RwLock::new(SessionState {
                handle: None,
                closed: false,
            })),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Lock-free view of the live flag.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        link_is_live(self.link.load(Ordering::Acquire))
    }

    /// Generation of the most recently installed handle. Zero before the first connect.
    #[must_use]
    pub fn generation(&self) -> u64 {
        link_generation(self.link.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_accessed_ms.load(Ordering::Acquire))
    }

    /// Time since the last access, as seen at `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_accessed_at())
    }

    /// Record an access. Never moves the timestamp backwards.
    pub(crate) fn touch(&self) {
        let elapsed = Instant::now().saturating_duration_since(self.created_at);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.last_accessed_ms.fetch_max(elapsed_ms, Ordering::AcqRel);
    }

    /// Wait for the read side and borrow the live handle.
    ///
    /// Returns `None` when the session is disconnected or closed. Hold the lease only for
    /// the calls it covers: transitions for this user wait until it is dropped.
    pub async fn lease(&self) -> Option<SessionLease> {
        let guard = Arc::clone(&self.state).read_owned().await;
        self.lease_from(guard)
    }

    /// Like [`Session::lease`] but gives up immediately while a transition is running.
    pub fn try_lease(&self) -> Option<SessionLease> {
        let guard = Arc::clone(&self.state).try_read_owned().ok()?;
        self.lease_from(guard)
    }

    fn lease_from(&self, guard: OwnedRwLockReadGuard<SessionState>) -> Option<SessionLease> {
        let link = self.link.load(Ordering::Acquire);
        if guard.closed || !link_is_live(link) {
            return None;
        }
        let handle = guard.handle.clone()?;
        Some(SessionLease {
            user_id: self.user_id.clone(),
            generation: link_generation(link),
            handle,
            _guard: guard,
        })
    }

    pub(crate) async fn begin_transition(&self) -> Transition<'_> {
        Transition {
            session: self,
            state: self.state.write().await,
        }
    }

    /// Clear the live flag if the handle is still the one observed at `generation`.
    ///
    /// Never waits on the session lock. The handle itself is left in place; the next
    /// reconnect closes and replaces it.
    pub fn mark_disconnected(&self, generation: u64) -> bool {
        let live = (generation << 1) | LIVE_BIT;
        self.link
            .compare_exchange(live, generation << 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Like [`Session::mark_disconnected`], but only while no lease or transition holds
    /// the session. Returns `None` without waiting when one does.
    pub fn try_mark_disconnected(&self, generation: u64) -> Option<bool> {
        let _idle = self.state.try_write().ok()?;
        Some(self.mark_disconnected(generation))
    }

    /// Clear the live flag whatever handle is current.
    pub async fn invalidate(&self) -> bool {
        self.begin_transition().await.mark_disconnected()
    }

    /// Close the handle and refuse further use. Returns `false` if already closed.
    ///
    /// Waits for in-flight leases to drop before closing.
    pub async fn close(&self) -> bool {
        let handle = {
            let mut transition = self.begin_transition().await;
            if transition.is_closed() {
                return false;
            }
            transition.close()
        };
        if let Some(handle) = handle
            && let Err(error) = handle.close().await
        {
            tracing::warn!(
                event = "mcp.session.close.failed",
                user_id = %self.user_id,
                error = %error,
                "closing mcp handle failed; session dropped anyway"
            );
        }
        tracing::debug!(
            event = "mcp.session.closed",
            user_id = %self.user_id,
            "mcp session closed"
        );
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("connected", &self.is_connected())
            .field("last_accessed_at", &self.last_accessed_at())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to one session's lifecycle fields.
pub(crate) struct Transition<'a> {
    session: &'a Session,
    state: RwLockWriteGuard<'a, SessionState>,
}

impl Transition<'_> {
    pub(crate) fn is_closed(&self) -> bool {
        self.state.closed
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub(crate) fn generation(&self) -> u64 {
        link_generation(self.session.link.load(Ordering::Acquire))
    }

    pub(crate) fn take_stale_handle(&mut self) -> Option<Arc<dyn ToolHandle>> {
        if self.session.is_connected() {
            return None;
        }
        self.state.handle.take()
    }

    pub(crate) fn install(&mut self, handle: Arc<dyn ToolHandle>) {
        self.state.handle = Some(handle);
        let next = self.generation() + 1;
        self.session
            .link
            .store((next << 1) | LIVE_BIT, Ordering::Release);
        self.session.touch();
    }

    pub(crate) fn mark_disconnected(&mut self) -> bool {
        link_is_live(self.session.link.fetch_and(!LIVE_BIT, Ordering::AcqRel))
    }

    fn close(&mut self) -> Option<Arc<dyn ToolHandle>> {
        self.state.closed = true;
        self.session.link.fetch_and(!LIVE_BIT, Ordering::AcqRel);
        self.state.handle.take()
    }
}

/// Read access to a connected session's handle.
///
/// While a lease is alive the handle cannot be replaced or closed.
pub struct SessionLease {
    user_id: String,
    generation: u64,
    handle: Arc<dyn ToolHandle>,
    _guard: OwnedRwLockReadGuard<SessionState>,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("user_id", &self.user_id)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl SessionLease {
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Connect generation this lease was taken at.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for SessionLease {
    type Target = dyn ToolHandle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

#[cfg(test)]
#[path = "../../tests/sessions/session_lifecycle.rs"]
mod tests;
