use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use super::Session;
use crate::sessions::handle::{Credential, ToolHandle, ToolList};

#[derive(Default)]
struct CountingHandle {
    closes: AtomicUsize,
}

#[async_trait]
impl ToolHandle for CountingHandle {
    async fn list_tools(&self) -> Result<ToolList> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn session() -> Session {
    Session::new("u1", Credential::new("token"))
}

async fn connect(session: &Session, handle: Arc<CountingHandle>) {
    session.begin_transition().await.install(handle);
}

#[tokio::test]
async fn new_session_is_disconnected_without_lease() {
    let session = session();
    assert!(!session.is_connected());
    assert!(session.lease().await.is_none());
    assert!(session.try_lease().is_none());
}

#[tokio::test]
async fn install_bumps_generation_and_enables_lease() {
    let session = session();
    connect(&session, Arc::new(CountingHandle::default())).await;
    let lease = session.lease().await.expect("lease");
    assert_eq!(lease.generation(), 1);
    assert_eq!(lease.user_id(), "u1");
    drop(lease);

    assert!(session.invalidate().await);
    assert!(!session.invalidate().await);
    connect(&session, Arc::new(CountingHandle::default())).await;
    assert_eq!(session.lease().await.expect("lease").generation(), 2);
}

#[tokio::test]
async fn try_lease_gives_up_while_transition_runs() {
    let session = session();
    connect(&session, Arc::new(CountingHandle::default())).await;
    let transition = session.begin_transition().await;
    assert!(session.try_lease().is_none());
    drop(transition);
    assert!(session.try_lease().is_some());
}

#[tokio::test]
async fn close_is_once_and_refuses_further_use() {
    let session = session();
    let handle = Arc::new(CountingHandle::default());
    connect(&session, Arc::clone(&handle)).await;

    assert!(session.close().await);
    assert!(!session.close().await);
    assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
    assert!(!session.is_connected());
    assert!(session.lease().await.is_none());
    assert!(session.begin_transition().await.is_closed());
}

#[tokio::test(start_paused = true)]
async fn access_time_only_moves_forward() {
    let session = session();
    let created = session.last_accessed_at();

    tokio::time::advance(Duration::from_secs(5)).await;
    session.touch();
    let touched = session.last_accessed_at();
    assert!(touched >= created + Duration::from_secs(5));
    assert_eq!(session.idle_for(Instant::now()), Duration::ZERO);

    tokio::time::advance(Duration::from_secs(7)).await;
    assert_eq!(session.idle_for(Instant::now()), Duration::from_secs(7));
    assert_eq!(session.idle_for(created), Duration::ZERO);
}

#[tokio::test]
async fn failure_marks_never_wait_on_leases() {
    let session = session();
    connect(&session, Arc::new(CountingHandle::default())).await;
    let lease = session.lease().await.expect("lease");
    let generation = lease.generation();

    assert_eq!(session.try_mark_disconnected(generation), None);
    assert!(session.is_connected());
    assert!(!session.mark_disconnected(generation + 1));
    assert!(session.mark_disconnected(generation));
    assert!(!session.mark_disconnected(generation));
    assert!(!session.is_connected());
    assert_eq!(session.generation(), 1);
    drop(lease);

    connect(&session, Arc::new(CountingHandle::default())).await;
    assert_eq!(session.try_mark_disconnected(generation), Some(false));
    assert_eq!(session.try_mark_disconnected(2), Some(true));
}
