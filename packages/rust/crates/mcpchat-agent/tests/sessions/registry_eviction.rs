use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::SessionRegistry;
use crate::sessions::handle::Credential;

const MAX_IDLE: Duration = Duration::from_secs(1_800);

#[tokio::test(start_paused = true)]
async fn access_after_scan_start_keeps_session_registered() {
    let registry = SessionRegistry::new();
    let credential = Credential::new("token-a");
    let candidate = registry.get_or_create("A", &credential);
    tokio::time::advance(MAX_IDLE + Duration::from_secs(1)).await;

    let scan_started = Instant::now();
    assert!(candidate.idle_for(scan_started) > MAX_IDLE);
    let reused = registry.get_or_create("A", &credential);
    assert!(Arc::ptr_eq(&candidate, &reused));

    assert!(
        registry
            .remove_if_idle("A", &candidate, scan_started, MAX_IDLE)
            .is_none()
    );
    let registered = registry.get("A").expect("still registered");
    assert!(Arc::ptr_eq(&registered, &candidate));
    assert!(!candidate.begin_transition().await.is_closed());
}

#[tokio::test(start_paused = true)]
async fn untouched_idle_session_is_removed() {
    let registry = SessionRegistry::new();
    let candidate = registry.get_or_create("A", &Credential::new("token-a"));
    tokio::time::advance(MAX_IDLE + Duration::from_secs(1)).await;

    let removed = registry
        .remove_if_idle("A", &candidate, Instant::now(), MAX_IDLE)
        .expect("idle session removed");
    assert!(Arc::ptr_eq(&removed, &candidate));
    assert!(registry.get("A").is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_candidate_never_removes_its_replacement() {
    let registry = SessionRegistry::new();
    let candidate = registry.get_or_create("A", &Credential::new("token-a"));
    tokio::time::advance(MAX_IDLE + Duration::from_secs(1)).await;
    let replacement = registry.get_or_create("A", &Credential::new("token-a2"));
    tokio::time::advance(MAX_IDLE + Duration::from_secs(1)).await;

    assert!(
        registry
            .remove_if_idle("A", &candidate, Instant::now(), MAX_IDLE)
            .is_none()
    );
    let registered = registry.get("A").expect("replacement registered");
    assert!(Arc::ptr_eq(&registered, &replacement));
}

#[test]
fn credential_change_outside_a_runtime_does_not_panic() {
    let registry = SessionRegistry::new();
    let first = registry.get_or_create("A", &Credential::new("token-a"));
    let second = registry.get_or_create("A", &Credential::new("token-b"));

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    assert_eq!(second.credential(), &Credential::new("token-b"));
}
