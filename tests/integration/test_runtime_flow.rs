// End-to-end session lifecycle through the mounted access runtime

use crate::common::*;
use crimewatch_access::auth::access_gate::ProtectedView;
use crimewatch_access::auth::role_resolver::RoleState;
use crimewatch_access::core::errors::{SignOutError, WriteError};
use crimewatch_access::core::events::{AuthEvent, SessionSignal};
use crimewatch_access::core::models::{NewCrimeRecord, Role, RoleSet};
use crimewatch_access::runtime::AccessRuntime;
use crimewatch_access::state::role_cache::MokaRoleCache;
use secrecy::SecretString;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn runtime_with(provider: MockAuthProvider, store: MockRoleStore) -> (Arc<MockAuthProvider>, Arc<MockRoleStore>, AccessRuntime) {
    let provider = Arc::new(provider);
    let store = Arc::new(store);
    let runtime = AccessRuntime::new(provider.clone(), store.clone(), MokaRoleCache::default());
    (provider, store, runtime)
}

fn roles_ready_for(runtime: &AccessRuntime, principal_id: &str) -> bool {
    let granted = runtime.resolver().granted();
    granted.principal_id.as_deref() == Some(principal_id) && matches!(granted.state, RoleState::Ready(_))
}

#[tokio::test]
async fn test_mount_without_session_is_anonymous_and_ready() {
    let (_provider, store, mut runtime) = runtime_with(MockAuthProvider::default(), MockRoleStore::default());

    runtime.mount().await;

    let session = runtime.session().get_session();
    assert!(session.is_ready());
    assert!(session.principal.is_none());
    assert!(runtime.is_mounted());
    assert_eq!(store.fetches(), 0);
    for view in ProtectedView::ALL {
        assert!(!runtime.can_view(view));
    }
}

#[tokio::test]
async fn test_mount_restores_existing_session() {
    let (_provider, _store, mut runtime) = runtime_with(
        MockAuthProvider::with_session(provider_session("a1", "chief@example.org")),
        MockRoleStore::with_roles(&[("a1", Role::Admin)]),
    );

    runtime.mount().await;

    assert_eq!(runtime.session().get_session().principal_id(), Some("a1"));
    assert!(runtime.can_view(ProtectedView::AdminPanel));
    assert!(runtime.can_view(ProtectedView::CrimeCreation));
}

#[tokio::test]
async fn test_mount_with_failing_probe_settles_anonymous() {
    let provider = MockAuthProvider::default();
    *provider.probe_error.lock().unwrap() = Some(transient("connection reset"));
    let (_provider, _store, mut runtime) = runtime_with(provider, MockRoleStore::default());

    runtime.mount().await;

    let session = runtime.session().get_session();
    assert!(session.is_ready());
    assert!(session.principal.is_none());
}

/// A plain user signed in through the credential flow
#[tokio::test]
async fn test_sign_in_through_credentials_grants_user_views_only() {
    let (provider, _store, mut runtime) = runtime_with(
        MockAuthProvider::default(),
        MockRoleStore::with_roles(&[("u1", Role::User)]),
    );
    runtime.mount().await;

    runtime
        .credentials("http://localhost:8080")
        .sign_in("u1@example.com", &SecretString::new("hunter22".to_string()))
        .await
        .unwrap();

    assert!(eventually(|| roles_ready_for(&runtime, "u1")).await);
    assert_eq!(runtime.resolver().current_roles(), RoleSet::from([Role::User]));
    assert!(!runtime.can_view(ProtectedView::AdminPanel));
    assert_eq!(provider.sign_in_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

/// Recovery keeps the anonymous principal and signals once
#[tokio::test]
async fn test_password_recovery_signal_emitted_once() {
    let (provider, _store, mut runtime) = runtime_with(MockAuthProvider::default(), MockRoleStore::default());
    runtime.mount().await;
    let (signals, _handle) = record_signals(runtime.session());

    provider.emit(AuthEvent::PasswordRecovery);

    assert!(eventually(|| !signals.lock().unwrap().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*signals.lock().unwrap(), vec![SessionSignal::RecoveryRequested]);
    assert!(runtime.session().get_session().principal.is_none());
}

/// A failed role fetch denies admin content without surfacing an error
#[tokio::test]
async fn test_role_fetch_failure_denies_by_default() {
    let store = MockRoleStore::with_roles(&[("u2", Role::Admin)]);
    store.fail_for("u2");
    let (provider, _store, mut runtime) = runtime_with(MockAuthProvider::default(), store);
    runtime.mount().await;

    provider.emit(AuthEvent::SignedIn(provider_session("u2", "u2@example.com")));

    assert!(eventually(|| runtime.session().get_session().principal_id() == Some("u2")).await);
    assert!(eventually(|| roles_ready_for(&runtime, "u2")).await);
    assert!(!runtime.can_view(ProtectedView::AdminPanel));
    assert!(runtime.session().get_session().is_ready());
}

/// A stale-subject failure while signed in forces sign-out with a notice
#[tokio::test]
async fn test_invalid_session_forces_sign_out() {
    let (provider, _store, mut runtime) = runtime_with(
        MockAuthProvider::with_session(provider_session("u1", "u1@example.com")),
        MockRoleStore::with_roles(&[("u1", Role::User)]),
    );
    let mut notices = runtime.take_notices().unwrap();
    assert!(runtime.take_notices().is_none());
    runtime.mount().await;
    let (signals, _handle) = record_signals(runtime.session());

    provider.emit(AuthEvent::FetchFailed(stale_subject()));

    let notice = tokio::time::timeout(Duration::from_secs(2), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.title, "Session Expired");
    assert!(eventually(|| runtime.session().get_session().principal.is_none()).await);
    assert!(eventually(|| signals.lock().unwrap().contains(&SessionSignal::SignedOut)).await);

    // The provider's own SIGNED_OUT echo must not signal a second time
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*signals.lock().unwrap(), vec![SessionSignal::SignedOut]);
    assert_eq!(runtime.resolver().current_roles(), RoleSet::new());
}

#[tokio::test]
async fn test_transient_fetch_failure_keeps_principal() {
    let (provider, _store, mut runtime) = runtime_with(
        MockAuthProvider::with_session(provider_session("u1", "u1@example.com")),
        MockRoleStore::with_roles(&[("u1", Role::User)]),
    );
    runtime.mount().await;

    provider.emit(AuthEvent::FetchFailed(transient("gateway timeout")));
    provider.emit(AuthEvent::TokenRefreshed(provider_session("u1", "u1@example.com")));

    assert!(eventually(|| roles_ready_for(&runtime, "u1")).await);
    let session = runtime.session().get_session();
    assert_eq!(session.principal_id(), Some("u1"));
    assert!(session.is_ready());
}

#[tokio::test]
async fn test_rapid_principal_switch_keeps_latest_roles() {
    let store = MockRoleStore::with_roles(&[("slow", Role::Admin), ("fast", Role::User)]);
    store.delay_for("slow", Duration::from_millis(100));
    let (provider, _store, mut runtime) = runtime_with(MockAuthProvider::default(), store);
    runtime.mount().await;

    provider.emit(AuthEvent::SignedIn(provider_session("slow", "slow@example.com")));
    provider.emit(AuthEvent::SignedIn(provider_session("fast", "fast@example.com")));

    assert!(eventually(|| roles_ready_for(&runtime, "fast")).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(runtime.session().get_session().principal_id(), Some("fast"));
    assert_eq!(runtime.resolver().current_roles(), RoleSet::from([Role::User]));
    assert!(!runtime.can_view(ProtectedView::AdminPanel));
}

#[tokio::test]
async fn test_sign_out_through_runtime() {
    let (provider, _store, mut runtime) = runtime_with(
        MockAuthProvider::with_session(provider_session("u1", "u1@example.com")),
        MockRoleStore::with_roles(&[("u1", Role::User)]),
    );
    runtime.mount().await;
    let (signals, _handle) = record_signals(runtime.session());

    runtime.sign_out().await.unwrap();

    assert!(runtime.session().get_session().principal.is_none());
    assert!(eventually(|| runtime.resolver().granted().principal_id.is_none()).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*signals.lock().unwrap(), vec![SessionSignal::SignedOut]);
    assert_eq!(provider.sign_out_count(), 1);
}

#[tokio::test]
async fn test_admin_sign_out_with_failing_remote_revokes_access_at_once() {
    let provider = MockAuthProvider::failing_sign_out(transient("network unreachable"));
    provider.silent_sign_out.store(true, Ordering::SeqCst);
    *provider.session.lock().unwrap() = Some(provider_session("a1", "chief@example.org"));
    let (provider, _store, mut runtime) = runtime_with(provider, MockRoleStore::with_roles(&[("a1", Role::Admin)]));
    runtime.mount().await;
    let crimes = Arc::new(MockCrimeStore::default());
    let registry = runtime.crime_registry(crimes.clone());
    assert!(runtime.can_view(ProtectedView::AdminPanel));

    let result = runtime.sign_out().await;

    assert!(matches!(result, Err(SignOutError::Remote(_))));
    assert_eq!(provider.sign_out_count(), 1);
    for view in ProtectedView::ALL {
        assert!(!runtime.can_view(view));
    }
    assert_eq!(runtime.resolver().granted().principal_id, None);
    let insert = registry
        .add_record(NewCrimeRecord {
            crime_type: "Fraud".to_string(),
            record: crime_record("FR-2024-300"),
        })
        .await;
    assert!(matches!(insert, Err(WriteError::Unauthorized(_))));
    assert_eq!(crimes.inserts(), 0);
}

#[tokio::test]
async fn test_unmount_stops_event_processing() {
    let (provider, _store, mut runtime) = runtime_with(MockAuthProvider::default(), MockRoleStore::default());
    runtime.mount().await;

    runtime.unmount();
    assert!(eventually(|| !runtime.is_mounted()).await);
    assert!(eventually(|| provider.bus.subscriber_count() == 0).await);

    provider.emit(AuthEvent::SignedIn(provider_session("u1", "u1@example.com")));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(runtime.session().get_session().principal.is_none());
}

#[tokio::test]
async fn test_admin_manages_roles_through_runtime() {
    let (_provider, store, mut runtime) = runtime_with(
        MockAuthProvider::with_session(provider_session("a1", "chief@example.org")),
        MockRoleStore::with_roles(&[("a1", Role::Admin)]),
    );
    runtime.mount().await;

    let admin = runtime.role_admin(Some(Arc::new(MockUserDirectory {
        users: vec![crimewatch_access::core::models::Principal::new("u7", "u7@example.org")],
        fail: false,
    })));
    admin.grant_role("u7", Role::Moderator).await.unwrap();

    let users = admin.list_users().await.unwrap();
    assert_eq!(users[0].roles, RoleSet::from([Role::Moderator]));
    assert_eq!(store.inserts(), 1);

    let crimes = Arc::new(MockCrimeStore::default());
    let registry = runtime.crime_registry(crimes.clone());
    registry
        .add_record(crimewatch_access::core::models::NewCrimeRecord {
            crime_type: "Fraud".to_string(),
            record: crime_record("FR-2024-001"),
        })
        .await
        .unwrap();
    assert_eq!(crimes.inserts(), 1);
}
