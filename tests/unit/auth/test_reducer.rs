// Unit tests for the auth event reducer

use crate::common::*;
use crimewatch_access::auth::reducer::{AuthEventReducer, ReducerState};
use crimewatch_access::auth::role_resolver::RoleState;
use crimewatch_access::core::errors::FetchError;
use crimewatch_access::core::events::{AuthEvent, SessionSignal};
use crimewatch_access::core::models::{Principal, Role, RoleSet};
use crimewatch_access::core::notice::Notice;
use proptest::prelude::*;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_signed_in_authenticates_and_resolves_roles() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::with_roles(&[("u1", Role::User)]));

    h.sign_in("u1").await;

    let session = h.session.get_session();
    assert!(session.is_ready());
    assert_eq!(session.principal, Some(Principal::new("u1", "u1@example.com")));
    assert_eq!(h.reducer.state(), &ReducerState::Authenticated(Principal::new("u1", "u1@example.com")));
    assert_eq!(h.resolver.granted().state, RoleState::Ready(RoleSet::from([Role::User])));
}

#[tokio::test]
async fn test_initial_probe_without_session_is_anonymous() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::default());
    assert_eq!(h.reducer.state(), &ReducerState::Unknown);
    assert!(!h.session.get_session().is_ready());

    h.reducer.handle(AuthEvent::InitialSession(Ok(None))).await;

    assert_eq!(h.reducer.state(), &ReducerState::Anonymous);
    assert!(h.session.get_session().is_ready());
    assert_eq!(h.store.fetches(), 0);
}

#[tokio::test]
async fn test_failed_probe_settles_anonymous() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::default());

    let notice = h
        .reducer
        .handle(AuthEvent::InitialSession(Err(transient("connection refused"))))
        .await;

    assert!(notice.is_none());
    assert_eq!(h.reducer.state(), &ReducerState::Anonymous);
    assert!(h.session.get_session().is_ready());
    assert!(h.session.get_session().principal.is_none());
}

#[tokio::test]
async fn test_signed_out_emits_signal_once() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::with_roles(&[("u1", Role::User)]));
    let (signals, _handle) = record_signals(&h.session);

    h.sign_in("u1").await;
    h.reducer.handle(AuthEvent::SignedOut).await;
    // A repeated provider sign-out has nothing left to clear
    h.reducer.handle(AuthEvent::SignedOut).await;

    assert!(h.session.get_session().principal.is_none());
    assert_eq!(*signals.lock().unwrap(), vec![SessionSignal::SignedOut]);
    assert_eq!(h.resolver.granted().state, RoleState::Ready(RoleSet::new()));
}

#[tokio::test]
async fn test_password_recovery_from_anonymous() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::default());
    h.reducer.handle(AuthEvent::InitialSession(Ok(None))).await;
    let (signals, _handle) = record_signals(&h.session);

    h.reducer.handle(AuthEvent::PasswordRecovery).await;

    assert!(h.session.get_session().principal.is_none());
    assert!(h.session.get_session().is_ready());
    assert_eq!(h.reducer.state(), &ReducerState::Anonymous);
    assert_eq!(*signals.lock().unwrap(), vec![SessionSignal::RecoveryRequested]);
}

#[tokio::test]
async fn test_invalid_session_forces_sign_out() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::with_roles(&[("u1", Role::Admin)]));
    h.sign_in("u1").await;
    let (signals, _handle) = record_signals(&h.session);

    let notice = h.reducer.handle(AuthEvent::FetchFailed(stale_subject())).await;

    assert_eq!(notice, Some(Notice::session_expired()));
    assert!(h.session.get_session().principal.is_none());
    assert!(h.session.get_session().is_ready());
    assert_eq!(*signals.lock().unwrap(), vec![SessionSignal::SignedOut]);
    assert_eq!(h.provider.sign_out_count(), 1);
    assert_eq!(h.resolver.granted().principal_id, None);
}

#[tokio::test]
async fn test_invalid_session_with_failing_remote_still_clears() {
    let mut h = Harness::new(
        MockAuthProvider::failing_sign_out(transient("offline")),
        MockRoleStore::default(),
    );
    h.sign_in("u1").await;

    let notice = h.reducer.handle(AuthEvent::FetchFailed(stale_subject())).await;

    assert!(notice.is_some());
    assert!(h.session.get_session().principal.is_none());
}

#[tokio::test]
async fn test_transient_failure_keeps_principal() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::with_roles(&[("u1", Role::User)]));
    h.sign_in("u1").await;

    let notice = h.reducer.handle(AuthEvent::FetchFailed(transient("timeout"))).await;

    assert!(notice.is_none());
    assert_eq!(h.session.get_session().principal_id(), Some("u1"));
    assert!(h.session.get_session().is_ready());
    assert_eq!(h.provider.sign_out_count(), 0);
}

#[tokio::test]
async fn test_token_refresh_keeps_roles_and_uses_cache() {
    let mut h = Harness::new(MockAuthProvider::default(), MockRoleStore::with_roles(&[("u1", Role::Admin)]));
    h.sign_in("u1").await;

    h.reducer
        .handle(AuthEvent::TokenRefreshed(provider_session("u1", "u1@example.com")))
        .await;

    assert!(h.resolver.granted().state.contains(Role::Admin));
    assert_eq!(h.store.fetches(), 1);
}

#[tokio::test]
async fn test_session_payload_switches_principal() {
    let mut h = Harness::new(
        MockAuthProvider::default(),
        MockRoleStore::with_roles(&[("u1", Role::Admin), ("u2", Role::User)]),
    );
    h.sign_in("u1").await;

    h.reducer
        .handle(AuthEvent::SessionPayload(Some(provider_session("u2", "u2@example.com"))))
        .await;

    let granted = h.resolver.granted();
    assert_eq!(granted.principal_id.as_deref(), Some("u2"));
    assert_eq!(granted.state, RoleState::Ready(RoleSet::from([Role::User])));
}

#[tokio::test]
async fn test_notices_forwarded_to_channel() {
    let h = Harness::new(MockAuthProvider::default(), MockRoleStore::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut reducer = AuthEventReducer::new(h.session.clone(), h.resolver.clone()).with_notices(tx);
    reducer
        .handle(AuthEvent::SignedIn(provider_session("u1", "u1@example.com")))
        .await;

    reducer.handle(AuthEvent::FetchFailed(stale_subject())).await;

    assert_eq!(rx.try_recv().ok(), Some(Notice::session_expired()));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_run_consumes_events_in_order() {
    let h = Harness::new(MockAuthProvider::default(), MockRoleStore::with_roles(&[("u1", Role::User)]));
    let (signals, _handle) = record_signals(&h.session);
    let subscription = h.provider.bus.subscribe();
    let reducer = AuthEventReducer::new(h.session.clone(), h.resolver.clone());
    let task = tokio::spawn(reducer.run(subscription));

    h.provider.emit(AuthEvent::SignedIn(provider_session("u1", "u1@example.com")));
    h.provider.emit(AuthEvent::SignedOut);
    h.provider.emit(AuthEvent::PasswordRecovery);

    let session = h.session.clone();
    let sink = signals.clone();
    assert!(eventually(|| sink.lock().unwrap().len() == 2).await);
    assert_eq!(
        *signals.lock().unwrap(),
        vec![SessionSignal::SignedOut, SessionSignal::RecoveryRequested]
    );
    assert!(session.get_session().principal.is_none());
    task.abort();
}

fn event_strategy() -> impl Strategy<Value = AuthEvent> {
    prop_oneof![
        Just(AuthEvent::InitialSession(Ok(None))),
        Just(AuthEvent::InitialSession(Err(FetchError::Transient("down".to_string())))),
        "u[1-3]".prop_map(|id| AuthEvent::SignedIn(provider_session(&id, "p@example.com"))),
        "u[1-3]".prop_map(|id| AuthEvent::TokenRefreshed(provider_session(&id, "p@example.com"))),
        Just(AuthEvent::SessionPayload(None)),
        Just(AuthEvent::SignedOut),
        Just(AuthEvent::PasswordRecovery),
        Just(AuthEvent::FetchFailed(FetchError::Transient("timeout".to_string()))),
        Just(AuthEvent::FetchFailed(FetchError::InvalidSession("jwt expired".to_string()))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The session is never left Settling once an event has been reduced
    #[test]
    fn prop_session_always_settles(events in proptest::collection::vec(event_strategy(), 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let store = MockRoleStore::with_roles(&[("u1", Role::Admin), ("u2", Role::User)]);
            store.fail_for("u3");
            let mut h = Harness::new(MockAuthProvider::default(), store);

            for event in events {
                h.reducer.handle(event).await;
                let session = h.session.get_session();
                assert!(session.is_ready());

                // Roles always belong to the committed principal
                let granted = h.resolver.granted();
                assert_eq!(granted.principal_id.as_deref(), session.principal_id());
                assert!(granted.state.roles().is_some());
            }
        });
    }
}
