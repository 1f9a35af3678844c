// Auth event reducer - maps provider lifecycle events to session transitions

use crate::auth::role_resolver::RoleResolver;
use crate::core::errors::FetchError;
use crate::core::events::{AuthEvent, AuthSubscription, SessionSignal};
use crate::core::models::Principal;
use crate::core::notice::Notice;
use crate::state::session_store::SessionStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducerState {
    Unknown,
    Settling,
    Authenticated(Principal),
    Anonymous,
}

/// Auth event reducer
///
/// Processes one event at a time, in delivery order. Each call to `handle`
/// completes the session transition and the role refresh it triggers
/// before returning, and always leaves the session status at Ready.
pub struct AuthEventReducer {
    session: Arc<SessionStore>,
    resolver: Arc<RoleResolver>,
    state: ReducerState,
    notices: Option<mpsc::UnboundedSender<Notice>>,
}

impl AuthEventReducer {
    pub fn new(session: Arc<SessionStore>, resolver: Arc<RoleResolver>) -> Self {
        Self {
            session,
            resolver,
            state: ReducerState::Unknown,
            notices: None,
        }
    }

    /// Forward user-visible notices (e.g. "Session Expired") to the host
    pub fn with_notices(mut self, notices: mpsc::UnboundedSender<Notice>) -> Self {
        self.notices = Some(notices);
        self
    }

    pub fn state(&self) -> &ReducerState {
        &self.state
    }

    /// Reduce a single event. Returns the notice the host should display, if any.
    pub async fn handle(&mut self, event: AuthEvent) -> Option<Notice> {
        debug!(event = event.kind(), state = ?self.state, "Reducing auth event");

        if self.state == ReducerState::Unknown {
            self.state = ReducerState::Settling;
        }
        self.session.begin_transition();

        let notice = match event {
            AuthEvent::InitialSession(Ok(Some(session)))
            | AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session)
            | AuthEvent::SessionPayload(Some(session)) => {
                self.authenticate(session.principal()).await;
                None
            }
            AuthEvent::InitialSession(Ok(None)) | AuthEvent::SessionPayload(None) => {
                self.become_anonymous(None).await;
                None
            }
            AuthEvent::SignedOut => {
                let signal = self
                    .session
                    .get_session()
                    .principal
                    .is_some()
                    .then_some(SessionSignal::SignedOut);
                self.become_anonymous(signal).await;
                None
            }
            AuthEvent::PasswordRecovery => {
                self.become_anonymous(Some(SessionSignal::RecoveryRequested)).await;
                None
            }
            AuthEvent::InitialSession(Err(e)) | AuthEvent::FetchFailed(e) => self.fetch_failed(e).await,
        };

        if let (Some(ref notice), Some(ref tx)) = (&notice, &self.notices) {
            let _ = tx.send(notice.clone());
        }
        notice
    }

    /// Consume the provider stream until it closes (or the task is aborted on unmount)
    pub async fn run(mut self, mut subscription: AuthSubscription) {
        while let Some(event) = subscription.next().await {
            self.handle(event).await;
        }
        info!("Auth event stream closed; reducer stopped");
    }

    async fn authenticate(&mut self, principal: Principal) {
        let changed = !matches!(&self.state, ReducerState::Authenticated(p) if p.id == principal.id);
        if changed {
            info!(principal_id = %principal.id, "Principal authenticated");
        }
        self.session.commit(Some(principal.clone()), None);
        self.resolver.on_principal_changed(Some(&principal)).await;
        self.state = ReducerState::Authenticated(principal);
    }

    async fn become_anonymous(&mut self, signal: Option<SessionSignal>) {
        self.session.commit(None, signal);
        self.resolver.on_principal_changed(None).await;
        self.state = ReducerState::Anonymous;
    }

    async fn fetch_failed(&mut self, e: FetchError) -> Option<Notice> {
        if e.is_invalid_session() {
            warn!(error = %e, "Session no longer valid upstream; forcing sign-out");
            if let Err(sign_out_err) = self.session.sign_out().await {
                debug!(error = %sign_out_err, "Remote sign-out after invalid session failed");
            }
            self.resolver.on_principal_changed(None).await;
            self.state = ReducerState::Anonymous;
            return Some(Notice::session_expired());
        }

        warn!(error = %e, "Auth session fetch failed; keeping current principal");
        self.session.settle();
        if self.state == ReducerState::Settling {
            self.state = ReducerState::Anonymous;
        }
        None
    }
}
