// Auth lifecycle events - provider events in, session signals out

use crate::core::errors::FetchError;
use crate::core::models::{ProviderSession, Session};
use tokio::sync::broadcast;
use tracing::warn;

/// Default buffer of the provider event bus
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Lifecycle event delivered by the auth provider
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// Result of the one-shot probe for an existing session
    InitialSession(Result<Option<ProviderSession>, FetchError>),
    SignedIn(ProviderSession),
    TokenRefreshed(ProviderSession),
    UserUpdated(ProviderSession),
    /// Generic session payload without a specific lifecycle meaning
    SessionPayload(Option<ProviderSession>),
    SignedOut,
    PasswordRecovery,
    /// A session fetch failed outside of the initial probe
    FetchFailed(FetchError),
}

impl AuthEvent {
    /// Provider-style event name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession(_) => "INITIAL_SESSION",
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
            AuthEvent::SessionPayload(_) => "SESSION_PAYLOAD",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::PasswordRecovery => "PASSWORD_RECOVERY",
            AuthEvent::FetchFailed(_) => "FETCH_FAILED",
        }
    }
}

/// Navigation signal for the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// Route to the authentication view
    SignedOut,
    /// Route to the password-reset view
    RecoveryRequested,
}

/// Payload handed to Session Store listeners on every committed transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNotice {
    pub session: Session,
    pub signal: Option<SessionSignal>,
}

/// Broadcast bus used by providers to publish lifecycle events
#[derive(Debug, Clone)]
pub struct AuthEventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Ordered stream of provider events; dropping it unsubscribes
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event in delivery order, or None once the provider is gone.
    /// Lagged events are skipped with a warning.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Auth event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
