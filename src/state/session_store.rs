// Session store - single owner of the current principal and session status

use crate::api::AuthProvider;
use crate::core::errors::SignOutError;
use crate::core::events::{SessionNotice, SessionSignal};
use crate::core::models::{Principal, Session, SessionStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type Listener = Arc<dyn Fn(&SessionNotice) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration returned by `SessionStore::on_change`.
/// Dropping the handle unsubscribes the listener.
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.remove(&self.id);
        }
    }
}

/// Session store
///
/// Holds the one Session of a running client. Only the auth event reducer
/// (through the crate-internal transition methods) and `sign_out` write it;
/// everything else reads snapshots or subscribes.
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    state: watch::Sender<Session>,
    listeners: Arc<Mutex<Listeners>>,
}

impl SessionStore {
    /// New store in `Settling` with no principal
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        let (state, _) = watch::channel(Session::settling());
        Self {
            provider,
            state,
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub fn get_session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver for async consumers that want to await transitions
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Register a listener for committed transitions
    pub fn on_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&SessionNotice) + Send + Sync + 'static,
    {
        let mut guard = lock(&self.listeners);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.insert(id, Arc::new(listener));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }

    /// Sign out. The local principal is cleared and status set to Ready
    /// before the remote call is made, so a failing remote never leaves the
    /// client on a dead session. The error only reports the remote outcome.
    pub async fn sign_out(&self) -> Result<(), SignOutError> {
        let previous = self.get_session().principal;
        self.commit(None, Some(SessionSignal::SignedOut));

        match self.provider.sign_out().await {
            Ok(()) => {
                info!(
                    principal_id = previous.as_ref().map(|p| p.id.as_str()),
                    "Signed out"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    principal_id = previous.as_ref().map(|p| p.id.as_str()),
                    error = %e,
                    "Remote sign-out failed; local session cleared anyway"
                );
                Err(SignOutError::Remote(e))
            }
        }
    }

    /// Mark an auth-state transition as in flight. Listeners are not notified.
    pub(crate) fn begin_transition(&self) {
        self.state.send_modify(|s| s.status = SessionStatus::Settling);
    }

    /// Commit a principal, resolve status to Ready and notify listeners
    pub(crate) fn commit(&self, principal: Option<Principal>, signal: Option<SessionSignal>) -> Session {
        let session = Session {
            principal,
            status: SessionStatus::Ready,
        };
        self.state.send_replace(session.clone());
        self.notify(SessionNotice {
            session: session.clone(),
            signal,
        });
        session
    }

    /// Resolve status to Ready keeping the current principal
    pub(crate) fn settle(&self) -> Session {
        let mut changed = false;
        self.state.send_if_modified(|s| {
            changed = s.status != SessionStatus::Ready;
            s.status = SessionStatus::Ready;
            changed
        });
        let session = self.get_session();
        if changed {
            self.notify(SessionNotice {
                session: session.clone(),
                signal: None,
            });
        }
        session
    }

    fn notify(&self, notice: SessionNotice) {
        // Snapshot so listeners may (un)subscribe from inside a callback
        let listeners: Vec<Listener> = lock(&self.listeners).entries.values().cloned().collect();
        debug!(
            listeners = listeners.len(),
            principal_id = notice.session.principal_id(),
            signal = ?notice.signal,
            "Session transition committed"
        );
        for listener in listeners {
            listener(&notice);
        }
    }
}
