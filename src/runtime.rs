// Composition root - owns the session lifecycle from mount to unmount

use crate::api::{AuthProvider, CrimeStore, RoleStore, UserDirectory};
use crate::auth::access_gate::{AccessGate, GateDecision, ProtectedView};
use crate::auth::credentials::CredentialFlows;
use crate::auth::reducer::AuthEventReducer;
use crate::auth::role_admin::RoleAdmin;
use crate::auth::role_resolver::RoleResolver;
use crate::core::errors::SignOutError;
use crate::core::events::AuthEvent;
use crate::core::notice::Notice;
use crate::crime::registry::CrimeRegistry;
use crate::state::role_cache::MokaRoleCache;
use crate::state::session_store::SessionStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Access runtime
///
/// One per running client. `mount` subscribes to the provider, probes for
/// an existing session and starts the reducer; `unmount` stops consuming
/// provider events. Role fetches already in flight complete, and the
/// resolver discards their results if the principal has moved on.
pub struct AccessRuntime {
    provider: Arc<dyn AuthProvider>,
    role_store: Arc<dyn RoleStore>,
    session: Arc<SessionStore>,
    resolver: Arc<RoleResolver>,
    gate: AccessGate,
    notices_tx: mpsc::UnboundedSender<Notice>,
    notices_rx: Option<mpsc::UnboundedReceiver<Notice>>,
    reducer_task: Option<JoinHandle<()>>,
}

impl AccessRuntime {
    pub fn new(provider: Arc<dyn AuthProvider>, role_store: Arc<dyn RoleStore>, cache: MokaRoleCache) -> Self {
        let session = Arc::new(SessionStore::new(provider.clone()));
        let resolver = Arc::new(RoleResolver::new(role_store.clone(), cache));
        let gate = AccessGate::new(session.clone(), resolver.clone());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        Self {
            provider,
            role_store,
            session,
            resolver,
            gate,
            notices_tx,
            notices_rx: Some(notices_rx),
            reducer_task: None,
        }
    }

    /// Subscribe, reduce the initial probe, then consume provider events.
    /// The session is Ready when this returns. Mounting twice is a no-op.
    pub async fn mount(&mut self) {
        if self.is_mounted() {
            debug!("Access runtime already mounted");
            return;
        }

        // Subscribe before probing so no event between the two is lost
        let subscription = self.provider.subscribe();
        let mut reducer = AuthEventReducer::new(self.session.clone(), self.resolver.clone())
            .with_notices(self.notices_tx.clone());

        let probe = self.provider.get_session().await;
        reducer.handle(AuthEvent::InitialSession(probe)).await;

        self.reducer_task = Some(tokio::spawn(reducer.run(subscription)));
        info!(
            principal_id = self.session.get_session().principal_id(),
            "Access runtime mounted"
        );
    }

    /// Stop consuming provider events
    pub fn unmount(&mut self) {
        if let Some(task) = self.reducer_task.take() {
            task.abort();
            info!("Access runtime unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.reducer_task
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn resolver(&self) -> &Arc<RoleResolver> {
        &self.resolver
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub fn decide_view(&self, view: ProtectedView) -> GateDecision {
        self.gate.decide_view(view)
    }

    pub fn can_view(&self, view: ProtectedView) -> bool {
        self.decide_view(view).is_render()
    }

    /// Sign out and drop the resolved roles without waiting for the
    /// provider's echo, which may never come when the remote call fails
    pub async fn sign_out(&self) -> Result<(), SignOutError> {
        let result = self.session.sign_out().await;
        self.resolver.on_principal_changed(None).await;
        result
    }

    /// Notices raised by the reducer (e.g. "Session Expired").
    /// The receiver can be taken once.
    pub fn take_notices(&mut self) -> Option<mpsc::UnboundedReceiver<Notice>> {
        self.notices_rx.take()
    }

    pub fn role_admin(&self, directory: Option<Arc<dyn UserDirectory>>) -> RoleAdmin {
        let admin = RoleAdmin::new(self.role_store.clone(), self.resolver.clone(), self.session.clone());
        match directory {
            Some(directory) => admin.with_directory(directory),
            None => admin,
        }
    }

    pub fn credentials(&self, site_url: &str) -> CredentialFlows {
        CredentialFlows::new(self.provider.clone(), site_url)
    }

    pub fn crime_registry(&self, store: Arc<dyn CrimeStore>) -> CrimeRegistry {
        CrimeRegistry::new(store, self.gate.clone())
    }
}

impl Drop for AccessRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.reducer_task.take() {
            task.abort();
        }
    }
}
