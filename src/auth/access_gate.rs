// Access gate - render/deny decisions for protected views

use crate::auth::role_resolver::{RoleResolver, RoleState};
use crate::core::models::{Role, RoleSet};
use crate::state::session_store::SessionStore;
use std::sync::Arc;
use tracing::debug;

/// True iff the required and granted sets intersect.
/// Roles are flat: holding `admin` does not imply `moderator` or `user`.
pub fn can_render(required: &RoleSet, granted: &RoleSet) -> bool {
    !required.is_disjoint(granted)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Render,
    Deny,
}

impl GateDecision {
    pub fn is_render(self) -> bool {
        self == GateDecision::Render
    }
}

/// Decision against a resolution state; loading roles are denied
pub fn decide(required: &RoleSet, state: &RoleState) -> GateDecision {
    match state {
        RoleState::Loading => GateDecision::Deny,
        RoleState::Ready(granted) if can_render(required, granted) => GateDecision::Render,
        RoleState::Ready(_) => GateDecision::Deny,
    }
}

/// Views of the dashboard that are only rendered for specific roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedView {
    /// User and role management panel
    AdminPanel,
    /// "Add crime" record form
    CrimeCreation,
}

impl ProtectedView {
    pub const ALL: [ProtectedView; 2] = [ProtectedView::AdminPanel, ProtectedView::CrimeCreation];

    pub fn required_roles(&self) -> RoleSet {
        match self {
            ProtectedView::AdminPanel => RoleSet::from([Role::Admin]),
            ProtectedView::CrimeCreation => RoleSet::from([Role::Admin]),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtectedView::AdminPanel => "admin_panel",
            ProtectedView::CrimeCreation => "crime_creation",
        }
    }
}

/// Gate bound to the live (principal, roles) pair.
///
/// Roles only count while they were resolved for the principal the session
/// currently holds. A local sign-out denies at once, before the resolver
/// has caught up with the change.
#[derive(Clone)]
pub struct AccessGate {
    session: Arc<SessionStore>,
    resolver: Arc<RoleResolver>,
}

impl AccessGate {
    pub fn new(session: Arc<SessionStore>, resolver: Arc<RoleResolver>) -> Self {
        Self { session, resolver }
    }

    pub fn decide(&self, required: &RoleSet) -> GateDecision {
        let session = self.session.get_session();
        let granted = self.resolver.granted();

        if session.principal_id() != granted.principal_id.as_deref() {
            debug!(
                principal_id = session.principal_id(),
                resolved_for = granted.principal_id.as_deref(),
                "Roles resolved for another principal; denying"
            );
            return GateDecision::Deny;
        }
        decide(required, &granted.state)
    }

    pub fn decide_view(&self, view: ProtectedView) -> GateDecision {
        self.decide(&view.required_roles())
    }
}
