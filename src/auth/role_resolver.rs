// Role resolution - maps the current principal to its granted role set

use crate::api::RoleStore;
use crate::core::errors::FetchError;
use crate::core::models::{Principal, Role, RoleSet};
use crate::state::role_cache::MokaRoleCache;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Resolution state of the current principal's roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleState {
    Loading,
    Ready(RoleSet),
}

impl RoleState {
    pub fn roles(&self) -> Option<&RoleSet> {
        match self {
            RoleState::Loading => None,
            RoleState::Ready(roles) => Some(roles),
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        self.roles().map_or(false, |roles| roles.contains(&role))
    }
}

/// Roles published for the principal they were resolved for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedRoles {
    pub principal_id: Option<String>,
    pub state: RoleState,
}

impl GrantedRoles {
    fn anonymous() -> Self {
        Self {
            principal_id: None,
            state: RoleState::Ready(RoleSet::new()),
        }
    }
}

/// Role resolver
///
/// Single writer of the per-principal role cache and of the published
/// `GrantedRoles`. Lookups are only made for a non-null principal, failures
/// resolve to the empty set, and a response that arrives after the
/// principal has changed is discarded.
pub struct RoleResolver {
    store: Arc<dyn RoleStore>,
    cache: MokaRoleCache,
    granted: watch::Sender<GrantedRoles>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn RoleStore>, cache: MokaRoleCache) -> Self {
        let (granted, _) = watch::channel(GrantedRoles::anonymous());
        Self {
            store,
            cache,
            granted,
        }
    }

    pub fn granted(&self) -> GrantedRoles {
        self.granted.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GrantedRoles> {
        self.granted.subscribe()
    }

    /// Roles of the current principal; empty unless resolution finished
    pub fn current_roles(&self) -> RoleSet {
        self.granted.borrow().state.roles().cloned().unwrap_or_default()
    }

    fn is_current(&self, principal_id: &str) -> bool {
        self.granted.borrow().principal_id.as_deref() == Some(principal_id)
    }

    /// Roles for a principal, served from the cache when possible.
    /// Only results for the current principal are cached.
    pub async fn get_roles(&self, principal_id: &str) -> Result<RoleSet, FetchError> {
        if let Some(roles) = self.cache.get(principal_id).await {
            return Ok(roles);
        }

        let roles = self.store.roles_for(principal_id).await?;

        if self.is_current(principal_id) {
            self.cache.insert(principal_id, roles.clone()).await;
        } else {
            debug!(principal_id = principal_id, "Not caching roles for non-current principal");
        }
        Ok(roles)
    }

    /// React to a principal change committed by the session store
    pub async fn on_principal_changed(&self, principal: Option<&Principal>) {
        let previous = self.granted.borrow().principal_id.clone();
        let next = principal.map(|p| p.id.clone());

        if previous != next {
            if let Some(ref old) = previous {
                self.cache.invalidate(old).await;
            }
        }

        let Some(principal_id) = next else {
            self.publish(GrantedRoles::anonymous());
            return;
        };

        // Same principal with resolved roles (e.g. token refresh): keep the
        // current set visible while re-validating through the cache.
        let keep_visible = previous.as_deref() == Some(principal_id.as_str())
            && matches!(self.granted.borrow().state, RoleState::Ready(_));
        if !keep_visible {
            self.publish(GrantedRoles {
                principal_id: Some(principal_id.clone()),
                state: RoleState::Loading,
            });
        }

        self.resolve_and_publish(&principal_id).await;
    }

    /// Re-fetch the current principal's roles bypassing the cache
    pub async fn refresh(&self) {
        let current = self.granted.borrow().principal_id.clone();
        if let Some(principal_id) = current {
            self.cache.invalidate(&principal_id).await;
            self.resolve_and_publish(&principal_id).await;
        }
    }

    async fn resolve_and_publish(&self, principal_id: &str) {
        let roles = match self.get_roles(principal_id).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(
                    principal_id = principal_id,
                    error = %e,
                    "Role lookup failed; denying by default"
                );
                RoleSet::new()
            }
        };

        if !self.is_current(principal_id) {
            debug!(principal_id = principal_id, "Discarding stale role response");
            return;
        }

        info!(
            principal_id = principal_id,
            roles = ?roles,
            "Roles resolved"
        );
        self.publish(GrantedRoles {
            principal_id: Some(principal_id.to_string()),
            state: RoleState::Ready(roles),
        });
    }

    fn publish(&self, granted: GrantedRoles) {
        self.granted.send_replace(granted);
    }
}
