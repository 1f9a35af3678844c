// Role assignment admin operations - grant/revoke/list for the admin panel

use crate::api::{RoleStore, UserDirectory};
use crate::auth::role_resolver::RoleResolver;
use crate::core::errors::WriteError;
use crate::core::models::{DirectoryUser, Principal, Role, RoleAssignment};
use crate::state::session_store::SessionStore;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Grant,
    Revoke,
}

impl Mutation {
    fn as_str(self) -> &'static str {
        match self {
            Mutation::Grant => "grant",
            Mutation::Revoke => "revoke",
        }
    }
}

/// Role assignment admin
///
/// Every operation is authorized against the acting principal's resolved
/// roles before the store is contacted. Grant and revoke are idempotent:
/// the target's current roles are read first and a no-op succeeds without
/// writing.
pub struct RoleAdmin {
    store: Arc<dyn RoleStore>,
    directory: Option<Arc<dyn UserDirectory>>,
    resolver: Arc<RoleResolver>,
    session: Arc<SessionStore>,
}

impl RoleAdmin {
    pub fn new(
        store: Arc<dyn RoleStore>,
        resolver: Arc<RoleResolver>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            store,
            directory: None,
            resolver,
            session,
        }
    }

    /// Enable `list_users` (needs privileged access to the provider)
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub async fn grant_role(&self, principal_id: &str, role: Role) -> Result<(), WriteError> {
        self.mutate(Mutation::Grant, principal_id, role).await
    }

    pub async fn revoke_role(&self, principal_id: &str, role: Role) -> Result<(), WriteError> {
        self.mutate(Mutation::Revoke, principal_id, role).await
    }

    /// Every registered principal with its current role set
    pub async fn list_users(&self) -> Result<Vec<DirectoryUser>, WriteError> {
        self.authorize("list_users")?;
        let directory = self
            .directory
            .as_ref()
            .ok_or_else(|| WriteError::NotConfigured("user directory (service key)".to_string()))?;

        let principals = directory.list_users().await?;
        let users = try_join_all(principals.into_iter().map(|p| async move {
            let roles = self.store.roles_for(&p.id).await?;
            Ok::<_, WriteError>(DirectoryUser {
                id: p.id,
                email: p.email,
                roles,
            })
        }))
        .await?;

        debug!(count = users.len(), "Listed directory users");
        Ok(users)
    }

    /// Acting principal, if it currently holds `admin` in a settled resolution
    fn authorize(&self, action: &str) -> Result<Principal, WriteError> {
        let actor = self.session.get_session().principal;
        let granted = self.resolver.granted();

        match actor {
            Some(actor)
                if granted.principal_id.as_deref() == Some(actor.id.as_str())
                    && granted.state.contains(Role::Admin) =>
            {
                Ok(actor)
            }
            Some(actor) => {
                warn!(
                    principal_id = %actor.id,
                    action = action,
                    "Rejected role mutation from non-admin principal"
                );
                Err(WriteError::Unauthorized(format!("{} requires admin", action)))
            }
            None => {
                warn!(action = action, "Rejected role mutation without a principal");
                Err(WriteError::Unauthorized(format!("{} requires a signed-in admin", action)))
            }
        }
    }

    async fn mutate(&self, mutation: Mutation, principal_id: &str, role: Role) -> Result<(), WriteError> {
        let actor = self.authorize(mutation.as_str())?;

        let held = self.store.roles_for(principal_id).await?.contains(&role);
        let assignment = RoleAssignment::new(principal_id, role);

        let outcome = match (mutation, held) {
            (Mutation::Grant, true) | (Mutation::Revoke, false) => {
                debug!(
                    principal_id = principal_id,
                    role = %role,
                    mutation = mutation.as_str(),
                    "Role already in requested state; nothing to write"
                );
                return Ok(());
            }
            (Mutation::Grant, false) => self.store.insert(&assignment).await,
            (Mutation::Revoke, true) => self.store.delete(&assignment).await,
        };

        match outcome {
            Ok(()) => {}
            Err(WriteError::Conflict(reason)) => {
                debug!(
                    principal_id = principal_id,
                    role = %role,
                    reason = %reason,
                    "Store reported a conflicting write; treating as success"
                );
            }
            Err(e) => return Err(e),
        }

        info!(
            actor = %actor.id,
            principal_id = principal_id,
            role = %role,
            mutation = mutation.as_str(),
            "Role assignment updated"
        );

        if actor.id == principal_id {
            self.resolver.refresh().await;
        }
        Ok(())
    }
}
