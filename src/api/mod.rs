// Collaborator ports - the contract surface of the auth provider and data stores

use crate::core::errors::{AuthError, FetchError, WriteError};
use crate::core::events::AuthSubscription;
use crate::core::models::{CrimeRecord, NewCrimeRecord, Principal, ProviderSession, RoleAssignment, RoleSet};
use secrecy::SecretString;

/// Sign-up form payload
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub full_name: String,
    /// Where the confirmation email should send the user back to
    pub email_redirect_to: String,
}

/// Hosted authentication service
///
/// Implementations publish lifecycle events (sign-in, sign-out, refresh,
/// recovery) on the stream returned by `subscribe`, in the order they occur.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Probe for an existing session
    async fn get_session(&self) -> Result<Option<ProviderSession>, FetchError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<ProviderSession, AuthError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), AuthError>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), FetchError>;

    fn subscribe(&self) -> AuthSubscription;
}

/// `user_roles` table keyed by principal id
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn roles_for(&self, principal_id: &str) -> Result<RoleSet, FetchError>;
    async fn insert(&self, assignment: &RoleAssignment) -> Result<(), WriteError>;
    async fn delete(&self, assignment: &RoleAssignment) -> Result<(), WriteError>;
}

/// Admin listing of every registered principal
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<Principal>, FetchError>;
}

/// Crime records keyed by case type
#[async_trait::async_trait]
pub trait CrimeStore: Send + Sync {
    async fn records_by_type(&self, crime_type: &str) -> Result<Vec<CrimeRecord>, FetchError>;
    async fn insert_record(&self, record: &NewCrimeRecord) -> Result<(), WriteError>;
}
