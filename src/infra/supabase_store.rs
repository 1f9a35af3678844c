// PostgREST-backed role and crime stores, GoTrue admin user directory

use crate::api::{CrimeStore, RoleStore, UserDirectory};
use crate::core::errors::{FetchError, WriteError};
use crate::core::models::{CrimeRecord, NewCrimeRecord, Principal, ProviderUser, Role, RoleAssignment, RoleSet};
use crate::infra::supabase::{Credential, SupabaseClient};
use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const USER_ROLES_PATH: &str = "/rest/v1/user_roles";
const CRIMES_PATH: &str = "/rest/v1/crimes";
const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Users requested per admin listing page
const ADMIN_PAGE_SIZE: usize = 1000;

/// Duplicate rows come back as 409 / 23505; everything else stays a fetch error
pub(crate) fn map_write_error(e: FetchError) -> WriteError {
    if e.status() == Some(409) || e.code() == Some(UNIQUE_VIOLATION) {
        return WriteError::Conflict(e.to_string());
    }
    if matches!(e.status(), Some(401) | Some(403)) {
        return WriteError::Unauthorized(e.to_string());
    }
    WriteError::Fetch(e)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleRow {
    pub(crate) role: String,
}

/// Build a role set from table rows, skipping values outside the Role enum
pub(crate) fn roles_from_rows(principal_id: &str, rows: Vec<RoleRow>) -> RoleSet {
    rows.into_iter()
        .filter_map(|row| match row.role.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(principal_id = principal_id, error = %e, "Skipping unknown role row");
                None
            }
        })
        .collect()
}

/// `user_roles` table
pub struct SupabaseRoleStore {
    client: Arc<SupabaseClient>,
}

impl SupabaseRoleStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleStore for SupabaseRoleStore {
    async fn roles_for(&self, principal_id: &str) -> Result<RoleSet, FetchError> {
        let request = self
            .client
            .request(Method::GET, USER_ROLES_PATH, Credential::Session)
            .query(&[("user_id", format!("eq.{}", principal_id)), ("select", "role".to_string())]);

        let rows: Vec<RoleRow> = self.client.send_json(request).await?;
        debug!(principal_id = principal_id, rows = rows.len(), "Fetched role rows");
        Ok(roles_from_rows(principal_id, rows))
    }

    async fn insert(&self, assignment: &RoleAssignment) -> Result<(), WriteError> {
        let request = self
            .client
            .request(Method::POST, USER_ROLES_PATH, Credential::Session)
            .header("Prefer", "return=minimal")
            .json(assignment);
        self.client.send_empty(request).await.map_err(map_write_error)
    }

    async fn delete(&self, assignment: &RoleAssignment) -> Result<(), WriteError> {
        let request = self
            .client
            .request(Method::DELETE, USER_ROLES_PATH, Credential::Session)
            .header("Prefer", "return=minimal")
            .query(&[
                ("user_id", format!("eq.{}", assignment.principal_id)),
                ("role", format!("eq.{}", assignment.role)),
            ]);
        self.client.send_empty(request).await.map_err(map_write_error)
    }
}

/// `crimes` table
pub struct SupabaseCrimeStore {
    client: Arc<SupabaseClient>,
}

impl SupabaseCrimeStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CrimeStore for SupabaseCrimeStore {
    async fn records_by_type(&self, crime_type: &str) -> Result<Vec<CrimeRecord>, FetchError> {
        let request = self
            .client
            .request(Method::GET, CRIMES_PATH, Credential::Session)
            .query(&[
                ("crime_type", format!("eq.{}", crime_type)),
                ("select", "*".to_string()),
                ("order", "case_number.asc".to_string()),
            ]);
        self.client.send_json(request).await
    }

    async fn insert_record(&self, record: &NewCrimeRecord) -> Result<(), WriteError> {
        let request = self
            .client
            .request(Method::POST, CRIMES_PATH, Credential::Session)
            .header("Prefer", "return=minimal")
            .json(record);
        self.client.send_empty(request).await.map_err(map_write_error)
    }
}

#[derive(Debug, Deserialize)]
struct AdminUsersPage {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

/// GoTrue admin listing; requires the service role key
pub struct SupabaseUserDirectory {
    client: Arc<SupabaseClient>,
    service_role_key: SecretString,
}

impl SupabaseUserDirectory {
    pub fn new(client: Arc<SupabaseClient>, service_role_key: SecretString) -> Self {
        Self {
            client,
            service_role_key,
        }
    }
}

#[async_trait]
impl UserDirectory for SupabaseUserDirectory {
    async fn list_users(&self) -> Result<Vec<Principal>, FetchError> {
        let mut principals = Vec::new();
        let mut page = 1usize;

        loop {
            let request = self
                .client
                .request(Method::GET, ADMIN_USERS_PATH, Credential::Service(&self.service_role_key))
                .query(&[("page", page.to_string()), ("per_page", ADMIN_PAGE_SIZE.to_string())]);
            let batch: AdminUsersPage = self.client.send_json(request).await?;

            let fetched = batch.users.len();
            principals.extend(batch.users.iter().map(ProviderUser::principal));
            if fetched < ADMIN_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!(count = principals.len(), "Listed users from auth directory");
        Ok(principals)
    }
}
