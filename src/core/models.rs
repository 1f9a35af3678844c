// Domain models - principals, sessions, roles and crime records

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Authenticated identity of the current user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Initial probe or an auth-state transition is in flight
    Settling,
    Ready,
}

/// Client-side session snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Option<Principal>,
    pub status: SessionStatus,
}

impl Session {
    pub fn settling() -> Self {
        Self {
            principal: None,
            status: SessionStatus::Settling,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    pub fn principal_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }
}

/// Flat role granted to a principal. No role implies another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Moderator, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Set of roles; ordered so logs and listings are deterministic
pub type RoleSet = BTreeSet<Role>;

/// Build a RoleSet from host-supplied role names, rejecting unknown names
pub fn parse_role_set<I, S>(names: I) -> Result<RoleSet, UnknownRole>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|n| n.as_ref().parse()).collect()
}

/// Row of the `user_roles` table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    #[serde(rename = "user_id")]
    pub principal_id: String,
    pub role: Role,
}

impl RoleAssignment {
    pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: principal_id.into(),
            role,
        }
    }
}

/// User object as returned by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl ProviderUser {
    pub fn principal(&self) -> Principal {
        Principal::new(self.id.clone(), self.email.clone().unwrap_or_default())
    }
}

/// Seconds before expiry at which a session is treated as expired
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Provider-side session: tokens plus the user they belong to
#[derive(Clone)]
pub struct ProviderSession {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: ProviderUser,
}

impl ProviderSession {
    pub fn principal(&self) -> Principal {
        self.user.principal()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now,
            None => false,
        }
    }
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("access_token", &"<REDACTED>")
            .field("refresh_token", &"<REDACTED>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Principal with its role set, as listed in the admin panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryUser {
    pub id: String,
    pub email: String,
    pub roles: RoleSet,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub url: String,
}

/// Historical crime record; `case_number` is the natural key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeRecord {
    pub case_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suspect: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub evidence: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub investigating_officer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub references: Vec<Reference>,
}

/// Insert row for the `crimes` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCrimeRecord {
    pub crime_type: String,
    #[serde(flatten)]
    pub record: CrimeRecord,
}
