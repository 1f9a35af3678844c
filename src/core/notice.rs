// User-visible notices for explicit actions (rendered by the host as toasts)

use crate::core::errors::{AuthError, WriteError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }

    pub fn session_expired() -> Self {
        Self::destructive("Session Expired", "Please sign in again.")
    }

    pub fn for_auth_error(err: &AuthError) -> Self {
        match err {
            AuthError::EmailNotConfirmed => Self::destructive("Email Not Verified", err.user_message()),
            _ => Self::destructive("Error", err.user_message()),
        }
    }

    /// Outcome notice for an admin mutation
    pub fn for_write_result(result: &Result<(), WriteError>, success: &str, failure: &str) -> Self {
        match result {
            Ok(()) => Self::info("Success", success),
            Err(WriteError::Unauthorized(_)) => {
                Self::destructive("Error", "You are not allowed to perform this action")
            }
            Err(WriteError::NotConfigured(_)) => {
                Self::destructive("Error", "This action is not available in this deployment")
            }
            Err(_) => Self::destructive("Error", failure),
        }
    }
}
