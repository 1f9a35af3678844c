// Domain error types - session, role and credential failures with safe user messages

use thiserror::Error;

/// Provider messages and codes meaning the token or principal is gone upstream.
const INVALID_SESSION_MARKERS: &[&str] = &[
    "user from sub claim in jwt does not exist",
    "invalid refresh token",
    "refresh token not found",
    "invalid jwt",
    "jwt expired",
    "session not found",
];

const INVALID_SESSION_CODES: &[&str] = &[
    "user_not_found",
    "session_not_found",
    "session_expired",
    "bad_jwt",
    "refresh_token_not_found",
    "refresh_token_already_used",
    "PGRST301",
];

/// Returns true when a provider message or error code belongs to the
/// stale/invalid token class.
pub fn is_invalid_session_marker(message: &str, code: Option<&str>) -> bool {
    if let Some(code) = code {
        if INVALID_SESSION_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            return true;
        }
    }
    let lowered = message.to_lowercase();
    INVALID_SESSION_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Failure while reading from the auth provider or a backing table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure, timeout, throttling or an open circuit
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// Token or principal no longer valid upstream
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Upstream rejected the request for a non-transient reason
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn is_invalid_session(&self) -> bool {
        matches!(self, FetchError::InvalidSession(_))
    }

    /// Upstream error code, if the backend supplied one
    pub fn code(&self) -> Option<&str> {
        match self {
            FetchError::Upstream { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Upstream HTTP status, if the request reached the backend
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a role or crime record mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Acting principal lacks the role required for the mutation.
    /// Raised before any network call.
    #[error("Unauthorized write: {0}")]
    Unauthorized(String),

    /// Duplicate grant or revoke of an absent row
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Operation needs a backend capability this client was not built with
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Remote half of a sign-out failed; local state is already cleared
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignOutError {
    #[error("Remote sign-out failed: {0}")]
    Remote(#[from] FetchError),
}

/// Failure of an explicit credential action (sign-in, sign-up, reset)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Auth provider error: {0}")]
    Provider(#[from] FetchError),
}

impl AuthError {
    /// User-facing message (no infrastructure details)
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid login credentials".to_string(),
            AuthError::EmailNotConfirmed => {
                "Please check your email and click the verification link before logging in."
                    .to_string()
            }
            AuthError::WeakPassword { min_len } => {
                format!("Password should be at least {} characters.", min_len)
            }
            AuthError::InvalidInput(reason) => reason.clone(),
            AuthError::Provider(FetchError::Upstream { message, .. }) => message.clone(),
            AuthError::Provider(_) => "Service unavailable, please try again.".to_string(),
        }
    }
}

/// Top-level error for composition and configuration
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    SignOut(#[from] SignOutError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AccessError {
    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            AccessError::ConfigurationError(_) => "Internal error".to_string(),
            AccessError::Fetch(_) => "Service unavailable".to_string(),
            AccessError::Write(WriteError::Unauthorized(_)) => {
                "You are not allowed to perform this action".to_string()
            }
            AccessError::Write(WriteError::NotConfigured(_)) => "Not available in this deployment".to_string(),
            AccessError::Write(_) => "Failed to save changes".to_string(),
            AccessError::SignOut(_) => "Signed out locally".to_string(),
            AccessError::Auth(e) => e.user_message(),
        }
    }
}
