// Credential flows - sign-in, sign-up and password reset with user-visible outcomes

use crate::api::{AuthProvider, SignUpRequest};
use crate::core::errors::AuthError;
use crate::core::notice::Notice;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
const SIGN_UP_REDIRECT_PATH: &str = "/auth";

/// Explicit credential actions.
///
/// Session changes are not applied here: a successful sign-in surfaces
/// through the provider's event stream and the reducer.
pub struct CredentialFlows {
    provider: Arc<dyn AuthProvider>,
    site_url: String,
}

impl CredentialFlows {
    pub fn new(provider: Arc<dyn AuthProvider>, site_url: impl Into<String>) -> Self {
        Self {
            provider,
            site_url: site_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn reset_redirect_url(&self) -> String {
        format!("{}{}", self.site_url, RESET_PASSWORD_PATH)
    }

    pub fn sign_up_redirect_url(&self) -> String {
        format!("{}{}", self.site_url, SIGN_UP_REDIRECT_PATH)
    }

    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Notice, AuthError> {
        let email = normalize_email(email)?;
        if password.expose_secret().is_empty() {
            return Err(AuthError::InvalidInput("Password is required".to_string()));
        }

        match self.provider.sign_in_with_password(&email, password).await {
            Ok(session) => {
                info!(principal_id = %session.user.id, "Password sign-in succeeded");
                Ok(Notice::info("Welcome back!", "You have successfully logged in."))
            }
            Err(e) => {
                warn!(error = %e, "Password sign-in failed");
                Err(e)
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: SecretString,
        full_name: &str,
    ) -> Result<Notice, AuthError> {
        let email = normalize_email(email)?;
        if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword {
                min_len: MIN_PASSWORD_LEN,
            });
        }

        let request = SignUpRequest {
            email,
            password,
            full_name: full_name.trim().to_string(),
            email_redirect_to: self.sign_up_redirect_url(),
        };
        self.provider.sign_up(&request).await.map_err(|e| {
            warn!(error = %e, "Sign-up failed");
            e
        })?;

        info!("Sign-up accepted; confirmation email pending");
        Ok(Notice::info(
            "Success!",
            "Please check your email to verify your account.",
        ))
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<Notice, AuthError> {
        let email = normalize_email(email)?;
        self.provider
            .reset_password_for_email(&email, &self.reset_redirect_url())
            .await
            .map_err(|e| {
                warn!(error = %e, "Password reset request failed");
                e
            })?;

        Ok(Notice::info(
            "Password Reset Email Sent",
            "Please check your email and click the reset link to set a new password.",
        ))
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidInput("A valid email address is required".to_string()));
    }
    Ok(email.to_string())
}
