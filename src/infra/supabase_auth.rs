// GoTrue-backed auth provider

use crate::api::{AuthProvider, SignUpRequest};
use crate::core::errors::{AuthError, FetchError};
use crate::core::events::{AuthEvent, AuthEventBus, AuthSubscription};
use crate::core::models::{ProviderSession, ProviderUser};
use crate::infra::supabase::{Credential, SupabaseClient};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Token grant response of `/auth/v1/token`
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> ProviderSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| self.expires_in.and_then(|secs| expiry_after(now, secs)));

        ProviderSession {
            access_token: SecretString::new(self.access_token),
            refresh_token: SecretString::new(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// `now + secs`, or no expiry when the server value is out of range
fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d))
}

/// Map provider failures of a credential action to `AuthError`
pub(crate) fn map_auth_error(e: FetchError) -> AuthError {
    if let FetchError::Upstream {
        ref code,
        ref message,
        ..
    } = e
    {
        let code = code.as_deref().unwrap_or_default();
        if code == "email_not_confirmed" || message.eq_ignore_ascii_case("Email not confirmed") {
            return AuthError::EmailNotConfirmed;
        }
        if code == "invalid_credentials"
            || code == "invalid_grant"
            || message.eq_ignore_ascii_case("Invalid login credentials")
        {
            return AuthError::InvalidCredentials;
        }
        if code == "weak_password" {
            return AuthError::WeakPassword {
                min_len: crate::auth::credentials::MIN_PASSWORD_LEN,
            };
        }
    }
    AuthError::Provider(e)
}

/// Session tokens carried in the fragment of an email link
/// (`#access_token=...&refresh_token=...&type=recovery`)
struct RedirectTokens {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_in: Option<i64>,
    kind: Option<String>,
}

fn parse_redirect_fragment(redirect_url: &str) -> Result<RedirectTokens, AuthError> {
    let url = url::Url::parse(redirect_url)
        .map_err(|e| AuthError::InvalidInput(format!("Invalid redirect URL: {}", e)))?;
    let fragment = url
        .fragment()
        .ok_or_else(|| AuthError::InvalidInput("Redirect URL carries no session".to_string()))?;

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut kind = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(SecretString::new(value.into_owned())),
            "refresh_token" => refresh_token = Some(SecretString::new(value.into_owned())),
            "expires_in" => expires_in = value.parse().ok(),
            "type" => kind = Some(value.into_owned()),
            "error_description" => return Err(AuthError::InvalidInput(value.into_owned())),
            _ => {}
        }
    }

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token)) => Ok(RedirectTokens {
            access_token,
            refresh_token,
            expires_in,
            kind,
        }),
        _ => Err(AuthError::InvalidInput("Redirect URL carries no session".to_string())),
    }
}

/// Auth provider backed by the Supabase GoTrue API
///
/// Keeps the current provider session in memory and publishes lifecycle
/// events on its bus in the order the underlying calls complete.
pub struct SupabaseAuthProvider {
    client: Arc<SupabaseClient>,
    session: RwLock<Option<ProviderSession>>,
    events: AuthEventBus,
}

impl SupabaseAuthProvider {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self {
            client,
            session: RwLock::new(None),
            events: AuthEventBus::default(),
        }
    }

    /// Seed a previously persisted session; no event is emitted
    pub async fn restore_session(&self, session: ProviderSession) {
        self.store_session(Some(session)).await;
    }

    pub async fn current_session(&self) -> Option<ProviderSession> {
        self.session.read().await.clone()
    }

    /// Exchange the refresh token for a new session.
    /// Failures are published as `FetchFailed` so the reducer can react.
    pub async fn refresh_session(&self) -> Result<ProviderSession, FetchError> {
        let refresh_token = match self.session.read().await.as_ref() {
            Some(session) => session.refresh_token.clone(),
            None => {
                return Err(FetchError::InvalidSession("No session to refresh".to_string()));
            }
        };

        match self.grant_refresh(&refresh_token).await {
            Ok(session) => {
                debug!(principal_id = %session.user.id, "Access token refreshed");
                self.store_session(Some(session.clone())).await;
                self.events.emit(AuthEvent::TokenRefreshed(session.clone()));
                Ok(session)
            }
            Err(e) => {
                if e.is_invalid_session() {
                    self.store_session(None).await;
                }
                self.events.emit(AuthEvent::FetchFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Check the current access token against `/auth/v1/user`.
    /// A principal deleted upstream surfaces as `FetchFailed(InvalidSession)`.
    pub async fn validate_session(&self) -> Result<Option<ProviderUser>, FetchError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };

        match self.fetch_user(&session.access_token).await {
            Ok(user) => {
                if user != session.user {
                    let updated = ProviderSession {
                        user: user.clone(),
                        ..session
                    };
                    self.store_session(Some(updated.clone())).await;
                    self.events.emit(AuthEvent::UserUpdated(updated));
                }
                Ok(Some(user))
            }
            Err(e) => {
                if e.is_invalid_session() {
                    self.store_session(None).await;
                }
                self.events.emit(AuthEvent::FetchFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Complete an email link (password recovery or sign-up confirmation)
    /// from the URL the user landed on.
    pub async fn complete_redirect(&self, redirect_url: &str) -> Result<ProviderSession, AuthError> {
        let tokens = parse_redirect_fragment(redirect_url)?;
        let user = self.fetch_user(&tokens.access_token).await.map_err(map_auth_error)?;

        let session = ProviderSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_in.and_then(|secs| expiry_after(Utc::now(), secs)),
            user,
        };
        self.store_session(Some(session.clone())).await;

        if tokens.kind.as_deref() == Some("recovery") {
            info!(principal_id = %session.user.id, "Password recovery link opened");
            self.events.emit(AuthEvent::PasswordRecovery);
        } else {
            self.events.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(session)
    }

    async fn store_session(&self, session: Option<ProviderSession>) {
        self.client
            .set_session_token(session.as_ref().map(|s| s.access_token.clone()));
        *self.session.write().await = session;
    }

    async fn grant_refresh(&self, refresh_token: &SecretString) -> Result<ProviderSession, FetchError> {
        let request = self
            .client
            .request(Method::POST, "/auth/v1/token", Credential::Anon)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token.expose_secret() }));
        let response: TokenResponse = self.client.send_json(request).await?;
        Ok(response.into_session(Utc::now()))
    }

    async fn fetch_user(&self, access_token: &SecretString) -> Result<ProviderUser, FetchError> {
        let request = self
            .client
            .request(Method::GET, "/auth/v1/user", Credential::User(access_token));
        self.client.send_json(request).await
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn get_session(&self) -> Result<Option<ProviderSession>, FetchError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };

        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(session));
        }

        debug!(principal_id = %session.user.id, "Stored session expired; refreshing");
        match self.grant_refresh(&session.refresh_token).await {
            Ok(refreshed) => {
                self.store_session(Some(refreshed.clone())).await;
                self.events.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) => {
                if e.is_invalid_session() {
                    self.store_session(None).await;
                }
                Err(e)
            }
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<ProviderSession, AuthError> {
        let request = self
            .client
            .request(Method::POST, "/auth/v1/token", Credential::Anon)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({
                "email": email,
                "password": password.expose_secret(),
            }));

        let response: TokenResponse = self.client.send_json(request).await.map_err(map_auth_error)?;
        let session = response.into_session(Utc::now());

        self.store_session(Some(session.clone())).await;
        self.events.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), AuthError> {
        let http = self
            .client
            .request(Method::POST, "/auth/v1/signup", Credential::Anon)
            .query(&[("redirect_to", request.email_redirect_to.as_str())])
            .json(&serde_json::json!({
                "email": request.email,
                "password": request.password.expose_secret(),
                "data": { "full_name": request.full_name },
            }));

        let body: serde_json::Value = self.client.send_json(http).await.map_err(map_auth_error)?;

        // Projects with email confirmation disabled answer with a full session
        if body.get("access_token").is_some() {
            let response: TokenResponse = serde_json::from_value(body)
                .map_err(|e| AuthError::Provider(FetchError::Decode(e.to_string())))?;
            let session = response.into_session(Utc::now());
            self.store_session(Some(session.clone())).await;
            self.events.emit(AuthEvent::SignedIn(session));
        }
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let request = self
            .client
            .request(Method::POST, "/auth/v1/recover", Credential::Anon)
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "email": email }));
        self.client.send_empty(request).await.map_err(map_auth_error)
    }

    async fn sign_out(&self) -> Result<(), FetchError> {
        let previous = self.session.write().await.take();
        self.client.set_session_token(None);
        self.events.emit(AuthEvent::SignedOut);

        let Some(previous) = previous else {
            return Ok(());
        };

        let request = self
            .client
            .request(Method::POST, "/auth/v1/logout", Credential::User(&previous.access_token));
        match self.client.send_empty(request).await {
            Ok(()) => Ok(()),
            // Token already gone upstream: the session is over either way
            Err(e) if e.is_invalid_session() => {
                warn!(error = %e, "Remote session already invalid at sign-out");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }
}
