// HTTP client for the hosted Supabase project (GoTrue auth + PostgREST tables)

use crate::config::Config;
use crate::core::errors::{is_invalid_session_marker, AccessError, FetchError};
use crate::core::resilience::{create_circuit_breaker, execute_with_cb, BackendCircuitBreaker};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error};

/// Which key authorizes a request
#[derive(Clone, Copy)]
pub enum Credential<'a> {
    /// Project anon key only
    Anon,
    /// Access token of the signed-in principal, falling back to the anon key
    Session,
    /// Explicit user access token
    User(&'a SecretString),
    /// Service role key (admin endpoints)
    Service(&'a SecretString),
}

/// Error body shapes returned by GoTrue and PostgREST
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        if let Some(ref code) = self.error_code {
            return Some(code.clone());
        }
        match self.code {
            Some(serde_json::Value::String(ref code)) => Some(code.clone()),
            _ => self.error.clone(),
        }
    }

    fn message(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

/// Map a non-success response to the fetch error taxonomy
pub(crate) fn classify_error(status: StatusCode, body: &str) -> FetchError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code();
    let message = parsed
        .message()
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if is_invalid_session_marker(&message, code.as_deref()) {
        return FetchError::InvalidSession(message);
    }

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return FetchError::Transient(format!("HTTP {}: {}", status.as_u16(), message));
    }

    FetchError::Upstream {
        status: status.as_u16(),
        code,
        message,
    }
}

fn send_error(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient(format!("Request timeout after {}s", timeout.as_secs()))
    } else if e.is_connect() {
        FetchError::Transient("Connection to Supabase failed".to_string())
    } else {
        FetchError::Transient(format!("Supabase request failed: {}", e))
    }
}

/// Shared Supabase client
///
/// Every call goes through one circuit breaker. The access token of the
/// signed-in principal is held here so table requests run under the
/// principal's row-level security policies.
pub struct SupabaseClient {
    client: Client,
    project_url: String,
    anon_key: SecretString,
    timeout: Duration,
    session_token: RwLock<Option<SecretString>>,
    cb: BackendCircuitBreaker,
}

impl SupabaseClient {
    pub fn new(project_url: &str, anon_key: SecretString, timeout_secs: u64) -> Result<Self, AccessError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                AccessError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            project_url: project_url.trim_end_matches('/').to_string(),
            anon_key,
            timeout,
            session_token: RwLock::new(None),
            cb: create_circuit_breaker(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AccessError> {
        Self::new(
            &config.supabase_url,
            config.supabase_anon_key.clone(),
            config.auth_request_timeout_secs,
        )
    }

    pub fn project_url(&self) -> &str {
        &self.project_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.project_url, path)
    }

    /// Token used for `Credential::Session` requests
    pub fn set_session_token(&self, token: Option<SecretString>) {
        *self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn has_session_token(&self) -> bool {
        self.session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Request with `apikey` and bearer headers for the given credential
    pub fn request(&self, method: Method, path: &str, credential: Credential<'_>) -> RequestBuilder {
        let (apikey, bearer) = match credential {
            Credential::Anon => (self.anon_key.clone(), self.anon_key.clone()),
            Credential::Session => {
                let token = self
                    .session_token
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                (self.anon_key.clone(), token.unwrap_or_else(|| self.anon_key.clone()))
            }
            Credential::User(token) => (self.anon_key.clone(), token.clone()),
            Credential::Service(key) => (key.clone(), key.clone()),
        };

        self.client
            .request(method, self.url(path))
            .header("apikey", apikey.expose_secret())
            .header("Authorization", format!("Bearer {}", bearer.expose_secret()))
    }

    /// Send and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        execute_with_cb(&self.cb, || async {
            let response = self.dispatch(request).await?;
            response.json::<T>().await.map_err(|e| {
                error!(error = %e, "Failed to decode Supabase response");
                FetchError::Decode(e.to_string())
            })
        })
        .await
    }

    /// Send and discard the body
    pub async fn send_empty(&self, request: RequestBuilder) -> Result<(), FetchError> {
        execute_with_cb(&self.cb, || async {
            self.dispatch(request).await?;
            Ok(())
        })
        .await
    }

    async fn dispatch(&self, request: RequestBuilder) -> Result<reqwest::Response, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_error(status, &body);
        debug!(status = status.as_u16(), error = %err, "Supabase returned an error");
        Err(err)
    }
}
