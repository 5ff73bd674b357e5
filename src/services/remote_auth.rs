//! Remote authentication endpoint adapter.
//!
//! SYSTEM CONTEXT
//! ==============
//! In remote mode the session manager delegates credential checks and account
//! creation here. The core only relies on "token or rejection" and
//! "created or rejection"; the HTTP shape below targets the fakestore API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HttpTimeouts;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteAuthError {
    /// The endpoint answered and refused the request.
    #[error("remote auth rejected request: {0}")]
    Rejected(String),
    /// The endpoint could not be reached or answered unintelligibly.
    #[error("remote auth unavailable: {0}")]
    Transport(String),
}

/// Profile sent when creating a remote account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountProfile {
    pub email: String,
    pub username: String,
    pub password: String,
    pub name: ProfileName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileName {
    pub firstname: String,
    pub lastname: String,
}

/// Remote credential authority.
#[async_trait::async_trait]
pub trait RemoteAuth: Send + Sync {
    /// Exchange credentials for a bearer token.
    async fn login(&self, username: &str, password: &str) -> Result<String, RemoteAuthError>;

    /// Create an account. Succeeds only when the endpoint accepted it.
    async fn create_account(&self, profile: &AccountProfile) -> Result<(), RemoteAuthError>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// [`RemoteAuth`] over HTTP: `POST {base}/auth/login` and `POST {base}/users`.
pub struct HttpRemoteAuth {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemoteAuth {
    /// # Errors
    ///
    /// Returns [`RemoteAuthError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, RemoteAuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| RemoteAuthError::Transport(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Map a non-success HTTP status to the matching failure kind.
/// Client errors are refusals; anything else means the endpoint is unhealthy.
pub(crate) fn classify_status(status: u16, body: &str) -> RemoteAuthError {
    let detail = if body.trim().is_empty() { format!("status {status}") } else { format!("status {status}: {}", body.trim()) };
    if (400..500).contains(&status) {
        RemoteAuthError::Rejected(detail)
    } else {
        RemoteAuthError::Transport(detail)
    }
}

#[async_trait::async_trait]
impl RemoteAuth for HttpRemoteAuth {
    async fn login(&self, username: &str, password: &str) -> Result<String, RemoteAuthError> {
        let url = self.endpoint("auth/login");
        debug!(%url, %username, "remote login");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| RemoteAuthError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RemoteAuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }
        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|_| RemoteAuthError::Transport(format!("unexpected login response: {body}")))?;
        Ok(parsed.token)
    }

    async fn create_account(&self, profile: &AccountProfile) -> Result<(), RemoteAuthError> {
        let url = self.endpoint("users");
        debug!(%url, username = %profile.username, "remote account creation");
        let resp = self
            .http
            .post(&url)
            .json(profile)
            .send()
            .await
            .map_err(|e| RemoteAuthError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &body))
    }
}

#[cfg(test)]
#[path = "remote_auth_test.rs"]
mod tests;
