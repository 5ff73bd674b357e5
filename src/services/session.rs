//! Session manager: login, registration, logout, and token lifecycle.
//!
//! ARCHITECTURE
//! ============
//! `Anonymous -(login)-> Authenticated -(logout | expiry)-> Anonymous`, and a
//! second login replaces the current session. At most one session exists per
//! manager. The current value is an [`Observable`] so views can follow it.
//!
//! Startup loads the persisted session record and validates its token; an
//! expired record is deleted and the manager starts anonymous.
//!
//! ERROR HANDLING
//! ==============
//! Login and registration persist before publishing, so a failed write or a
//! failed remote call leaves the registry, the stored record, and the
//! published session exactly as they were. Unknown accounts and wrong
//! passwords render the same message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::registry::{ConflictError, CredentialRegistry, RegisteredUser, RegistryError, Role};
use super::remote_auth::{AccountProfile, ProfileName, RemoteAuth, RemoteAuthError};
use super::token::{issue_token, is_token_valid, now_secs};
use super::validation::{ValidationError, hash_password, is_valid_email, normalize_identifier, validate_registration};
use crate::config::StorefrontConfig;
use crate::error::ErrorCode;
use crate::reactive::{Observable, Subscription};
use crate::storage::{KvStore, SESSION_KEY, StorageError, load_json, save_json};

// =============================================================================
// TYPES
// =============================================================================

/// The authenticated identity, its role, and the bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub role: Role,
    pub token: String,
}

/// Registration form fields as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterPayload {
    pub email: String,
    pub username: String,
    pub password: String,
    pub given_name: String,
    pub family_name: String,
}

/// Successful registration outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Account recorded; the caller logs in separately.
    Created,
    /// Remote mode: account created remotely, recorded locally, and signed in.
    SignedIn(Session),
}

/// Where credentials are checked and tokens come from.
#[derive(Clone, Default)]
pub enum AuthBackend {
    #[default]
    Local,
    Remote(Arc<dyn RemoteAuth>),
}

impl std::fmt::Debug for AuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Remote(_) => f.write_str("Remote"),
        }
    }
}

/// Token and role knobs, usually taken from [`StorefrontConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub token_ttl_secs: i64,
    pub token_secret: String,
    pub admin_name_fallback: bool,
}

impl From<&StorefrontConfig> for SessionSettings {
    fn from(config: &StorefrontConfig) -> Self {
        Self {
            token_ttl_secs: config.token_ttl_secs,
            token_secret: config.token_secret.clone(),
            admin_name_fallback: config.admin_name_fallback,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&StorefrontConfig::default())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Neither a valid email nor a known username.
    #[error("invalid credentials")]
    InvalidIdentifier,
    /// No registered user for the resolved email.
    #[error("invalid credentials")]
    UnknownAccount,
    /// Wrong password, or the remote endpoint refused the credentials.
    #[error("invalid credentials")]
    BadCredentials,
    #[error("not signed in")]
    NotAuthenticated,
    #[error("session expired")]
    SessionExpired,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Remote(#[from] RemoteAuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Conflict(c) => Self::Conflict(c),
            RegistryError::Storage(s) => Self::Storage(s),
        }
    }
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::MissingFields) => "E_MISSING_FIELDS",
            Self::Validation(ValidationError::InvalidEmail) => "E_INVALID_EMAIL",
            Self::Validation(ValidationError::InvalidUsername) => "E_INVALID_USERNAME",
            Self::Validation(ValidationError::WeakPassword) => "E_WEAK_PASSWORD",
            Self::Conflict(ConflictError::DuplicateEmail) => "E_DUPLICATE_EMAIL",
            Self::Conflict(ConflictError::DuplicateUsername) => "E_DUPLICATE_USERNAME",
            Self::Auth(AuthError::InvalidIdentifier) => "E_INVALID_IDENTIFIER",
            Self::Auth(AuthError::UnknownAccount) => "E_UNKNOWN_ACCOUNT",
            Self::Auth(AuthError::BadCredentials) => "E_BAD_CREDENTIALS",
            Self::Auth(AuthError::NotAuthenticated) => "E_NOT_AUTHENTICATED",
            Self::Auth(AuthError::SessionExpired) => "E_SESSION_EXPIRED",
            Self::Remote(RemoteAuthError::Rejected(_)) => "E_REMOTE_REJECTED",
            Self::Remote(RemoteAuthError::Transport(_)) => "E_REMOTE_UNAVAILABLE",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Remote(RemoteAuthError::Transport(_)) => true,
            Self::Storage(e) => e.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

pub struct SessionManager {
    store: Arc<dyn KvStore>,
    registry: CredentialRegistry,
    backend: AuthBackend,
    settings: SessionSettings,
    current: Observable<Option<Session>>,
}

impl SessionManager {
    /// Load the registry and restore any still-valid persisted session.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, settings: SessionSettings, backend: AuthBackend) -> Self {
        let registry = CredentialRegistry::load(Arc::clone(&store), settings.admin_name_fallback);
        let restored = restore_session(store.as_ref());
        Self { store, registry, backend, settings, current: Observable::new(restored) }
    }

    #[must_use]
    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    #[must_use]
    pub fn backend(&self) -> &AuthBackend {
        &self.backend
    }

    /// Authenticate with an email or username and a password.
    ///
    /// On success the new session is persisted and published, replacing any
    /// prior one.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidIdentifier`] if the identifier is neither an email
    ///   nor a registered username
    /// - [`AuthError::UnknownAccount`] if no user is registered for the email
    /// - [`AuthError::BadCredentials`] for a wrong password or remote refusal
    /// - [`SessionError::Remote`] if the remote endpoint is unreachable
    /// - [`SessionError::Storage`] if the session record cannot be written
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session, SessionError> {
        let user = self.resolve_user(identifier)?;

        let token = match &self.backend {
            AuthBackend::Local => {
                if hash_password(password) != user.password_secret {
                    warn!(username = %user.username, "login rejected: bad credentials");
                    return Err(AuthError::BadCredentials.into());
                }
                issue_token(&user.username, now_secs(), self.settings.token_ttl_secs, &self.settings.token_secret)
            }
            AuthBackend::Remote(remote) => match remote.login(&user.username, password).await {
                Ok(token) => token,
                Err(RemoteAuthError::Rejected(reason)) => {
                    warn!(username = %user.username, %reason, "login rejected by remote endpoint");
                    return Err(AuthError::BadCredentials.into());
                }
                Err(e) => {
                    warn!(username = %user.username, error = %e, "remote login failed");
                    return Err(e.into());
                }
            },
        };

        let role = self.registry.get_role(&user.username);
        let session = Session { identity: user.username, role, token };
        save_json(self.store.as_ref(), SESSION_KEY, &session)?;
        self.current.set(Some(session.clone()));
        info!(identity = %session.identity, %role, "login succeeded");
        Ok(session)
    }

    fn resolve_user(&self, identifier: &str) -> Result<RegisteredUser, AuthError> {
        let normalized = normalize_identifier(identifier);
        if normalized.is_empty() {
            return Err(AuthError::InvalidIdentifier);
        }
        let email = if is_valid_email(&normalized) {
            normalized
        } else {
            self.registry
                .find_by_username(&normalized)
                .map(|user| user.email)
                .ok_or(AuthError::InvalidIdentifier)?
        };
        self.registry
            .find_by_email(&email)
            .ok_or(AuthError::UnknownAccount)
    }

    /// Register a new account with `role`.
    ///
    /// Rules are checked in order (missing fields, email shape, username shape,
    /// password strength, duplicate email, duplicate username) and the first
    /// violation is returned. In remote mode the remote account is created
    /// first, local records are committed only after it succeeds, and the new
    /// account is then logged in. If that login fails the local records are
    /// withdrawn so the registration can be retried.
    ///
    /// # Errors
    ///
    /// [`SessionError::Validation`], [`SessionError::Conflict`],
    /// [`SessionError::Remote`], or [`SessionError::Storage`]; plus any
    /// [`Self::login`] error for the follow-up login in remote mode.
    pub async fn register(&self, payload: &RegisterPayload, role: Role) -> Result<Registration, SessionError> {
        let email = normalize_identifier(&payload.email);
        let username = payload.username.trim().to_owned();
        validate_registration(&email, &username, &payload.password)?;

        if self.registry.find_by_email(&email).is_some() {
            return Err(ConflictError::DuplicateEmail.into());
        }
        if self.registry.is_username_taken(&username) {
            return Err(ConflictError::DuplicateUsername.into());
        }

        if let AuthBackend::Remote(remote) = &self.backend {
            let profile = AccountProfile {
                email: email.clone(),
                username: username.clone(),
                password: payload.password.clone(),
                name: ProfileName {
                    firstname: payload.given_name.trim().to_owned(),
                    lastname: payload.family_name.trim().to_owned(),
                },
            };
            if let Err(e) = remote.create_account(&profile).await {
                warn!(%username, error = %e, "remote account creation failed");
                return Err(e.into());
            }
        }

        self.registry.register(RegisteredUser {
            email: email.clone(),
            username,
            password_secret: hash_password(&payload.password),
            given_name: payload.given_name.trim().to_owned(),
            family_name: payload.family_name.trim().to_owned(),
            role,
        })?;

        match self.backend {
            AuthBackend::Local => Ok(Registration::Created),
            AuthBackend::Remote(_) => match self.login(&email, &payload.password).await {
                Ok(session) => Ok(Registration::SignedIn(session)),
                Err(e) => {
                    warn!(%email, error = %e, "follow-up login failed; withdrawing local registration");
                    if let Err(undo) = self.registry.unregister(&email) {
                        error!(%email, error = %undo, "failed to withdraw local registration");
                    }
                    Err(e)
                }
            },
        }
    }

    /// Drop the current session and its persisted record. Never fails.
    pub fn logout(&self) {
        if let Err(e) = self.store.remove(SESSION_KEY) {
            error!(error = %e, "failed to remove stored session");
        }
        let previous = self.current.get();
        self.current.set(None);
        if let Some(session) = previous {
            info!(identity = %session.identity, "logged out");
        }
    }

    /// Current session if its token is still valid. An expired session is
    /// torn down as a side effect.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        let session = self.current.get()?;
        if is_token_valid(&session.token) {
            return Some(session);
        }
        warn!(identity = %session.identity, "session token expired");
        self.logout();
        None
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    #[must_use]
    pub fn current_role(&self) -> Option<Role> {
        self.current_session().map(|s| s.role)
    }

    /// Current session, or why there is none.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionExpired`] if a session existed but its token
    /// lapsed, [`AuthError::NotAuthenticated`] otherwise.
    pub fn require_session(&self) -> Result<Session, AuthError> {
        let had_session = self.current.with(Option::is_some);
        self.current_session().ok_or(if had_session {
            AuthError::SessionExpired
        } else {
            AuthError::NotAuthenticated
        })
    }

    /// Follow the current session. The callback runs immediately with the
    /// current value and after every transition.
    pub fn subscribe(&self, callback: impl Fn(&Option<Session>) + Send + Sync + 'static) -> Subscription {
        self.current.subscribe(callback)
    }
}

/// Load the persisted session, deleting it when its token is no longer valid.
fn restore_session(store: &dyn KvStore) -> Option<Session> {
    let session: Session = load_json(store, SESSION_KEY)?;
    if !session.token.is_empty() && is_token_valid(&session.token) {
        info!(identity = %session.identity, role = %session.role, "session restored");
        return Some(session);
    }
    warn!(identity = %session.identity, "stored session expired; removing");
    if let Err(e) = store.remove(SESSION_KEY) {
        error!(error = %e, "failed to remove expired session");
    }
    None
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
