//! Credential registry: registered users and their role assignments.
//!
//! DESIGN
//! ======
//! Users are kept in one canonical index keyed by normalized email plus a
//! secondary username index, both rebuilt from the persisted record at load
//! and updated together on every write. Stored records whose key differs from
//! the user's email are still found (the index is keyed by the email field)
//! and are re-keyed on the next write.
//!
//! Role assignments live in a separate username -> role record. For registered
//! users the assignment is keyed by the username as registered, whatever case
//! the caller used. `set_role` writes both the assignment and the user's own
//! `role` field so the two never diverge through this API.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::validation::normalize_identifier;
use crate::storage::{KvStore, REGISTERED_USERS_KEY, ROLES_KEY, StorageError, load_json, save_json};

/// Advisory role. Enforcement belongs to the presentation boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// A registered account as persisted under `registered_users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub email: String,
    pub username: String,
    /// Hex SHA-256 of the password.
    pub password_secret: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("username is already taken")]
    DuplicateUsername,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Clone)]
struct RegistryState {
    /// Normalized email -> user.
    by_email: BTreeMap<String, RegisteredUser>,
    /// Lower-cased username -> normalized email.
    by_username: HashMap<String, String>,
    /// Username -> explicitly assigned role.
    roles: BTreeMap<String, Role>,
}

impl RegistryState {
    fn load(store: &dyn KvStore) -> Self {
        let stored: BTreeMap<String, RegisteredUser> = load_json(store, REGISTERED_USERS_KEY).unwrap_or_default();
        let roles: BTreeMap<String, Role> = load_json(store, ROLES_KEY).unwrap_or_default();

        let mut state = Self { roles, ..Self::default() };
        for (key, user) in stored {
            let email = normalize_identifier(&user.email);
            if key != email {
                debug!(%key, %email, "registered user stored under non-email key");
            }
            if state.by_email.contains_key(&email) {
                warn!(%email, "duplicate stored registration ignored");
                continue;
            }
            state.insert(email, user);
        }
        state
    }

    fn insert(&mut self, email: String, user: RegisteredUser) {
        self.by_username.insert(user.username.to_lowercase(), email.clone());
        self.by_email.insert(email, user);
    }

    fn email_for_username(&self, username: &str) -> Option<&String> {
        self.by_username.get(&username.trim().to_lowercase())
    }

    /// Key under which `username`'s role assignment is stored: the registered
    /// spelling when the name belongs to a user, the trimmed input otherwise.
    fn role_key(&self, username: &str) -> String {
        self.email_for_username(username)
            .and_then(|email| self.by_email.get(email))
            .map_or_else(|| username.trim().to_owned(), |user| user.username.clone())
    }
}

/// Durable set of registered users and role assignments.
pub struct CredentialRegistry {
    store: Arc<dyn KvStore>,
    admin_name_fallback: bool,
    state: Mutex<RegistryState>,
}

impl CredentialRegistry {
    /// Load the registry from `store`. Corrupt records load as empty.
    ///
    /// With `admin_name_fallback`, usernames with no assignment that contain
    /// "admin" (any case) resolve to [`Role::Admin`].
    #[must_use]
    pub fn load(store: Arc<dyn KvStore>, admin_name_fallback: bool) -> Self {
        let state = RegistryState::load(store.as_ref());
        debug!(users = state.by_email.len(), roles = state.roles.len(), "credential registry loaded");
        Self { store, admin_name_fallback, state: Mutex::new(state) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a user by email (normalized before matching).
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<RegisteredUser> {
        self.lock().by_email.get(&normalize_identifier(email)).cloned()
    }

    /// Look up a user by username, ignoring case.
    #[must_use]
    pub fn find_by_username(&self, username: &str) -> Option<RegisteredUser> {
        let state = self.lock();
        let email = state.email_for_username(username)?;
        state.by_email.get(email).cloned()
    }

    #[must_use]
    pub fn is_username_taken(&self, username: &str) -> bool {
        self.lock().email_for_username(username).is_some()
    }

    /// Number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().by_email.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all users ordered by email.
    #[must_use]
    pub fn users(&self) -> Vec<RegisteredUser> {
        self.lock().by_email.values().cloned().collect()
    }

    /// Add `user` and record its role assignment.
    ///
    /// Nothing is written when a conflict is detected. If the role record
    /// fails to persist, the users record is restored before returning.
    ///
    /// # Errors
    ///
    /// [`ConflictError::DuplicateEmail`] / [`ConflictError::DuplicateUsername`]
    /// for taken identities, or [`StorageError`] if persisting fails.
    pub fn register(&self, mut user: RegisteredUser) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let email = normalize_identifier(&user.email);
        user.email.clone_from(&email);

        if state.by_email.contains_key(&email) {
            return Err(ConflictError::DuplicateEmail.into());
        }
        if state.email_for_username(&user.username).is_some() {
            return Err(ConflictError::DuplicateUsername.into());
        }

        let mut next = state.clone();
        next.roles.insert(user.username.clone(), user.role);
        let (username, role) = (user.username.clone(), user.role);
        next.insert(email.clone(), user);

        save_json(self.store.as_ref(), REGISTERED_USERS_KEY, &next.by_email)?;
        if let Err(e) = save_json(self.store.as_ref(), ROLES_KEY, &next.roles) {
            if let Err(restore) = save_json(self.store.as_ref(), REGISTERED_USERS_KEY, &state.by_email) {
                warn!(error = %restore, "failed to restore registered users after role write failure");
            }
            return Err(e.into());
        }

        *state = next;
        info!(%email, %username, %role, "user registered");
        Ok(())
    }

    /// Assign `role` to `username`, updating the user's record too when one
    /// exists. Last writer wins.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if persisting fails; in-memory state is then
    /// left unchanged.
    pub fn set_role(&self, username: &str, role: Role) -> Result<(), StorageError> {
        let mut state = self.lock();
        let mut next = state.clone();

        let email = next.email_for_username(username).cloned();
        let key = next.role_key(username);
        if let Some(user) = email.as_ref().and_then(|e| next.by_email.get_mut(e)) {
            user.role = role;
            // Registered names are case-insensitive; stale spellings would shadow this write.
            let lowered = key.to_lowercase();
            next.roles.retain(|name, _| name.to_lowercase() != lowered);
        }
        next.roles.insert(key, role);

        save_json(self.store.as_ref(), ROLES_KEY, &next.roles)?;
        if email.is_some() {
            save_json(self.store.as_ref(), REGISTERED_USERS_KEY, &next.by_email)?;
        }
        *state = next;
        info!(%username, %role, "role assigned");
        Ok(())
    }

    /// Resolve the role for `username`.
    ///
    /// Order: explicit assignment, the registered user's own role, then the
    /// optional "admin" substring fallback, then [`Role::User`].
    #[must_use]
    pub fn get_role(&self, username: &str) -> Role {
        let state = self.lock();
        if let Some(role) = state.roles.get(&state.role_key(username)) {
            return *role;
        }
        if let Some(user) = state
            .email_for_username(username)
            .and_then(|email| state.by_email.get(email))
        {
            return user.role;
        }
        if self.admin_name_fallback && username.to_lowercase().contains("admin") {
            return Role::Admin;
        }
        Role::User
    }

    /// Remove the user registered under `email` along with its role
    /// assignment. Used to undo a registration whose follow-up step failed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if persisting fails; in-memory state is then
    /// left unchanged.
    pub(crate) fn unregister(&self, email: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        let email = normalize_identifier(email);
        let mut next = state.clone();
        let Some(user) = next.by_email.remove(&email) else {
            return Ok(());
        };
        next.by_username.remove(&user.username.to_lowercase());
        let had_role = next.roles.remove(&user.username).is_some();

        save_json(self.store.as_ref(), REGISTERED_USERS_KEY, &next.by_email)?;
        if had_role {
            if let Err(e) = save_json(self.store.as_ref(), ROLES_KEY, &next.roles) {
                if let Err(restore) = save_json(self.store.as_ref(), REGISTERED_USERS_KEY, &state.by_email) {
                    warn!(error = %restore, "failed to restore registered users after role write failure");
                }
                return Err(e);
            }
        }
        *state = next;
        info!(%email, username = %user.username, "registration withdrawn");
        Ok(())
    }

    /// Re-read both records from the store, discarding in-memory state.
    pub fn reload(&self) {
        *self.lock() = RegistryState::load(self.store.as_ref());
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
