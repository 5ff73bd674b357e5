use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::*;
use crate::storage::MemoryStore;

// =========================================================================
// Fixtures
// =========================================================================

#[derive(Default)]
struct MockRemote {
    login_result: Mutex<Option<Result<String, RemoteAuthError>>>,
    create_result: Mutex<Option<Result<(), RemoteAuthError>>>,
    logins: Mutex<Vec<String>>,
    created: Mutex<Vec<AccountProfile>>,
}

impl MockRemote {
    fn accepting(token: &str) -> Self {
        let mock = Self::default();
        *mock.login_result.lock().unwrap() = Some(Ok(token.into()));
        mock
    }

    fn fail_login(&self, err: RemoteAuthError) {
        *self.login_result.lock().unwrap() = Some(Err(err));
    }

    fn fail_create(&self, err: RemoteAuthError) {
        *self.create_result.lock().unwrap() = Some(Err(err));
    }
}

#[async_trait::async_trait]
impl RemoteAuth for MockRemote {
    async fn login(&self, username: &str, _password: &str) -> Result<String, RemoteAuthError> {
        self.logins.lock().unwrap().push(username.to_owned());
        self.login_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok("remote-token".into()))
    }

    async fn create_account(&self, profile: &AccountProfile) -> Result<(), RemoteAuthError> {
        self.created.lock().unwrap().push(profile.clone());
        self.create_result.lock().unwrap().clone().unwrap_or(Ok(()))
    }
}

/// Memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl KvStore for FlakyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io { key: key.into(), source: std::io::Error::other("disk full") });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

fn payload(email: &str, username: &str) -> RegisterPayload {
    RegisterPayload {
        email: email.into(),
        username: username.into(),
        password: "password1".into(),
        given_name: "Ada".into(),
        family_name: "Lovelace".into(),
    }
}

fn local_manager(store: Arc<dyn KvStore>) -> SessionManager {
    SessionManager::new(store, SessionSettings::default(), AuthBackend::Local)
}

fn remote_manager(store: Arc<dyn KvStore>, remote: Arc<MockRemote>) -> SessionManager {
    SessionManager::new(store, SessionSettings::default(), AuthBackend::Remote(remote))
}

async fn registered_local() -> (Arc<MemoryStore>, SessionManager) {
    let store = Arc::new(MemoryStore::new());
    let manager = local_manager(store.clone());
    manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();
    (store, manager)
}

// =========================================================================
// register
// =========================================================================

#[tokio::test]
async fn local_register_creates_account_without_signing_in() {
    let (_store, manager) = registered_local().await;
    assert!(!manager.is_authenticated());
    let user = manager.registry().find_by_email("ada@example.com").unwrap();
    assert_eq!(user.password_secret, hash_password("password1"));
    assert_eq!(user.given_name, "Ada");
}

#[tokio::test]
async fn register_returns_first_validation_failure() {
    let store = Arc::new(MemoryStore::new());
    let manager = local_manager(store.clone());

    let mut p = payload("not-an-email", "a!");
    p.password = "short".into();
    let err = manager.register(&p, Role::User).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(ValidationError::InvalidEmail)));

    let err = manager
        .register(&payload("", "ada"), Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(ValidationError::MissingFields)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn register_rejects_duplicates() {
    let (_store, manager) = registered_local().await;

    let err = manager
        .register(&payload("ADA@example.com", "someone"), Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Conflict(ConflictError::DuplicateEmail)));
    assert_eq!(err.error_code(), "E_DUPLICATE_EMAIL");

    let err = manager
        .register(&payload("other@example.com", "ada"), Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Conflict(ConflictError::DuplicateUsername)));
    assert_eq!(manager.registry().len(), 1);
}

#[tokio::test]
async fn register_records_requested_role() {
    let store = Arc::new(MemoryStore::new());
    let manager = local_manager(store);
    manager
        .register(&payload("boss@example.com", "boss"), Role::Admin)
        .await
        .unwrap();
    let session = manager.login("boss", "password1").await.unwrap();
    assert_eq!(session.role, Role::Admin);
}

#[tokio::test]
async fn remote_register_creates_remotely_then_signs_in() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemote::accepting("remote-token"));
    let manager = remote_manager(store.clone(), remote.clone());

    let outcome = manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();

    let Registration::SignedIn(session) = outcome else {
        panic!("expected remote registration to sign in");
    };
    assert_eq!(session.identity, "ada");
    assert_eq!(session.token, "remote-token");
    assert_eq!(remote.created.lock().unwrap()[0].name.firstname, "Ada");
    assert_eq!(*remote.logins.lock().unwrap(), vec!["ada".to_owned()]);
    assert!(store.get(SESSION_KEY).is_some());
}

#[tokio::test]
async fn remote_register_failure_leaves_registry_untouched() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemote::default());
    remote.fail_create(RemoteAuthError::Transport("connection refused".into()));
    let manager = remote_manager(store.clone(), remote);

    let err = manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Remote(RemoteAuthError::Transport(_))));
    assert!(err.retryable());
    assert!(manager.registry().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn remote_register_withdraws_registration_when_login_fails() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemote::default());
    remote.fail_login(RemoteAuthError::Transport("timeout".into()));
    let manager = remote_manager(store.clone(), remote.clone());

    let err = manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Remote(RemoteAuthError::Transport(_))));
    assert!(manager.registry().is_empty());
    assert!(!manager.is_authenticated());
    assert!(store.get(SESSION_KEY).is_none());

    *remote.login_result.lock().unwrap() = Some(Ok("remote-token".into()));
    let retry = manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();
    assert!(matches!(retry, Registration::SignedIn(_)));
    assert_eq!(manager.registry().len(), 1);
}

// =========================================================================
// login
// =========================================================================

#[tokio::test]
async fn login_by_email_and_by_username() {
    let (store, manager) = registered_local().await;

    let by_email = manager.login("  ADA@Example.com ", "password1").await.unwrap();
    assert_eq!(by_email.identity, "ada");
    assert_eq!(by_email.role, Role::User);
    assert!(is_token_valid(&by_email.token));

    let by_username = manager.login("Ada", "password1").await.unwrap();
    assert_eq!(by_username.identity, "ada");

    let stored: Session = load_json(&*store, SESSION_KEY).unwrap();
    assert_eq!(stored, by_username);
    assert_eq!(manager.current_session(), Some(by_username));
}

#[tokio::test]
async fn login_with_wrong_password_changes_nothing() {
    let (store, manager) = registered_local().await;
    let err = manager.login("ada", "wrong-pass1").await.unwrap_err();
    assert!(matches!(err, SessionError::Auth(AuthError::BadCredentials)));
    assert!(!manager.is_authenticated());
    assert!(store.get(SESSION_KEY).is_none());
}

#[tokio::test]
async fn login_distinguishes_identifier_failures_but_not_their_message() {
    let (_store, manager) = registered_local().await;

    let unknown_name = manager.login("nobody", "password1").await.unwrap_err();
    assert!(matches!(unknown_name, SessionError::Auth(AuthError::InvalidIdentifier)));

    let unknown_email = manager.login("nobody@example.com", "password1").await.unwrap_err();
    assert!(matches!(unknown_email, SessionError::Auth(AuthError::UnknownAccount)));

    let bad_password = manager.login("ada", "nope").await.unwrap_err();
    assert_eq!(unknown_email.to_string(), bad_password.to_string());
    assert_eq!(unknown_name.to_string(), bad_password.to_string());

    let empty = manager.login("   ", "password1").await.unwrap_err();
    assert!(matches!(empty, SessionError::Auth(AuthError::InvalidIdentifier)));
}

#[tokio::test]
async fn second_login_replaces_session() {
    let (_store, manager) = registered_local().await;
    manager
        .register(&payload("bob@example.com", "bob"), Role::User)
        .await
        .unwrap();

    manager.login("ada", "password1").await.unwrap();
    manager.login("bob", "password1").await.unwrap();
    assert_eq!(manager.current_session().unwrap().identity, "bob");
}

#[tokio::test]
async fn login_role_follows_later_assignment() {
    let (_store, manager) = registered_local().await;
    manager.registry().set_role("ada", Role::Admin).unwrap();
    let session = manager.login("ada", "password1").await.unwrap();
    assert_eq!(session.role, Role::Admin);
    assert_eq!(manager.current_role(), Some(Role::Admin));
}

#[tokio::test]
async fn login_role_follows_assignment_made_with_other_case() {
    let (_store, manager) = registered_local().await;
    manager.registry().set_role("ADA", Role::Admin).unwrap();
    let session = manager.login("ada", "password1").await.unwrap();
    assert_eq!(session.role, Role::Admin);
}

#[tokio::test]
async fn login_storage_failure_publishes_nothing() {
    let store = Arc::new(FlakyStore::default());
    let manager = local_manager(store.clone());
    manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = manager.login("ada", "password1").await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(_)));
    assert!(err.retryable());
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn remote_login_uses_remote_token() {
    let store = Arc::new(MemoryStore::new());
    let local = local_manager(store.clone());
    local
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();

    let remote = Arc::new(MockRemote::accepting("opaque"));
    let manager = remote_manager(store, remote.clone());
    let session = manager.login("ada@example.com", "anything").await.unwrap();
    assert_eq!(session.token, "opaque");
    assert!(manager.is_authenticated());
    assert_eq!(*remote.logins.lock().unwrap(), vec!["ada".to_owned()]);
}

#[tokio::test]
async fn remote_rejection_maps_to_bad_credentials() {
    let store = Arc::new(MemoryStore::new());
    local_manager(store.clone())
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();

    let remote = Arc::new(MockRemote::default());
    remote.fail_login(RemoteAuthError::Rejected("status 401".into()));
    let manager = remote_manager(store.clone(), remote);
    let err = manager.login("ada", "password1").await.unwrap_err();
    assert!(matches!(err, SessionError::Auth(AuthError::BadCredentials)));
    assert!(store.get(SESSION_KEY).is_none());
}

#[tokio::test]
async fn remote_transport_failure_is_surfaced() {
    let store = Arc::new(MemoryStore::new());
    local_manager(store.clone())
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();

    let remote = Arc::new(MockRemote::default());
    remote.fail_login(RemoteAuthError::Transport("timeout".into()));
    let manager = remote_manager(store, remote);
    let err = manager.login("ada", "password1").await.unwrap_err();
    assert_eq!(err.error_code(), "E_REMOTE_UNAVAILABLE");
    assert!(!manager.is_authenticated());
}

// =========================================================================
// logout / expiry / restore
// =========================================================================

#[tokio::test]
async fn logout_clears_record_and_is_idempotent() {
    let (store, manager) = registered_local().await;
    manager.login("ada", "password1").await.unwrap();
    manager.logout();
    assert!(!manager.is_authenticated());
    assert_eq!(manager.current_role(), None);
    assert!(store.get(SESSION_KEY).is_none());
    manager.logout();
    assert!(!manager.is_authenticated());
}

#[tokio::test]
async fn session_restores_after_restart() {
    let (store, manager) = registered_local().await;
    let session = manager.login("ada", "password1").await.unwrap();
    drop(manager);

    let reopened = local_manager(store);
    assert_eq!(reopened.current_session(), Some(session));
}

#[test]
fn expired_session_is_removed_at_startup() {
    let store = Arc::new(MemoryStore::new());
    let token = issue_token("ada", 1_000, 10, "secret");
    let stale = Session { identity: "ada".into(), role: Role::User, token };
    save_json(&*store, SESSION_KEY, &stale).unwrap();

    let manager = local_manager(store.clone());
    assert!(!manager.is_authenticated());
    assert!(store.get(SESSION_KEY).is_none());
}

#[test]
fn opaque_tokens_restore_as_valid() {
    let store = Arc::new(MemoryStore::new());
    let session = Session { identity: "ada".into(), role: Role::Admin, token: "not-a-jwt".into() };
    save_json(&*store, SESSION_KEY, &session).unwrap();

    let manager = local_manager(store);
    assert_eq!(manager.current_role(), Some(Role::Admin));
}

#[test]
fn corrupt_or_empty_session_records_start_anonymous() {
    let store = Arc::new(MemoryStore::new());
    store.set(SESSION_KEY, "not json").unwrap();
    assert!(!local_manager(store.clone()).is_authenticated());

    let empty = Session { identity: "ada".into(), role: Role::User, token: String::new() };
    save_json(&*store, SESSION_KEY, &empty).unwrap();
    assert!(!local_manager(store.clone()).is_authenticated());
    assert!(store.get(SESSION_KEY).is_none());
}

#[tokio::test]
async fn zero_ttl_session_expires_on_next_check() {
    let store = Arc::new(MemoryStore::new());
    let settings = SessionSettings { token_ttl_secs: 0, ..SessionSettings::default() };
    let manager = SessionManager::new(store.clone(), settings, AuthBackend::Local);
    manager
        .register(&payload("ada@example.com", "ada"), Role::User)
        .await
        .unwrap();
    manager.login("ada", "password1").await.unwrap();

    assert_eq!(manager.require_session(), Err(AuthError::SessionExpired));
    assert!(store.get(SESSION_KEY).is_none());
    assert_eq!(manager.require_session(), Err(AuthError::NotAuthenticated));
}

// =========================================================================
// subscribe
// =========================================================================

#[tokio::test]
async fn subscribers_see_every_transition() {
    let (_store, manager) = registered_local().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = manager.subscribe(move |s| {
        sink.lock().unwrap().push(s.as_ref().map(|s| s.identity.clone()));
    });

    manager.login("ada", "password1").await.unwrap();
    manager.logout();

    assert_eq!(*seen.lock().unwrap(), vec![None, Some("ada".to_owned()), None]);
}

#[test]
fn auth_backend_debug_hides_client() {
    let remote: Arc<dyn RemoteAuth> = Arc::new(MockRemote::default());
    assert_eq!(format!("{:?}", AuthBackend::Remote(remote)), "Remote");
    assert_eq!(format!("{:?}", AuthBackend::Local), "Local");
}
