//! End-to-end account-security flows against the auth service and the
//! in-memory store: email verification, OTP enrollment, and the full
//! password-reset state machine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use quill::auth::email::RecordingEmailSender;
use quill::auth::errors::AuthError;
use quill::auth::service::AuthService;
use quill::auth::totp::{TotpConfig, TotpGenerator};
use quill::auth::user::{InMemoryUserStore, UserStore};
use quill::auth::RECOVERY_CODE_COUNT;
use quill::config::{AuthConfig, DEFAULT_ALPHABET};

// ==================
// Harness
// ==================

struct Harness {
    store: Arc<InMemoryUserStore>,
    mailer: Arc<RecordingEmailSender>,
    service: AuthService<InMemoryUserStore>,
}

fn auth_config(action_ttl_secs: u64) -> AuthConfig {
    AuthConfig {
        jwt_secret: "a-signing-secret-of-at-least-32-chars".to_string(),
        cipher_key: "test-cipher-key".to_string(),
        cipher_salt: "test-cipher-salt".to_string(),
        alphabet: DEFAULT_ALPHABET.to_string(),
        secret_token_length: 120,
        recovery_code_length: 10,
        session_ttl_secs: 86_400,
        action_token_ttl_secs: action_ttl_secs,
        app_name: "Quill".to_string(),
        origin: "http://localhost:3000".to_string(),
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_action_ttl(3_600)
    }

    fn with_action_ttl(action_ttl_secs: u64) -> Self {
        let store = Arc::new(InMemoryUserStore::new());
        let mailer = Arc::new(RecordingEmailSender::new());
        let service = AuthService::new(
            store.clone(),
            Some(mailer.clone()),
            auth_config(action_ttl_secs),
        );
        Self {
            store,
            mailer,
            service,
        }
    }

    fn register(&self) -> Uuid {
        self.service
            .register("Alice", "alice@example.com", "hunter2!")
            .unwrap()
            .id
    }

    /// Run the full verification flow so later flows have a verified
    /// account to work with
    async fn register_verified(&self) -> Uuid {
        let id = self.register();
        self.service.request_email_verification(id).await.unwrap();
        let (email, token) = self.last_link();
        self.service
            .validate_email_verification(&email, &token)
            .unwrap();
        id
    }

    /// Encrypted-email and token segments of the most recent mailed
    /// action link
    fn last_link(&self) -> (String, String) {
        let (_, template) = self.mailer.last().expect("an email should have been sent");
        let mut segments = template.url().rsplit('/');
        let token = segments.next().unwrap().to_string();
        let email = segments.next().unwrap().to_string();
        (email, token)
    }

    async fn enroll_otp(&self, id: Uuid) -> (TotpGenerator, Vec<String>) {
        let setup = self.service.generate_otp(id).unwrap();
        let generator =
            TotpGenerator::new(&setup.otp_base32, "alice@example.com", TotpConfig::default());
        let enrollment = self
            .service
            .verify_otp(id, &generator.generate().unwrap())
            .await
            .unwrap();
        (generator, enrollment.recovery_codes)
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// ==================
// Email Verification
// ==================

#[tokio::test]
async fn email_verification_round_trip() {
    let h = Harness::new();
    let id = h.register();

    h.service.request_email_verification(id).await.unwrap();
    let (email, token) = h.last_link();

    let profile = h
        .service
        .validate_email_verification(&email, &token)
        .unwrap();
    assert!(profile.verified);

    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert!(stored.verified);
    assert!(stored.secret_token.is_none());

    // The link is single-use: a second attempt fails
    let err = h
        .service
        .validate_email_verification(&email, &token)
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
    assert_eq!(err.to_string(), "user is already verified");
}

#[tokio::test]
async fn email_verification_rejects_foreign_token() {
    let h = Harness::new();
    let id = h.register();

    h.service.request_email_verification(id).await.unwrap();
    let (email, first_token) = h.last_link();

    // A second request replaces the stored secret; the first token's
    // embedded secret no longer matches
    h.service.request_email_verification(id).await.unwrap();
    let err = h
        .service
        .validate_email_verification(&email, &first_token)
        .unwrap_err();
    assert_eq!(err.to_string(), "could not verify email");
}

#[tokio::test]
async fn email_verification_expired_link_fails_generically() {
    let h = Harness::with_action_ttl(1);
    let id = h.register();

    h.service.request_email_verification(id).await.unwrap();
    let (email, token) = h.last_link();

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let err = h
        .service
        .validate_email_verification(&email, &token)
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
    assert_eq!(err.to_string(), "could not verify email");
}

#[tokio::test]
async fn update_email_swaps_only_after_validation() {
    let h = Harness::new();
    let id = h.register_verified().await;

    h.service.update_email(id, "new@example.com").await.unwrap();

    // Old address stays authoritative until the link is followed
    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert_eq!(stored.email, "alice@example.com");
    assert_eq!(stored.pending_email.as_deref(), Some("new@example.com"));

    let (email, token) = h.last_link();
    let profile = h
        .service
        .validate_email_verification(&email, &token)
        .unwrap();
    assert_eq!(profile.email, "new@example.com");

    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert_eq!(stored.email, "new@example.com");
    assert!(stored.pending_email.is_none());
    assert!(stored.secret_token.is_none());
}

// ==================
// Login & OTP
// ==================

#[tokio::test]
async fn login_reports_otp_enabled_after_enrollment() {
    let h = Harness::new();
    let id = h.register_verified().await;

    let before = h.service.login("alice@example.com", "hunter2!").unwrap();
    assert!(!before.otp_enabled);

    h.enroll_otp(id).await;

    let after = h.service.login("alice@example.com", "hunter2!").unwrap();
    assert!(after.otp_enabled);
}

#[tokio::test]
async fn otp_enrollment_returns_codes_once_and_rejects_stale_codes() {
    let h = Harness::new();
    let id = h.register_verified().await;

    let (generator, codes) = h.enroll_otp(id).await;
    assert_eq!(codes.len(), RECOVERY_CODE_COUNT);

    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert!(stored.otp_enabled);
    assert!(stored.otp_verified);

    // A code from two steps back is outside the ±1 validation window
    let stale = generator.generate_at(now_unix() - 90).unwrap();
    let err = h.service.validate_otp(id, &stale).unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    // The current code validates
    let current = generator.generate().unwrap();
    h.service.validate_otp(id, &current).unwrap();
}

#[tokio::test]
async fn reenrollment_replaces_recovery_codes() {
    let h = Harness::new();
    let id = h.register_verified().await;

    let (_, first_codes) = h.enroll_otp(id).await;
    let (_, second_codes) = h.enroll_otp(id).await;

    // Old plaintext codes no longer match the stored set
    let err = h
        .service
        .validate_recovery_code(id, &first_codes[0])
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    h.service
        .validate_recovery_code(id, &second_codes[0])
        .unwrap();
}

#[tokio::test]
async fn recovery_codes_burn_exactly_once() {
    let h = Harness::new();
    let id = h.register_verified().await;
    let (_, codes) = h.enroll_otp(id).await;

    for code in &codes {
        h.service.validate_recovery_code(id, code).unwrap();
    }
    for code in &codes {
        let err = h.service.validate_recovery_code(id, code).unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));
    }
}

// ==================
// Password Reset
// ==================

#[tokio::test]
async fn password_reset_full_cycle() {
    let h = Harness::new();
    let id = h.register_verified().await;

    h.service
        .request_password_reset("alice@example.com")
        .await
        .unwrap();
    let (email, token) = h.last_link();

    let password_token = h.service.validate_password_reset(&email, &token).unwrap();
    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert!(stored.password_reset_request);
    assert!(stored.grant_password_reset);

    // New password must differ from the current one
    let same = h
        .service
        .reset_password("alice@example.com", &password_token, "hunter2!")
        .unwrap_err();
    assert_eq!(same.to_string(), "invalid password, try a different password");

    h.service
        .reset_password("alice@example.com", &password_token, "correct-horse-battery")
        .unwrap();

    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert!(!stored.password_reset_request);
    assert!(!stored.grant_password_reset);
    assert!(stored.secret_token.is_none());

    // Old password is dead, new one works
    assert!(h.service.login("alice@example.com", "hunter2!").is_err());
    h.service
        .login("alice@example.com", "correct-horse-battery")
        .unwrap();

    // The consumed reset credential is no longer honored
    let reuse = h
        .service
        .reset_password("alice@example.com", &password_token, "yet-another-password")
        .unwrap_err();
    assert!(matches!(reuse, AuthError::BadRequest(_)));
    assert_eq!(reuse.to_string(), "could not reset password");
}

#[tokio::test]
async fn password_reset_requires_verified_account() {
    let h = Harness::new();
    h.register();

    let err = h
        .service
        .request_password_reset("alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Forbidden(_)));
}

#[tokio::test]
async fn password_reset_validate_without_request_fails() {
    let h = Harness::new();
    let id = h.register_verified().await;

    // Mint a verification link instead, then try to use it on the
    // reset path: the reset-request flag was never set
    h.store
        .update(
            id,
            quill::auth::user::UserPatch {
                verified: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    h.service.request_email_verification(id).await.unwrap();
    let (email, token) = h.last_link();

    let err = h.service.validate_password_reset(&email, &token).unwrap_err();
    assert_eq!(err.to_string(), "no request to reset password");
}

#[tokio::test]
async fn cancel_password_reset_clears_state() {
    let h = Harness::new();
    let id = h.register_verified().await;

    h.service
        .request_password_reset("alice@example.com")
        .await
        .unwrap();
    let (email, token) = h.last_link();
    let password_token = h.service.validate_password_reset(&email, &token).unwrap();

    h.service
        .cancel_password_reset("alice@example.com", &password_token)
        .unwrap();

    let stored = h.store.find_by_id(id).unwrap().unwrap();
    assert!(!stored.password_reset_request);
    assert!(!stored.grant_password_reset);
    assert!(stored.secret_token.is_none());

    // Password unchanged
    h.service.login("alice@example.com", "hunter2!").unwrap();

    // The credential died with the cancellation
    let err = h
        .service
        .reset_password("alice@example.com", &password_token, "new-password")
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
}

// ==================
// Single-Write Transitions
// ==================

/// Store wrapper that counts `update` calls, so each workflow can be
/// checked to commit its state transition as one document write.
struct CountingStore {
    inner: InMemoryUserStore,
    updates: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryUserStore::new(),
            updates: AtomicUsize::new(0),
        }
    }

    fn take_updates(&self) -> usize {
        self.updates.swap(0, Ordering::SeqCst)
    }
}

impl UserStore for CountingStore {
    fn find_by_id(&self, id: Uuid) -> Result<Option<quill::auth::user::User>, AuthError> {
        self.inner.find_by_id(id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<quill::auth::user::User>, AuthError> {
        self.inner.find_by_email(email)
    }

    fn find_by_pending_email(
        &self,
        email: &str,
    ) -> Result<Option<quill::auth::user::User>, AuthError> {
        self.inner.find_by_pending_email(email)
    }

    fn create(&self, user: &quill::auth::user::User) -> Result<(), AuthError> {
        self.inner.create(user)
    }

    fn update(
        &self,
        id: Uuid,
        patch: quill::auth::user::UserPatch,
    ) -> Result<quill::auth::user::User, AuthError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, patch)
    }
}

#[tokio::test]
async fn action_link_flows_commit_in_one_write() {
    let store = Arc::new(CountingStore::new());
    let mailer = Arc::new(RecordingEmailSender::new());
    let service: AuthService<CountingStore> =
        AuthService::new(store.clone(), Some(mailer.clone()), auth_config(3_600));

    let id = service
        .register("Alice", "alice@example.com", "hunter2!")
        .unwrap()
        .id;
    store.take_updates();

    // Minting the secret and staging the flags land together
    service.request_email_verification(id).await.unwrap();
    assert_eq!(store.take_updates(), 1);

    let (sent_to, template) = mailer.last().unwrap();
    assert_eq!(sent_to, "alice@example.com");
    let url = template.url().to_string();
    let mut parts = url.rsplit('/');
    let token = parts.next().unwrap().to_string();
    let email = parts.next().unwrap().to_string();
    service.validate_email_verification(&email, &token).unwrap();
    store.take_updates();

    service
        .request_password_reset("alice@example.com")
        .await
        .unwrap();
    assert_eq!(store.take_updates(), 1);
    let stored = store.find_by_id(id).unwrap().unwrap();
    assert!(stored.password_reset_request);
    assert!(stored.secret_token.is_some());

    service
        .update_email(id, "alice@new.example.com")
        .await
        .unwrap();
    assert_eq!(store.take_updates(), 1);
    let stored = store.find_by_id(id).unwrap().unwrap();
    assert_eq!(stored.pending_email.as_deref(), Some("alice@new.example.com"));
    assert!(stored.secret_token.is_some());
}
