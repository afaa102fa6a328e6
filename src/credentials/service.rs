//! Account operations: registration, login, password change and reset, and
//! admin user management.
//!
//! Flow Overview (login):
//! 1) Validate the payload and load the credential by normalised email.
//! 2) Refuse while a lock is in force, without touching the counter.
//! 3) On a wrong password, compare-and-set the next lockout state; on a
//!    conflict reload the credential and decide again.
//! 4) On success clear any failures, record the login and issue a session.

use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    lockout::{LockoutPolicy, LockoutState},
    mailer::{Mailer, reset_url},
    models::{Credential, CredentialField, CredentialView, ResetToken, Role},
    password,
};
use crate::{
    error::{Error, FieldError, Result},
    query::{ListQuery, Page},
    session::{Identity, Session, SessionKeys},
    store::{Store, StoreError},
    submissions::intake::{normalize_email, valid_email},
};

pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;
const MAX_NAME_LEN: usize = 50;
/// Compare-and-set attempts before a contended login gives up.
const LOCKOUT_RETRIES: usize = 8;

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct RegisterInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// `admin` or `editor` (default).
    pub role: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct PasswordUpdate {
    pub current_password: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct PasswordReset {
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ForgotPassword {
    pub email: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ActiveUpdate {
    pub active: Option<bool>,
}

fn hashing_failed(err: &anyhow::Error) -> Error {
    error!("Password hashing failed: {err:#}");
    Error::field("password", "Password could not be processed")
}

/// Policy and confirmation checks for a new password.
fn check_new_password(
    password: Option<&str>,
    confirm: Option<&str>,
    errors: &mut Vec<FieldError>,
) {
    let password = password.unwrap_or_default();
    if !password::meets_policy(password) {
        errors.push(FieldError::new("password", password::POLICY_MESSAGE));
    } else if confirm.is_some_and(|confirm| confirm != password) {
        errors.push(FieldError::new("password_confirm", "Passwords do not match"));
    }
}

fn hash_reset_token(token: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(token.as_bytes()))
}

/// Random URL-safe reset token; only its hash is stored.
fn generate_reset_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

fn issue(keys: &SessionKeys, credential: &Credential, now: DateTime<Utc>) -> Result<Session> {
    let issued = keys.issue(credential.id, credential.role, now).map_err(|err| {
        error!("Failed to sign session token: {err}");
        Error::Authentication("could not issue session token")
    })?;
    Ok(Session::new(issued, credential.view()))
}

impl Credential {
    /// Validate registration input and build a new credential with a hashed
    /// password.
    ///
    /// # Errors
    /// `Validation` listing every invalid field.
    pub fn register(input: RegisterInput, now: DateTime<Utc>) -> Result<Self> {
        let mut errors = Vec::new();

        let name = input.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        } else if name.chars().count() > MAX_NAME_LEN {
            errors.push(FieldError::new(
                "name",
                "Name cannot be more than 50 characters",
            ));
        }

        let email = input
            .email
            .as_deref()
            .map(normalize_email)
            .unwrap_or_default();
        if !valid_email(&email) {
            errors.push(FieldError::new("email", "Please include a valid email"));
        }

        check_new_password(input.password.as_deref(), None, &mut errors);

        let role = match input.role.as_deref().map(str::trim) {
            None | Some("") => Some(Role::default()),
            Some(raw) => Role::parse(raw),
        };
        if role.is_none() {
            errors.push(FieldError::new("role", "Role must be either admin or editor"));
        }

        let (Some(role), true) = (role, errors.is_empty()) else {
            return Err(Error::Validation(errors));
        };

        let password_hash = password::hash(input.password.as_deref().unwrap_or_default())
            .map_err(|err| hashing_failed(&err))?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            password_hash,
            role,
            active: true,
            lockout: LockoutState::default(),
            last_login: None,
            password_changed_at: None,
            reset_token: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Create a credential.
///
/// # Errors
/// `Validation` for bad input or an email that is already registered.
pub async fn register(store: &Store, input: RegisterInput, now: DateTime<Utc>) -> Result<CredentialView> {
    let credential = Credential::register(input, now)?;
    match store.insert_credential(&credential).await {
        Ok(()) => {
            info!(user_id = %credential.id, role = %credential.role, "Registered user");
            Ok(credential.view())
        }
        Err(StoreError::Duplicate(_)) => Err(Error::field("email", "Email already registered")),
        Err(err) => Err(err.into()),
    }
}

async fn reload(store: &Store, id: Uuid) -> Result<Credential> {
    store
        .find_credential(id)
        .await?
        .ok_or(Error::InvalidCredentials)
}

/// Check email and password and open a session.
///
/// # Errors
/// `Validation` for a malformed payload, `InvalidCredentials` for a wrong
/// pair or an inactive account, `AccountLocked` while locked.
pub async fn login(
    store: &Store,
    keys: &SessionKeys,
    policy: &LockoutPolicy,
    input: LoginInput,
    now: DateTime<Utc>,
) -> Result<Session> {
    let email = input
        .email
        .as_deref()
        .map(normalize_email)
        .unwrap_or_default();
    let supplied = input.password.unwrap_or_default();

    let mut errors = Vec::new();
    if !valid_email(&email) {
        errors.push(FieldError::new("email", "Please include a valid email"));
    }
    if supplied.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let Some(mut credential) = store.find_credential_by_email(&email).await? else {
        debug!("Login for unknown email");
        return Err(Error::InvalidCredentials);
    };

    let matches = password::verify(&supplied, &credential.password_hash).unwrap_or_else(|err| {
        warn!(user_id = %credential.id, "Stored password hash unreadable: {err}");
        false
    });

    for _ in 0..LOCKOUT_RETRIES {
        if let Some(until) = credential.lockout.locked_until(now) {
            warn!(user_id = %credential.id, %until, "Login refused, account locked");
            return Err(Error::AccountLocked { until });
        }
        if !credential.active {
            return Err(Error::InvalidCredentials);
        }

        let current = credential.lockout;
        if matches {
            if current.needs_reset()
                && !store
                    .swap_lockout(credential.id, current, LockoutState::default(), now)
                    .await?
            {
                credential = reload(store, credential.id).await?;
                continue;
            }
            store.record_login(credential.id, now).await?;
            credential.lockout = LockoutState::default();
            credential.last_login = Some(now);
            info!(user_id = %credential.id, "User logged in");
            return issue(keys, &credential, now);
        }

        let next = current.after_failure(now, policy);
        if store.swap_lockout(credential.id, current, next, now).await? {
            if let Some(until) = next.locked_until(now) {
                warn!(user_id = %credential.id, %until, "Account locked after repeated failures");
            }
            return Err(Error::InvalidCredentials);
        }
        credential = reload(store, credential.id).await?;
    }

    warn!(user_id = %credential.id, "Login abandoned after lockout contention");
    Err(Error::RateLimited {
        retry_after_seconds: 1,
    })
}

/// Change the caller's password and issue a replacement session.
///
/// Every token issued before the change stops verifying.
///
/// # Errors
/// `Validation` for a weak or mismatched password, `InvalidCredentials` for
/// a wrong current password.
pub async fn update_password(
    store: &Store,
    keys: &SessionKeys,
    identity: &Identity,
    input: PasswordUpdate,
    now: DateTime<Utc>,
) -> Result<Session> {
    let mut errors = Vec::new();
    let current = input.current_password.unwrap_or_default();
    if current.is_empty() {
        errors.push(FieldError::new(
            "current_password",
            "Current password is required",
        ));
    }
    check_new_password(
        input.password.as_deref(),
        input.password_confirm.as_deref(),
        &mut errors,
    );
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let mut credential = store
        .find_credential(identity.user.id)
        .await?
        .ok_or(Error::Authentication("user no longer exists"))?;
    if !password::verify(&current, &credential.password_hash).unwrap_or(false) {
        return Err(Error::InvalidCredentials);
    }

    let password_hash = password::hash(input.password.as_deref().unwrap_or_default())
        .map_err(|err| hashing_failed(&err))?;
    let changed_at = now - Duration::seconds(1);
    if !store
        .set_password(credential.id, &password_hash, changed_at)
        .await?
    {
        return Err(Error::Authentication("user no longer exists"));
    }
    credential.password_changed_at = Some(changed_at);
    info!(user_id = %credential.id, "Password changed");
    issue(keys, &credential, now)
}

/// Start a password reset. Succeeds whether or not the email is known.
///
/// # Errors
/// `Validation` for a malformed email, `StorageUnavailable` when the store
/// cannot be reached.
pub async fn forgot_password(
    store: &Store,
    mailer: &dyn Mailer,
    frontend_base_url: &str,
    input: ForgotPassword,
    now: DateTime<Utc>,
) -> Result<()> {
    let email = input
        .email
        .as_deref()
        .map(normalize_email)
        .unwrap_or_default();
    if !valid_email(&email) {
        return Err(Error::field("email", "Please include a valid email"));
    }

    let Some(credential) = store
        .find_credential_by_email(&email)
        .await?
        .filter(|credential| credential.active)
    else {
        debug!("Password reset for unknown or inactive email");
        return Ok(());
    };

    let token = match generate_reset_token() {
        Ok(token) => token,
        Err(err) => {
            error!("{err:#}");
            return Ok(());
        }
    };
    let reset = ResetToken {
        hash: hash_reset_token(&token),
        expires_at: now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
    };
    store.set_reset_token(credential.id, &reset, now).await?;

    if let Err(err) = mailer
        .send_password_reset(&credential.email, &reset_url(frontend_base_url, &token))
        .await
    {
        warn!(user_id = %credential.id, "Failed to send reset email: {err:#}");
    }
    Ok(())
}

/// Complete a reset with the emailed token and open a session.
///
/// # Errors
/// `Validation` for a weak password or an unknown, used or expired token.
pub async fn reset_password(
    store: &Store,
    keys: &SessionKeys,
    token: &str,
    input: PasswordReset,
    now: DateTime<Utc>,
) -> Result<Session> {
    let mut errors = Vec::new();
    check_new_password(
        input.password.as_deref(),
        input.password_confirm.as_deref(),
        &mut errors,
    );
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let invalid = || Error::field("token", "Token is invalid or has expired");
    let mut credential = store
        .find_credential_by_reset_token(&hash_reset_token(token.trim()), now)
        .await?
        .filter(|credential| credential.active)
        .ok_or_else(invalid)?;

    let password_hash = password::hash(input.password.as_deref().unwrap_or_default())
        .map_err(|err| hashing_failed(&err))?;
    let changed_at = now - Duration::seconds(1);
    if !store
        .set_password(credential.id, &password_hash, changed_at)
        .await?
    {
        return Err(invalid());
    }
    credential.password_changed_at = Some(changed_at);
    credential.reset_token = None;
    info!(user_id = %credential.id, "Password reset completed");
    issue(keys, &credential, now)
}

/// # Errors
/// Returns `StorageUnavailable` when the store cannot be read.
pub async fn list(store: &Store, query: &ListQuery<CredentialField>) -> Result<Page<CredentialView>> {
    let page = store.list_credentials(query).await?;
    Ok(Page {
        items: page.items.iter().map(Credential::view).collect(),
        total: page.total,
    })
}

/// Activate or deactivate a credential. Deactivation is the soft delete.
///
/// # Errors
/// `NotFound` when no credential has `id`.
pub async fn set_active(store: &Store, id: Uuid, active: bool, now: DateTime<Utc>) -> Result<CredentialView> {
    let credential = store
        .set_credential_active(id, active, now)
        .await?
        .ok_or(Error::NotFound("user"))?;
    info!(user_id = %id, active, "Updated user status");
    Ok(credential.view())
}

/// Create the first admin when `email` is not registered yet.
///
/// Returns whether a credential was created.
///
/// # Errors
/// `Validation` when the configured email or password is unacceptable.
pub async fn bootstrap_admin(store: &Store, email: &str, password: &str, now: DateTime<Utc>) -> Result<bool> {
    if store
        .find_credential_by_email(&normalize_email(email))
        .await?
        .is_some()
    {
        debug!("Bootstrap admin already present");
        return Ok(false);
    }
    let input = RegisterInput {
        name: Some("Administrator".to_string()),
        email: Some(email.to_string()),
        password: Some(password.to_string()),
        role: Some(Role::Admin.as_str().to_string()),
    };
    let credential = Credential::register(input, now)?;
    match store.insert_credential(&credential).await {
        Ok(()) => {
            info!(user_id = %credential.id, "Bootstrapped admin user");
            Ok(true)
        }
        Err(StoreError::Duplicate(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::QueryLimits;
    use secrecy::SecretString;
    use std::{sync::Mutex, time::Duration as StdDuration};

    const PASSWORD: &str = "Sup3r$ecret";

    fn keys() -> SessionKeys {
        SessionKeys::new(SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
    }

    fn store() -> Store {
        Store::memory(StdDuration::from_secs(5))
    }

    fn registration(email: &str, role: Option<&str>) -> RegisterInput {
        RegisterInput {
            name: Some(" Ada ".to_string()),
            email: Some(email.to_string()),
            password: Some(PASSWORD.to_string()),
            role: role.map(ToString::to_string),
        }
    }

    fn login_input(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Mailer for CapturingMailer {
        async fn send_password_reset(&self, to: &str, reset_url: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), reset_url.to_string()));
            Ok(())
        }
    }

    #[test]
    fn register_reports_every_invalid_field() {
        let input = RegisterInput {
            name: Some("x".repeat(51)),
            email: Some("not-an-email".to_string()),
            password: Some("weak".to_string()),
            role: Some("owner".to_string()),
        };
        match Credential::register(input, Utc::now()) {
            Err(Error::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["name", "email", "password", "role"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn register_normalises_and_hashes() {
        let credential =
            Credential::register(registration(" Ada@Example.COM ", None), Utc::now()).unwrap();
        assert_eq!(credential.name, "Ada");
        assert_eq!(credential.email, "ada@example.com");
        assert_eq!(credential.role, Role::Editor);
        assert_ne!(credential.password_hash, PASSWORD);
        assert!(password::verify(PASSWORD, &credential.password_hash).unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let store = store();
        register(&store, registration("ada@example.com", None), Utc::now())
            .await
            .unwrap();
        let again = register(&store, registration("ADA@example.com", Some("admin")), Utc::now()).await;
        match again {
            Err(Error::Validation(errors)) => {
                assert_eq!(errors, vec![FieldError::new("email", "Email already registered")]);
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lockout_after_five_failures_then_recovers() {
        let store = store();
        let policy = LockoutPolicy::new();
        let now = Utc::now();
        register(&store, registration("ada@example.com", None), now)
            .await
            .unwrap();

        for _ in 0..5 {
            let attempt = login(&store, &keys(), &policy, login_input("ada@example.com", "Wr0ng$pass"), now).await;
            assert!(matches!(attempt, Err(Error::InvalidCredentials)));
        }

        let locked = login(&store, &keys(), &policy, login_input("ada@example.com", PASSWORD), now).await;
        let until = match locked {
            Err(Error::AccountLocked { until }) => until,
            other => panic!("expected lock, got {other:?}"),
        };
        assert_eq!(until, now + Duration::minutes(15));

        let later = until + Duration::seconds(1);
        let session = login(&store, &keys(), &policy, login_input("ada@example.com", PASSWORD), later)
            .await
            .unwrap();
        assert_eq!(session.user.last_login, Some(later));

        let stored = store
            .find_credential_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.lockout, LockoutState::default());
    }

    /// Fire `attempts` wrong-password logins at once and collect the outcomes.
    async fn concurrent_failures(
        store: &Store,
        policy: LockoutPolicy,
        attempts: usize,
        now: DateTime<Utc>,
    ) -> Vec<Result<Session>> {
        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let input = login_input("ada@example.com", "Wr0ng$pass");
                    login(&store, &keys(), &policy, input, now).await
                })
            })
            .collect();
        let mut outcomes = Vec::with_capacity(attempts);
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        outcomes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() {
        let store = store();
        let policy = LockoutPolicy::new();
        let now = Utc::now();
        register(&store, registration("ada@example.com", None), now)
            .await
            .unwrap();

        let outcomes = concurrent_failures(&store, policy, 4, now).await;
        assert!(outcomes.iter().all(|o| matches!(o, Err(Error::InvalidCredentials))));

        let stored = store
            .find_credential_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.lockout.failed_attempts, 4);
        assert_eq!(stored.lockout.lock_until, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_lock_exactly_at_threshold() {
        let store = store();
        let policy = LockoutPolicy::new();
        let now = Utc::now();
        register(&store, registration("ada@example.com", None), now)
            .await
            .unwrap();

        let outcomes = concurrent_failures(&store, policy, 8, now).await;
        let counted = outcomes
            .iter()
            .filter(|o| matches!(o, Err(Error::InvalidCredentials)))
            .count();
        let refused = outcomes
            .iter()
            .filter(|o| matches!(o, Err(Error::AccountLocked { .. })))
            .count();
        assert_eq!(counted, 5);
        assert_eq!(refused, 3);

        let stored = store
            .find_credential_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.lockout.failed_attempts, 5);
        assert_eq!(stored.lockout.lock_until, Some(now + Duration::minutes(15)));
    }

    #[tokio::test]
    async fn inactive_and_unknown_users_cannot_log_in() {
        let store = store();
        let policy = LockoutPolicy::new();
        let view = register(&store, registration("ada@example.com", None), Utc::now())
            .await
            .unwrap();
        set_active(&store, view.id, false, Utc::now()).await.unwrap();

        for email in ["ada@example.com", "nobody@example.com"] {
            let attempt = login(&store, &keys(), &policy, login_input(email, PASSWORD), Utc::now()).await;
            assert!(matches!(attempt, Err(Error::InvalidCredentials)));
        }
        assert!(matches!(
            login(&store, &keys(), &policy, LoginInput::default(), Utc::now()).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn password_change_revokes_older_tokens() {
        let store = store();
        let policy = LockoutPolicy::new();
        let issued_at = Utc::now() - Duration::minutes(5);
        register(&store, registration("ada@example.com", None), issued_at)
            .await
            .unwrap();
        let old = login(&store, &keys(), &policy, login_input("ada@example.com", PASSWORD), issued_at)
            .await
            .unwrap();
        let identity = crate::session::verify(&store, &keys(), &old.token, issued_at)
            .await
            .unwrap();

        let now = Utc::now();
        let wrong = PasswordUpdate {
            current_password: Some("Wr0ng$pass".to_string()),
            password: Some("N3w$ecret!".to_string()),
            password_confirm: Some("N3w$ecret!".to_string()),
        };
        assert!(matches!(
            update_password(&store, &keys(), &identity, wrong, now).await,
            Err(Error::InvalidCredentials)
        ));

        let update = PasswordUpdate {
            current_password: Some(PASSWORD.to_string()),
            password: Some("N3w$ecret!".to_string()),
            password_confirm: Some("N3w$ecret!".to_string()),
        };
        let fresh = update_password(&store, &keys(), &identity, update, now)
            .await
            .unwrap();

        assert!(matches!(
            crate::session::verify(&store, &keys(), &old.token, now).await,
            Err(Error::Authentication(_))
        ));
        assert!(crate::session::verify(&store, &keys(), &fresh.token, now).await.is_ok());
    }

    #[tokio::test]
    async fn forgot_and_reset_password() {
        let store = store();
        let policy = LockoutPolicy::new();
        let mailer = CapturingMailer::default();
        let now = Utc::now();
        register(&store, registration("ada@example.com", None), now)
            .await
            .unwrap();

        forgot_password(
            &store,
            &mailer,
            "https://example.com",
            ForgotPassword {
                email: Some("nobody@example.com".to_string()),
            },
            now,
        )
        .await
        .unwrap();
        assert!(mailer.sent.lock().unwrap().is_empty());

        forgot_password(
            &store,
            &mailer,
            "https://example.com",
            ForgotPassword {
                email: Some("ADA@example.com".to_string()),
            },
            now,
        )
        .await
        .unwrap();
        let (to, url) = mailer.sent.lock().unwrap().first().cloned().unwrap();
        assert_eq!(to, "ada@example.com");
        let token = url.rsplit('/').next().unwrap().to_string();

        let stored = store
            .find_credential_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.reset_token.as_ref().map(|t| t.hash.clone()), Some(token.clone()));

        let reset = |password: &str| PasswordReset {
            password: Some(password.to_string()),
            password_confirm: Some(password.to_string()),
        };
        let expired = now + Duration::minutes(RESET_TOKEN_TTL_MINUTES + 1);
        assert!(matches!(
            reset_password(&store, &keys(), &token, reset("N3w$ecret!"), expired).await,
            Err(Error::Validation(_))
        ));

        let session = reset_password(&store, &keys(), &token, reset("N3w$ecret!"), now)
            .await
            .unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert!(matches!(
            reset_password(&store, &keys(), &token, reset("An0ther$one"), now).await,
            Err(Error::Validation(_))
        ));

        assert!(
            login(&store, &keys(), &policy, login_input("ada@example.com", "N3w$ecret!"), now)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn bootstrap_admin_is_idempotent() {
        let store = store();
        assert!(bootstrap_admin(&store, "root@example.com", PASSWORD, Utc::now()).await.unwrap());
        assert!(!bootstrap_admin(&store, "root@example.com", PASSWORD, Utc::now()).await.unwrap());

        let page = list(&store, &ListQuery::new(QueryLimits::new())).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.first().map(|user| user.role), Some(Role::Admin));
    }
}
