//! In-process identity provider.
//!
//! Keeps accounts in memory with salted SHA-256 password digests. Used for
//! offline runs of the CLI and as the provider in tests; it reports the same
//! error codes a hosted provider would.

use super::provider::{Credentials, IdentityProvider, ProviderError, ProviderErrorCode};
use super::session::{Session, SessionFeed};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shortest password the provider accepts on sign-up.
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    principal_id: String,
    salt: String,
    password_digest: String,
}

/// Memory-backed [`IdentityProvider`].
pub struct MemoryIdentityProvider {
    /// Accounts keyed by lower-cased email.
    accounts: Mutex<HashMap<String, Account>>,
    feed: SessionFeed,
    unavailable: AtomicBool,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            feed: SessionFeed::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Create an account without signing in. Returns the principal id.
    pub fn seed_account(&self, email: &str, password: &str) -> String {
        let account = new_account(password);
        let principal_id = account.principal_id.clone();
        self.accounts.lock().insert(email_key(email), account);
        principal_id
    }

    /// Simulate a provider outage: every call fails with `ProviderUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), ProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::unavailable("identity provider is offline"));
        }
        Ok(())
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        self.ensure_available()?;
        if !is_valid_email(&credentials.email) {
            return Err(ProviderError::new(
                ProviderErrorCode::InvalidEmail,
                "The email address is badly formatted.",
            ));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::new(
                ProviderErrorCode::WeakPassword,
                format!("Password should be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        let session = {
            let mut accounts = self.accounts.lock();
            let key = email_key(&credentials.email);
            if accounts.contains_key(&key) {
                return Err(ProviderError::new(
                    ProviderErrorCode::EmailAlreadyInUse,
                    "The email address is already in use by another account.",
                ));
            }
            let account = new_account(&credentials.password);
            let session = Session::signed_in(account.principal_id.clone());
            accounts.insert(key, account);
            session
        };

        self.feed.publish(session.clone());
        Ok(session)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        self.ensure_available()?;
        if !is_valid_email(&credentials.email) {
            return Err(ProviderError::new(
                ProviderErrorCode::InvalidEmail,
                "The email address is badly formatted.",
            ));
        }

        let session = {
            let accounts = self.accounts.lock();
            let account = accounts
                .get(&email_key(&credentials.email))
                .ok_or_else(|| {
                    ProviderError::new(
                        ProviderErrorCode::UserNotFound,
                        "There is no user record corresponding to this identifier.",
                    )
                })?;
            let attempt = digest_password(&credentials.password, &account.salt);
            if !constant_time_eq(attempt.as_bytes(), account.password_digest.as_bytes()) {
                return Err(ProviderError::new(
                    ProviderErrorCode::InvalidCredentials,
                    "The password is invalid.",
                ));
            }
            Session::signed_in(account.principal_id.clone())
        };

        self.feed.publish(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.ensure_available()?;
        self.feed.publish(Session::anonymous());
        Ok(())
    }

    fn sessions(&self) -> &SessionFeed {
        &self.feed
    }
}

fn new_account(password: &str) -> Account {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    Account {
        principal_id: uuid::Uuid::new_v4().simple().to_string(),
        password_digest: digest_password(password, &salt),
        salt,
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Structural email check: one `@`, non-empty local part, dotted domain.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn digest_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    hex::encode(hash.finalize())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials::new(email, password)
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let provider = MemoryIdentityProvider::new();
        let created = provider.sign_up(&creds("a@x.com", "secret1")).await.unwrap();
        assert!(created.is_authenticated());

        provider.sign_out().await.unwrap();
        let signed_in = provider.sign_in(&creds("A@X.com", "secret1")).await.unwrap();
        assert_eq!(signed_in, created);
    }

    #[tokio::test]
    async fn sign_up_publishes_session() {
        let provider = MemoryIdentityProvider::new();
        let session = provider.sign_up(&creds("a@x.com", "secret1")).await.unwrap();
        assert_eq!(provider.sessions().current(), session);
    }

    #[tokio::test]
    async fn sign_up_duplicate_email_fails() {
        let provider = MemoryIdentityProvider::new();
        provider.seed_account("a@x.com", "secret1");
        let err = provider
            .sign_up(&creds("a@x.com", "another1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::EmailAlreadyInUse);
    }

    #[tokio::test]
    async fn sign_up_weak_password_fails() {
        let provider = MemoryIdentityProvider::new();
        let err = provider.sign_up(&creds("a@x.com", "abc")).await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::WeakPassword);
    }

    #[tokio::test]
    async fn sign_up_invalid_email_fails() {
        let provider = MemoryIdentityProvider::new();
        let err = provider
            .sign_up(&creds("not-an-email", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::InvalidEmail);
    }

    #[tokio::test]
    async fn sign_in_wrong_password_fails() {
        let provider = MemoryIdentityProvider::new();
        provider.seed_account("a@x.com", "secret1");
        let err = provider
            .sign_in(&creds("a@x.com", "wrong-one"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::InvalidCredentials);
        assert!(!provider.sessions().current().is_authenticated());
    }

    #[tokio::test]
    async fn sign_in_unknown_user_fails() {
        let provider = MemoryIdentityProvider::new();
        let err = provider
            .sign_in(&creds("ghost@x.com", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn sign_out_publishes_anonymous() {
        let provider = MemoryIdentityProvider::new();
        provider.seed_account("a@x.com", "secret1");
        provider.sign_in(&creds("a@x.com", "secret1")).await.unwrap();
        provider.sign_out().await.unwrap();
        assert_eq!(provider.sessions().current(), Session::anonymous());
    }

    #[tokio::test]
    async fn unavailable_provider_fails_every_call() {
        let provider = MemoryIdentityProvider::new();
        provider.seed_account("a@x.com", "secret1");
        provider.set_unavailable(true);

        let err = provider.sign_in(&creds("a@x.com", "secret1")).await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::ProviderUnavailable);
        let err = provider.sign_out().await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::ProviderUnavailable);
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email(" user.name@mail.example.org "));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@@x.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("a@x.com."));
    }

    #[test]
    fn digest_depends_on_salt() {
        assert_eq!(digest_password("pw", "s1"), digest_password("pw", "s1"));
        assert_ne!(digest_password("pw", "s1"), digest_password("pw", "s2"));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
