//! Primary identity provider abstraction.
//!
//! The provider is the system of record for credentials and owns the live
//! [`SessionFeed`]. Everything else in the crate only observes that feed.
//! Failures are reported as a structured [`ProviderErrorCode`] so callers
//! never classify errors by inspecting message text.

use super::firebase::FirebaseIdentityProvider;
use super::memory::MemoryIdentityProvider;
use super::session::{Session, SessionFeed};
use crate::config::IdentityConfig;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Failure categories an identity provider can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Wrong password, or the provider refuses to say which part was wrong.
    InvalidCredentials,
    UserNotFound,
    /// The email address is malformed.
    InvalidEmail,
    EmailAlreadyInUse,
    WeakPassword,
    UserDisabled,
    TooManyRequests,
    /// Network failure, outage, or the operation is disabled provider-side.
    ProviderUnavailable,
    Unknown,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::UserNotFound => "user_not_found",
            Self::InvalidEmail => "invalid_email",
            Self::EmailAlreadyInUse => "email_already_in_use",
            Self::WeakPassword => "weak_password",
            Self::UserDisabled => "user_disabled",
            Self::TooManyRequests => "too_many_requests",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the failure concerns what the user entered, as opposed to
    /// the provider itself.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::UserNotFound
                | Self::InvalidEmail
                | Self::EmailAlreadyInUse
                | Self::WeakPassword
                | Self::UserDisabled
        )
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured failure reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ProviderUnavailable, message)
    }
}

/// Email/password pair, held only for the duration of a login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-up / sign-in / sign-out against the primary identity system.
///
/// Implementations publish every resulting session change on the feed
/// returned by [`IdentityProvider::sessions`] before returning.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs and config ("memory", "firebase").
    fn name(&self) -> &str;

    /// Create an account. A successful sign-up also signs the user in.
    async fn sign_up(&self, credentials: &Credentials) -> Result<Session, ProviderError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Live feed of the provider's current session.
    fn sessions(&self) -> &SessionFeed;

    /// The provider's own ID token for the signed-in principal, if it issues one.
    fn id_token(&self) -> Option<String> {
        None
    }
}

/// Factory: create the identity provider selected in config.
pub fn create_provider(config: &IdentityConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryIdentityProvider::new())),
        "firebase" => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("identity.provider='firebase' requires identity.api_key")
                })?;
            let provider = FirebaseIdentityProvider::new(
                &config.endpoint,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Arc::new(provider))
        }
        other if other.trim().is_empty() => {
            anyhow::bail!("identity.provider cannot be empty. Supported values: memory, firebase")
        }
        other => anyhow::bail!(
            "Unknown identity provider '{other}'. Supported values: memory, firebase"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_codes_are_classified() {
        assert!(ProviderErrorCode::InvalidCredentials.is_credential_error());
        assert!(ProviderErrorCode::EmailAlreadyInUse.is_credential_error());
        assert!(!ProviderErrorCode::ProviderUnavailable.is_credential_error());
        assert!(!ProviderErrorCode::TooManyRequests.is_credential_error());
        assert!(!ProviderErrorCode::Unknown.is_credential_error());
    }

    #[test]
    fn provider_error_display_includes_code() {
        let err = ProviderError::new(ProviderErrorCode::WeakPassword, "too short");
        assert_eq!(err.to_string(), "weak_password: too short");
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("a@x.com", "secret1");
        let debug = format!("{creds:?}");
        assert!(debug.contains("a@x.com"));
        assert!(!debug.contains("secret1"));
    }

    #[test]
    fn factory_memory() {
        let cfg = IdentityConfig {
            provider: "memory".into(),
            ..IdentityConfig::default()
        };
        let provider = create_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "memory");
    }

    #[test]
    fn factory_firebase() {
        let cfg = IdentityConfig {
            provider: "firebase".into(),
            api_key: Some("test-key".into()),
            ..IdentityConfig::default()
        };
        let provider = create_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "firebase");
    }

    #[test]
    fn factory_firebase_requires_api_key() {
        let cfg = IdentityConfig {
            provider: "firebase".into(),
            api_key: Some("  ".into()),
            ..IdentityConfig::default()
        };
        match create_provider(&cfg) {
            Err(err) => assert!(err.to_string().contains("requires identity.api_key")),
            Ok(_) => panic!("firebase without api key should error"),
        }
    }

    #[test]
    fn factory_unknown_errors() {
        let cfg = IdentityConfig {
            provider: "ldap".into(),
            ..IdentityConfig::default()
        };
        match create_provider(&cfg) {
            Err(err) => assert!(err.to_string().contains("Unknown identity provider")),
            Ok(_) => panic!("unknown provider should error"),
        }
    }

    #[test]
    fn factory_empty_errors() {
        let cfg = IdentityConfig {
            provider: String::new(),
            ..IdentityConfig::default()
        };
        match create_provider(&cfg) {
            Err(err) => assert!(err.to_string().contains("cannot be empty")),
            Ok(_) => panic!("empty provider should error"),
        }
    }
}
