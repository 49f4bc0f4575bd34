//! Login, registration and logout over the primary identity provider.
//!
//! `IdentityService` is the only component that mutates the session: it
//! drives the provider, writes the profile record at registration, kicks
//! off the secondary external-API login and clears the external token on
//! logout. Mutations are serialised; reads go straight to the provider's
//! [`SessionFeed`].

use super::external::ExternalTokenManager;
use super::provider::{Credentials, IdentityProvider, ProviderError, ProviderErrorCode};
use super::session::{Session, SessionFeed, SessionSubscription};
use super::store::StorageError;
use crate::profile::{ProfileError, ProfileRecord, ProfileStore};
use std::sync::Arc;

/// Profile fields collected at registration, besides the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationProfile {
    pub name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("account {principal_id} was created but its profile could not be saved: {source}")]
    ProfileWrite {
        principal_id: String,
        #[source]
        source: ProfileError,
    },
    #[error("signed out, but the external API token could not be cleared: {0}")]
    TokenCleanup(#[source] StorageError),
    #[error("identity provider returned a session without a principal")]
    MissingPrincipal,
}

impl AuthError {
    /// Provider error code, when the failure came from the provider.
    pub fn provider_code(&self) -> Option<ProviderErrorCode> {
        match self {
            Self::Provider(e) => Some(e.code),
            _ => None,
        }
    }

    /// Whether the failure came from what the user entered rather than from
    /// the provider or local storage.
    pub fn is_credential_error(&self) -> bool {
        self.provider_code()
            .is_some_and(|code| code.is_credential_error())
    }

    /// Short message suitable for showing to the person at the keyboard.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Provider(e) => match e.code {
                ProviderErrorCode::InvalidCredentials => "Incorrect email or password.",
                ProviderErrorCode::UserNotFound => "No account exists for this email.",
                ProviderErrorCode::InvalidEmail => "The email address is not valid.",
                ProviderErrorCode::EmailAlreadyInUse => "An account already exists for this email.",
                ProviderErrorCode::WeakPassword => "The password is too weak.",
                ProviderErrorCode::UserDisabled => "This account has been disabled.",
                ProviderErrorCode::TooManyRequests => "Too many attempts. Try again later.",
                ProviderErrorCode::ProviderUnavailable => {
                    "The sign-in service is unavailable. Try again later."
                }
                ProviderErrorCode::Unknown => "Sign-in failed.",
            },
            Self::ProfileWrite { .. } => "Your account was created, but your profile could not be saved.",
            Self::TokenCleanup(_) => "Signed out, but local data could not be fully cleared.",
            Self::MissingPrincipal => "Sign-in failed.",
        }
    }
}

pub struct IdentityService {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    tokens: Arc<ExternalTokenManager>,
    mutation: tokio::sync::Mutex<()>,
}

impl IdentityService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        tokens: Arc<ExternalTokenManager>,
    ) -> Self {
        Self {
            provider,
            profiles,
            tokens,
            mutation: tokio::sync::Mutex::new(()),
        }
    }

    /// Create an account and write its profile record.
    ///
    /// Registration does not start a secondary external-API login.
    pub async fn register(
        &self,
        profile: RegistrationProfile,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let _guard = self.mutation.lock().await;
        let credentials = Credentials::new(email, password);

        let session = self
            .provider
            .sign_up(&credentials)
            .await
            .map_err(|e| self.log_rejection("Registration", e))?;
        let principal_id = session
            .principal_id()
            .ok_or(AuthError::MissingPrincipal)?
            .to_string();

        let record = ProfileRecord {
            id: principal_id.clone(),
            name: profile.name,
            last_name: profile.last_name,
            email: email.trim().to_string(),
            phone: profile.phone,
            photo_url: None,
        };
        if let Err(source) = self.profiles.put_profile(&record).await {
            tracing::error!(principal_id = %principal_id, error = %source, "Profile write failed after sign-up");
            return Err(AuthError::ProfileWrite {
                principal_id,
                source,
            });
        }

        tracing::info!(principal_id = %principal_id, "Account registered");
        Ok(session)
    }

    /// Sign in and, without waiting for it, start the secondary login.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let _guard = self.mutation.lock().await;
        let credentials = Credentials::new(email, password);

        let session = self
            .provider
            .sign_in(&credentials)
            .await
            .map_err(|e| self.log_rejection("Login", e))?;
        if !session.is_authenticated() {
            return Err(AuthError::MissingPrincipal);
        }

        tracing::info!(principal_id = session.principal_id().unwrap_or_default(), "Logged in");
        // Detached; the outcome goes to the token manager's outcome channel.
        self.tokens.spawn_login(credentials);
        Ok(session)
    }

    /// Sign out, then clear the external token whatever the sign-out result.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.mutation.lock().await;

        let signed_out = self.provider.sign_out().await;
        if let Err(e) = &signed_out {
            tracing::error!(code = %e.code, "Provider sign-out failed; clearing external token anyway");
        }

        let cleared = self.tokens.clear_token();
        if let Err(e) = &cleared {
            tracing::error!(error = %e, "Could not clear external API token");
        }

        signed_out?;
        cleared.map_err(AuthError::TokenCleanup)?;
        tracing::info!("Logged out and external token cleared");
        Ok(())
    }

    pub fn current_session(&self) -> Session {
        self.provider.sessions().current()
    }

    /// Current session first, then every transition.
    pub fn subscribe(&self) -> SessionSubscription {
        self.provider.sessions().subscribe()
    }

    /// Shared feed handle, for components such as the route guard.
    pub fn sessions(&self) -> SessionFeed {
        self.provider.sessions().clone()
    }

    /// Profile record of a principal. Lookup failures are logged and read as absent.
    pub async fn profile(&self, principal_id: &str) -> Option<ProfileRecord> {
        match self.profiles.get_profile(principal_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(principal_id, error = %e, "Could not fetch user profile");
                None
            }
        }
    }

    /// The primary provider's own ID token for the signed-in principal.
    pub fn provider_id_token(&self) -> Option<String> {
        if !self.current_session().is_authenticated() {
            return None;
        }
        self.provider.id_token()
    }

    pub fn tokens(&self) -> &Arc<ExternalTokenManager> {
        &self.tokens
    }

    /// Log a provider failure: rejected input at info, provider trouble at warn.
    fn log_rejection(&self, action: &str, error: ProviderError) -> ProviderError {
        let provider = self.provider.name();
        if error.code.is_credential_error() {
            tracing::info!(provider, code = %error.code, "{action} rejected");
        } else {
            tracing::warn!(provider, code = %error.code, error = %error, "{action} failed at the provider");
        }
        error
    }
}
