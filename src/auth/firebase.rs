//! Firebase Authentication over the Identity Toolkit REST API.
//!
//! ## Endpoints
//! - `POST {endpoint}/accounts:signUp?key={api_key}`
//! - `POST {endpoint}/accounts:signInWithPassword?key={api_key}`
//!
//! Both take `{email, password, returnSecureToken: true}` and answer with the
//! principal id (`localId`) and an ID token. Failures come back as
//! `{"error": {"message": "CODE"}}` or `"CODE : detail"`; the code part is
//! mapped exactly onto [`ProviderErrorCode`].
//!
//! Sign-out is local: the ID token is dropped and the anonymous session is
//! published.

use super::provider::{Credentials, IdentityProvider, ProviderError, ProviderErrorCode};
use super::session::{Session, SessionFeed};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Identity Toolkit base URL.
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Firebase-backed [`IdentityProvider`].
pub struct FirebaseIdentityProvider {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
    feed: SessionFeed,
    id_token: RwLock<Option<String>>,
}

impl FirebaseIdentityProvider {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
            feed: SessionFeed::new(),
            id_token: RwLock::new(None),
        })
    }

    /// Build the REST URL for an `accounts:*` action.
    fn action_url(&self, action: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.endpoint,
            action,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn password_call(
        &self,
        action: &str,
        credentials: &Credentials,
    ) -> Result<Session, ProviderError> {
        let body = PasswordRequest {
            email: &credentials.email,
            password: &credentials.password,
            return_secure_token: true,
        };

        let resp = self
            .http
            .post(self.action_url(action))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(format!("identity provider unreachable: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            ProviderError::unavailable(format!("identity provider response interrupted: {e}"))
        })?;

        if !status.is_success() {
            let err = error_from_response(status, &text);
            tracing::debug!(action, code = %err.code, "Identity provider rejected request");
            return Err(err);
        }

        let parsed: PasswordResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(
                ProviderErrorCode::Unknown,
                format!("malformed identity provider response: {e}"),
            )
        })?;

        *self.id_token.write() = parsed.id_token;
        let session = Session::signed_in(parsed.local_id);
        self.feed.publish(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    fn name(&self) -> &str {
        "firebase"
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        self.password_call("signUp", credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        self.password_call("signInWithPassword", credentials).await
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        *self.id_token.write() = None;
        self.feed.publish(Session::anonymous());
        Ok(())
    }

    fn sessions(&self) -> &SessionFeed {
        &self.feed
    }

    fn id_token(&self) -> Option<String> {
        self.id_token.read().clone()
    }
}

/// Map an Identity Toolkit error code onto the provider-neutral taxonomy.
fn error_code_from_wire(code: &str) -> ProviderErrorCode {
    match code {
        "EMAIL_EXISTS" => ProviderErrorCode::EmailAlreadyInUse,
        "WEAK_PASSWORD" => ProviderErrorCode::WeakPassword,
        "INVALID_EMAIL" | "MISSING_EMAIL" => ProviderErrorCode::InvalidEmail,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "MISSING_PASSWORD" => {
            ProviderErrorCode::InvalidCredentials
        }
        "EMAIL_NOT_FOUND" => ProviderErrorCode::UserNotFound,
        "USER_DISABLED" => ProviderErrorCode::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => ProviderErrorCode::TooManyRequests,
        "OPERATION_NOT_ALLOWED" => ProviderErrorCode::ProviderUnavailable,
        _ => ProviderErrorCode::Unknown,
    }
}

fn error_from_response(status: StatusCode, body: &str) -> ProviderError {
    if status.is_server_error() {
        return ProviderError::unavailable(format!("identity provider returned {status}"));
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let raw = envelope.error.message;
            let (code, detail) = match raw.split_once(" : ") {
                Some((code, detail)) => (code.trim(), detail.trim()),
                None => (raw.trim(), ""),
            };
            let message = if detail.is_empty() { code } else { detail };
            ProviderError::new(error_code_from_wire(code), message)
        }
        Err(_) => ProviderError::new(
            ProviderErrorCode::Unknown,
            format!("identity provider returned {status}"),
        ),
    }
}
