//! External API session token.
//!
//! After every successful primary login the [`ExternalTokenManager`] logs in
//! to the external API with the same credentials, in a detached task, and
//! caches the returned bearer token in the device-local store under
//! [`EXTERNAL_TOKEN_KEY`]. This secondary login is best-effort: failures are
//! logged and reported on the outcome channel, never to the login caller.
//!
//! ## Login race
//! Each `clear_token` bumps a generation counter. A secondary login captures
//! the generation at dispatch and only writes its token if that generation is
//! still current, under the same lock `clear_token` takes. A logout therefore
//! can never be undone by a slower secondary login started before it.

use super::provider::Credentials;
use super::store::{KeyValueStore, StorageError};
use crate::config::ExternalApiConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Fixed key of the persisted token slot.
pub const EXTERNAL_TOKEN_KEY: &str = "external_api_token";

/// Outcomes buffered per outcome subscriber.
const OUTCOME_CAPACITY: usize = 16;

/// Longest response body excerpt kept in errors.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Why a secondary login did not produce a stored token.
#[derive(Debug, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("external API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("external API login rejected ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("external API returned a malformed body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("failed to persist external API token: {0}")]
    Storage(#[from] StorageError),
}

/// Result of one secondary login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryLoginOutcome {
    /// A token was obtained and written to the slot.
    Stored,
    /// The API accepted the credentials but returned no token.
    NoToken,
    /// The attempt failed; the slot was left untouched.
    Failed(String),
    /// A token was obtained after a logout and thrown away.
    Discarded,
}

#[derive(Serialize)]
struct ExternalLoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ExternalLoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Owner of the persisted external API token.
pub struct ExternalTokenManager {
    base_url: String,
    http: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    generation: Mutex<u64>,
    outcomes: broadcast::Sender<SecondaryLoginOutcome>,
}

impl ExternalTokenManager {
    pub fn new(config: &ExternalApiConfig, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let (outcomes, _rx) = broadcast::channel(OUTCOME_CAPACITY);

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            store,
            generation: Mutex::new(0),
            outcomes,
        })
    }

    /// External API base address, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn login_url(&self) -> String {
        format!("{}/user/login", self.base_url)
    }

    /// Perform the external login and return the token, if one was issued.
    /// Does not touch the persisted slot.
    pub async fn request_token(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<String>, ExternalServiceError> {
        let body = ExternalLoginRequest {
            email: &credentials.email,
            password: &credentials.password,
        };

        let resp = self.http.post(self.login_url()).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(ExternalServiceError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: ExternalLoginResponse = serde_json::from_str(&text)?;
        Ok(parsed.token.filter(|token| !token.is_empty()))
    }

    /// Start a secondary login in a detached task.
    ///
    /// The caller is not expected to await the handle; the outcome is logged
    /// and sent to [`subscribe_outcomes`](Self::subscribe_outcomes) receivers.
    pub fn spawn_login(self: &Arc<Self>, credentials: Credentials) -> JoinHandle<()> {
        let generation = *self.generation.lock();
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = manager.run_login(generation, &credentials).await;
            // Nobody listening is the normal case.
            let _ = manager.outcomes.send(outcome);
        })
    }

    async fn run_login(&self, generation: u64, credentials: &Credentials) -> SecondaryLoginOutcome {
        match self.request_token(credentials).await {
            Ok(Some(token)) => self.store_if_current(generation, &token),
            Ok(None) => {
                tracing::warn!("External API login succeeded, but no token was received");
                SecondaryLoginOutcome::NoToken
            }
            Err(e) => {
                tracing::error!(error = %e, "External API login failed; continuing without an external token");
                SecondaryLoginOutcome::Failed(e.to_string())
            }
        }
    }

    fn store_if_current(&self, generation: u64, token: &str) -> SecondaryLoginOutcome {
        let current = self.generation.lock();
        if *current != generation {
            tracing::info!("Discarding external API token obtained before the last logout");
            return SecondaryLoginOutcome::Discarded;
        }

        match self.store.set(EXTERNAL_TOKEN_KEY, token) {
            Ok(()) => {
                tracing::info!("External API token obtained and stored");
                SecondaryLoginOutcome::Stored
            }
            Err(e) => {
                let err = ExternalServiceError::from(e);
                tracing::error!(error = %err, "Could not store external API token");
                SecondaryLoginOutcome::Failed(err.to_string())
            }
        }
    }

    /// Cached token, read from the local store only.
    ///
    /// A failed read is logged and treated as "no token".
    pub fn get_token(&self) -> Option<String> {
        match self.store.get(EXTERNAL_TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read external API token; treating as absent");
                None
            }
        }
    }

    /// Delete the cached token. Deleting an empty slot is a no-op.
    pub fn clear_token(&self) -> Result<(), StorageError> {
        let mut generation = self.generation.lock();
        *generation += 1;
        let removed = self.store.remove(EXTERNAL_TOKEN_KEY)?;
        tracing::debug!(removed, "External API token slot cleared");
        Ok(())
    }

    /// Receive the outcome of every secondary login started after this call.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SecondaryLoginOutcome> {
        self.outcomes.subscribe()
    }
}
