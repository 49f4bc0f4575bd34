use crate::auth::ExternalTokenManager;
use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Url;
use std::sync::Arc;

/// Read-only access to a cached bearer token. Must not do network I/O.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl TokenSource for ExternalTokenManager {
    fn token(&self) -> Option<String> {
        self.get_token()
    }
}

/// Step applied to every outbound request before dispatch.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, request: &mut reqwest::Request);
}

/// Adds `Authorization: Bearer <token>` to requests under the external API
/// base when a token is cached. Every other request passes through untouched.
pub struct BearerInterceptor {
    base: String,
    source: Arc<dyn TokenSource>,
}

impl BearerInterceptor {
    pub fn new(base_url: &str, source: Arc<dyn TokenSource>) -> anyhow::Result<Self> {
        let parsed = Url::parse(base_url.trim())
            .with_context(|| format!("invalid external API base URL '{base_url}'"))?;
        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            source,
        })
    }

    /// Whether `url` lies under the base address, at a path boundary.
    pub fn targets_external_api(&self, url: &Url) -> bool {
        match url.as_str().strip_prefix(self.base.as_str()) {
            Some(rest) => {
                rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#')
            }
            None => false,
        }
    }
}

impl Interceptor for BearerInterceptor {
    fn intercept(&self, request: &mut reqwest::Request) {
        if !self.targets_external_api(request.url()) {
            return;
        }
        let Some(token) = self.source.token().filter(|t| !t.is_empty()) else {
            return;
        };

        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                tracing::debug!(url = %request.url(), "Attached external API token");
            }
            Err(_) => {
                tracing::warn!("Cached external API token is not a valid header value; sending request without it");
            }
        }
    }
}
