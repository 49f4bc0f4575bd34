//! Component wiring.

use crate::auth::{
    create_provider, ExternalTokenManager, IdentityProvider, IdentityService, KeyValueStore,
    SqliteKvStore,
};
use crate::config::Config;
use crate::guard::RouteGuard;
use crate::http::{BearerInterceptor, HttpPipeline};
use crate::integrations::SupabaseClient;
use crate::profile::{
    ContactStore, MemoryPhotoStorage, MemoryProfileStore, PhotoStorage, ProfileService,
    ProfileStore,
};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Everything a client session needs, built from one [`Config`].
pub struct App {
    pub config: Config,
    pub identity: IdentityService,
    pub tokens: Arc<ExternalTokenManager>,
    pub guard: RouteGuard,
    pub http: HttpPipeline,
    pub profiles: ProfileService,
}

impl App {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let db_path = config.storage.db_path()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(
            SqliteKvStore::open(&db_path)
                .with_context(|| format!("Failed to open token store at {}", db_path.display()))?,
        );
        let provider = create_provider(&config.identity)?;
        Self::assemble(config, provider, store)
    }

    /// Wire the graph around an already-built provider and token store.
    pub fn assemble(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> anyhow::Result<Self> {
        let tokens = Arc::new(ExternalTokenManager::new(&config.external_api, store)?);

        let profile_store: Arc<dyn ProfileStore>;
        let contact_store: Arc<dyn ContactStore>;
        let photos: Arc<dyn PhotoStorage>;
        match &config.supabase {
            Some(supabase) => {
                let client = Arc::new(SupabaseClient::new(supabase.clone())?);
                profile_store = client.clone();
                contact_store = client.clone();
                photos = client;
            }
            None => {
                let memory = Arc::new(MemoryProfileStore::new());
                profile_store = memory.clone();
                contact_store = memory;
                photos = Arc::new(MemoryPhotoStorage::default());
            }
        }

        let identity = IdentityService::new(provider.clone(), profile_store.clone(), tokens.clone());
        let guard = RouteGuard::new(identity.sessions());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.external_api.timeout_secs))
            .build()?;
        let bearer = BearerInterceptor::new(&config.external_api.base_url, tokens.clone())?;
        let http = HttpPipeline::new(client).with_interceptor(Arc::new(bearer));

        let profiles = ProfileService::new(profile_store, contact_store, photos);

        tracing::debug!(
            provider = provider.name(),
            external_api = %config.external_api.base_url,
            supabase = config.supabase.is_some(),
            "Application assembled"
        );

        Ok(Self {
            config,
            identity,
            tokens,
            guard,
            http,
            profiles,
        })
    }
}

/// Probe the configured Supabase project.
///
/// `None` when no Supabase section is configured.
pub async fn supabase_reachable(config: &Config) -> anyhow::Result<Option<bool>> {
    let Some(supabase) = &config.supabase else {
        return Ok(None);
    };
    let client = SupabaseClient::new(supabase.clone())?;
    Ok(Some(client.health_check().await))
}
