//! Supabase integration for jitcall.
//!
//! Backs the profile, contact and photo traits with Supabase services:
//! - Profiles: PostgREST table keyed by principal id (`users` by default)
//! - Contacts: PostgREST table of `(owner_id, id, name, last_name, phone)` rows
//! - Photos: Storage bucket with public read access (`profile-photos`)
//!
//! ## Design
//! - HTTP client (reqwest) against the PostgREST and Storage endpoints
//! - Anon-key authentication; row level security decides what a client may touch
//! - Filter values are URL-encoded; non-2xx responses become `ProfileError::Status`

use crate::profile::{Contact, ContactStore, PhotoStorage, ProfileError, ProfileRecord, ProfileStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Longest response body excerpt kept in errors.
const MAX_ERROR_BODY_CHARS: usize = 300;

// ── Configuration ────────────────────────────────────────────────

/// Supabase connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Supabase project URL (e.g., https://xxxx.supabase.co).
    pub url: String,
    /// Public anon key; row level security applies.
    pub anon_key: String,
    #[serde(default = "default_profile_table")]
    pub profile_table: String,
    #[serde(default = "default_contacts_table")]
    pub contacts_table: String,
    #[serde(default = "default_photo_bucket")]
    pub photo_bucket: String,
}

fn default_profile_table() -> String {
    "users".into()
}

fn default_contacts_table() -> String {
    "contacts".into()
}

fn default_photo_bucket() -> String {
    "profile-photos".into()
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            profile_table: default_profile_table(),
            contacts_table: default_contacts_table(),
            photo_bucket: default_photo_bucket(),
        }
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let url = lookup("SUPABASE_URL")?;
        let anon_key = lookup("SUPABASE_ANON_KEY")?;

        if url.trim().is_empty() || anon_key.trim().is_empty() {
            return None;
        }

        Some(Self::new(url.trim(), anon_key.trim()))
    }
}

// ── Data models ──────────────────────────────────────────────────

/// Row of the contacts table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContactRow {
    owner_id: String,
    #[serde(flatten)]
    contact: Contact,
}

#[derive(Serialize)]
struct NamePatch<'a> {
    name: &'a str,
    last_name: &'a str,
}

#[derive(Serialize)]
struct PhotoPatch<'a> {
    photo_url: &'a str,
}

// ── Supabase client ──────────────────────────────────────────────

/// Supabase HTTP client for profile, contact and photo operations.
pub struct SupabaseClient {
    config: SupabaseConfig,
    http: reqwest::Client,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    pub fn new(config: SupabaseConfig) -> anyhow::Result<Self> {
        if config.url.trim().is_empty() {
            anyhow::bail!("supabase.url cannot be empty");
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let config = SupabaseConfig {
            url: config.url.trim_end_matches('/').to_string(),
            ..config
        };
        Ok(Self { config, http })
    }

    /// Build the PostgREST URL for a table.
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    /// Upload URL of an object in the photo bucket.
    fn object_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url,
            self.config.photo_bucket,
            urlencoding::encode(object_name)
        )
    }

    /// Public download URL of an object in the photo bucket.
    fn public_object_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url,
            self.config.photo_bucket,
            urlencoding::encode(object_name)
        )
    }

    /// Get the base headers for authenticated requests.
    fn auth_headers(&self) -> Vec<(&str, String)> {
        vec![
            ("apikey", self.config.anon_key.clone()),
            ("Authorization", format!("Bearer {}", self.config.anon_key)),
        ]
    }

    fn authed(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }
        request
    }

    /// Send and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ProfileError> {
        let resp = self.authed(request).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ProfileError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok(body)
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, ProfileError> {
        let body = self.send(self.http.get(url)).await?;
        parse_rows(&body)
    }

    fn profile_filter_url(&self, id: &str) -> String {
        format!(
            "{}?id=eq.{}",
            self.table_url(&self.config.profile_table),
            urlencoding::encode(id)
        )
    }

    /// PATCH one profile row; a patch that matches no row is `ProfileNotFound`.
    async fn patch_profile<B: Serialize + Sync>(&self, id: &str, patch: &B) -> Result<(), ProfileError> {
        let request = self
            .http
            .patch(self.profile_filter_url(id))
            .header("Prefer", "return=representation")
            .json(patch);

        let body = self.send(request).await?;
        let rows: Vec<ProfileRecord> = parse_rows(&body)?;
        if rows.is_empty() {
            return Err(ProfileError::ProfileNotFound(id.to_string()));
        }
        Ok(())
    }

    // ── Health check ─────────────────────────────────────────

    /// Check if Supabase is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/rest/v1/", self.config.url);
        matches!(self.authed(self.http.get(&url)).send().await, Ok(resp) if resp.status().is_success())
    }
}

fn parse_rows<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ProfileError> {
    serde_json::from_str(body).map_err(|e| ProfileError::Malformed(e.to_string()))
}

// ── Profiles ─────────────────────────────────────────────────────

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn get_profile(&self, id: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        let url = format!("{}&select=*", self.profile_filter_url(id));
        let rows: Vec<ProfileRecord> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }

    async fn put_profile(&self, profile: &ProfileRecord) -> Result<(), ProfileError> {
        let request = self
            .http
            .post(self.table_url(&self.config.profile_table))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(profile);
        self.send(request).await?;
        Ok(())
    }

    async fn update_name(&self, id: &str, name: &str, last_name: &str) -> Result<(), ProfileError> {
        self.patch_profile(id, &NamePatch { name, last_name }).await
    }

    async fn set_photo_url(&self, id: &str, photo_url: &str) -> Result<(), ProfileError> {
        self.patch_profile(id, &PhotoPatch { photo_url }).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        let url = format!(
            "{}?phone=eq.{}&select=*&order=id.asc&limit=1",
            self.table_url(&self.config.profile_table),
            urlencoding::encode(phone)
        );
        let rows: Vec<ProfileRecord> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }
}

// ── Contacts ─────────────────────────────────────────────────────

#[async_trait]
impl ContactStore for SupabaseClient {
    async fn list_contacts(&self, owner: &str) -> Result<Vec<Contact>, ProfileError> {
        let url = format!(
            "{}?owner_id=eq.{}&select=*&order=name.asc",
            self.table_url(&self.config.contacts_table),
            urlencoding::encode(owner)
        );
        let rows: Vec<ContactRow> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().map(|row| row.contact).collect())
    }

    async fn get_contact(&self, owner: &str, id: &str) -> Result<Option<Contact>, ProfileError> {
        let url = format!(
            "{}?owner_id=eq.{}&id=eq.{}&select=*",
            self.table_url(&self.config.contacts_table),
            urlencoding::encode(owner),
            urlencoding::encode(id)
        );
        let rows: Vec<ContactRow> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next().map(|row| row.contact))
    }

    async fn put_contact(&self, owner: &str, contact: &Contact) -> Result<(), ProfileError> {
        let row = ContactRow {
            owner_id: owner.to_string(),
            contact: contact.clone(),
        };
        let request = self
            .http
            .post(self.table_url(&self.config.contacts_table))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }
}

// ── Storage ──────────────────────────────────────────────────────

#[async_trait]
impl PhotoStorage for SupabaseClient {
    async fn upload(
        &self,
        object_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ProfileError> {
        let request = self
            .http
            .post(self.object_url(object_name))
            .header("Content-Type", content_type)
            .header("Cache-Control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await?;
        Ok(self.public_object_url(object_name))
    }
}

// ── Tests ────────────────────────────────────────────────────────
