//! User profiles, contacts and profile photos.
//!
//! The document store behind profiles and contacts, and the object store
//! behind photos, are reached only through the traits in this module:
//! - [`ProfileStore`]: one [`ProfileRecord`] per principal id
//! - [`ContactStore`]: per-owner contact list
//! - [`PhotoStorage`]: public object upload
//!
//! In-memory implementations live in [`memory`]; the Supabase-backed ones in
//! `crate::integrations::supabase`.

pub mod memory;
pub mod service;

pub use memory::{MemoryPhotoStorage, MemoryProfileStore};
pub use service::ProfileService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Profile document stored per principal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Principal id issued by the identity provider.
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Entry of a user's contact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Principal id of the contact.
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub phone: String,
}

impl From<&ProfileRecord> for Contact {
    fn from(profile: &ProfileRecord) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            last_name: profile.last_name.clone(),
            phone: profile.phone.clone(),
        }
    }
}

/// Profile, contact or photo operation failure.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("profile store rejected the request ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("profile store returned a malformed body: {0}")]
    Malformed(String),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
    #[error("no profile for user {0}")]
    ProfileNotFound(String),
    #[error("invalid phone number '{0}': expected at least 10 digits")]
    InvalidPhone(String),
    #[error("no user with phone number {0}")]
    ContactNotFound(String),
    #[error("cannot add yourself as a contact")]
    SelfContact,
    #[error("{0} is already in the contact list")]
    AlreadyAdded(String),
    #[error("invalid photo data: {0}")]
    InvalidPhoto(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Option<ProfileRecord>, ProfileError>;

    /// Create or replace the whole record.
    async fn put_profile(&self, profile: &ProfileRecord) -> Result<(), ProfileError>;

    /// Patch name fields of an existing record.
    async fn update_name(&self, id: &str, name: &str, last_name: &str) -> Result<(), ProfileError>;

    /// Patch the photo URL of an existing record.
    async fn set_photo_url(&self, id: &str, photo_url: &str) -> Result<(), ProfileError>;

    /// First profile registered with exactly this phone number.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<ProfileRecord>, ProfileError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn list_contacts(&self, owner: &str) -> Result<Vec<Contact>, ProfileError>;

    async fn get_contact(&self, owner: &str, id: &str) -> Result<Option<Contact>, ProfileError>;

    async fn put_contact(&self, owner: &str, contact: &Contact) -> Result<(), ProfileError>;
}

/// Public object storage for profile photos.
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Upload without overwriting and return the object's public URL.
    async fn upload(
        &self,
        object_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ProfileError>;
}

/// Profile store whose every operation fails.
#[cfg(test)]
pub(crate) struct BrokenProfileStore;

#[cfg(test)]
#[async_trait]
impl ProfileStore for BrokenProfileStore {
    async fn get_profile(&self, _id: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        Err(ProfileError::Unavailable("store offline".into()))
    }

    async fn put_profile(&self, _profile: &ProfileRecord) -> Result<(), ProfileError> {
        Err(ProfileError::Unavailable("store offline".into()))
    }

    async fn update_name(&self, _id: &str, _name: &str, _last_name: &str) -> Result<(), ProfileError> {
        Err(ProfileError::Unavailable("store offline".into()))
    }

    async fn set_photo_url(&self, _id: &str, _photo_url: &str) -> Result<(), ProfileError> {
        Err(ProfileError::Unavailable("store offline".into()))
    }

    async fn find_by_phone(&self, _phone: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        Err(ProfileError::Unavailable("store offline".into()))
    }
}
