use super::{Contact, ContactStore, PhotoStorage, ProfileError, ProfileRecord, ProfileStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// Profiles and contacts kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, ProfileRecord>>,
    /// owner id -> (contact id -> contact)
    contacts: Mutex<HashMap<String, BTreeMap<String, Contact>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.lock().len()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        Ok(self.profiles.lock().get(id).cloned())
    }

    async fn put_profile(&self, profile: &ProfileRecord) -> Result<(), ProfileError> {
        self.profiles
            .lock()
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update_name(&self, id: &str, name: &str, last_name: &str) -> Result<(), ProfileError> {
        let mut profiles = self.profiles.lock();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| ProfileError::ProfileNotFound(id.to_string()))?;
        profile.name = name.to_string();
        profile.last_name = last_name.to_string();
        Ok(())
    }

    async fn set_photo_url(&self, id: &str, photo_url: &str) -> Result<(), ProfileError> {
        let mut profiles = self.profiles.lock();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| ProfileError::ProfileNotFound(id.to_string()))?;
        profile.photo_url = Some(photo_url.to_string());
        Ok(())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        let profiles = self.profiles.lock();
        // Deterministic pick when several records share a phone number.
        Ok(profiles
            .values()
            .filter(|p| p.phone == phone)
            .min_by(|a, b| a.id.cmp(&b.id))
            .cloned())
    }
}

#[async_trait]
impl ContactStore for MemoryProfileStore {
    async fn list_contacts(&self, owner: &str) -> Result<Vec<Contact>, ProfileError> {
        Ok(self
            .contacts
            .lock()
            .get(owner)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_contact(&self, owner: &str, id: &str) -> Result<Option<Contact>, ProfileError> {
        Ok(self
            .contacts
            .lock()
            .get(owner)
            .and_then(|entries| entries.get(id).cloned()))
    }

    async fn put_contact(&self, owner: &str, contact: &Contact) -> Result<(), ProfileError> {
        self.contacts
            .lock()
            .entry(owner.to_string())
            .or_default()
            .insert(contact.id.clone(), contact.clone());
        Ok(())
    }
}

/// Photo storage that keeps uploads in memory under a fake public base URL.
#[derive(Debug)]
pub struct MemoryPhotoStorage {
    public_base: String,
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryPhotoStorage {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Content type and bytes of a stored object.
    pub fn object(&self, name: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().get(name).cloned()
    }
}

impl Default for MemoryPhotoStorage {
    fn default() -> Self {
        Self::new("memory://profile-photos")
    }
}

#[async_trait]
impl PhotoStorage for MemoryPhotoStorage {
    async fn upload(
        &self,
        object_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ProfileError> {
        let mut objects = self.objects.lock();
        if objects.contains_key(object_name) {
            return Err(ProfileError::Status {
                status: 409,
                body: format!("object {object_name} already exists"),
            });
        }
        objects.insert(object_name.to_string(), (content_type.to_string(), bytes));
        Ok(format!("{}/{}", self.public_base, object_name))
    }
}
