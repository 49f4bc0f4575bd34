//! Profile editing and contact-list flows.

use super::{Contact, ContactStore, PhotoStorage, ProfileError, ProfileRecord, ProfileStore};
use base64::Engine;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shortest phone number accepted when adding a contact.
const MIN_PHONE_DIGITS: usize = 10;

pub struct ProfileService {
    profiles: Arc<dyn ProfileStore>,
    contacts: Arc<dyn ContactStore>,
    photos: Arc<dyn PhotoStorage>,
}

impl ProfileService {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        contacts: Arc<dyn ContactStore>,
        photos: Arc<dyn PhotoStorage>,
    ) -> Self {
        Self {
            profiles,
            contacts,
            photos,
        }
    }

    pub async fn profile(&self, user_id: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        self.profiles.get_profile(user_id).await
    }

    pub async fn update_user_name(
        &self,
        user_id: &str,
        name: &str,
        last_name: &str,
    ) -> Result<(), ProfileError> {
        self.profiles.update_name(user_id, name, last_name).await?;
        tracing::info!(user_id, "Profile name updated");
        Ok(())
    }

    /// Upload a `data:image/<type>;base64,...` photo and record its public URL
    /// on the profile. Returns the URL.
    pub async fn upload_profile_photo(
        &self,
        user_id: &str,
        data_url: &str,
    ) -> Result<String, ProfileError> {
        let (content_type, bytes) = decode_data_url(data_url)?;
        let object_name = format!(
            "{user_id}_profile_{}.{}",
            epoch_millis(),
            file_extension(&content_type)
        );

        let photo_url = self.photos.upload(&object_name, &content_type, bytes).await?;
        self.profiles.set_photo_url(user_id, &photo_url).await?;

        tracing::info!(user_id, object = %object_name, "Profile photo uploaded");
        Ok(photo_url)
    }

    pub async fn contacts(&self, owner: &str) -> Result<Vec<Contact>, ProfileError> {
        self.contacts.list_contacts(owner).await
    }

    /// Look up the user registered with `phone` and add them to `owner`'s
    /// contact list.
    pub async fn add_contact_by_phone(
        &self,
        owner: &str,
        phone: &str,
    ) -> Result<Contact, ProfileError> {
        let phone = phone.trim();
        if phone.len() < MIN_PHONE_DIGITS || !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProfileError::InvalidPhone(phone.to_string()));
        }

        let found = self
            .profiles
            .find_by_phone(phone)
            .await?
            .ok_or_else(|| ProfileError::ContactNotFound(phone.to_string()))?;

        if found.id == owner {
            return Err(ProfileError::SelfContact);
        }
        if self.contacts.get_contact(owner, &found.id).await?.is_some() {
            return Err(ProfileError::AlreadyAdded(found.name));
        }

        let contact = Contact::from(&found);
        self.contacts.put_contact(owner, &contact).await?;
        tracing::info!(owner, contact = %contact.id, "Contact added");
        Ok(contact)
    }
}

/// Split a base64 image data URL into its content type and decoded bytes.
fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), ProfileError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ProfileError::InvalidPhoto("not a data URL".into()))?;
    let (content_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| ProfileError::InvalidPhoto("data URL is not base64-encoded".into()))?;

    if !content_type.starts_with("image/") || content_type.len() == "image/".len() {
        return Err(ProfileError::InvalidPhoto(format!(
            "unsupported content type '{content_type}'"
        )));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ProfileError::InvalidPhoto(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ProfileError::InvalidPhoto("empty image".into()));
    }

    Ok((content_type.to_string(), bytes))
}

fn file_extension(content_type: &str) -> &str {
    match content_type.trim_start_matches("image/") {
        "jpg" | "jpeg" | "pjpeg" => "jpeg",
        other => other,
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BrokenProfileStore, MemoryPhotoStorage, MemoryProfileStore};

    fn profile(id: &str, name: &str, phone: &str) -> ProfileRecord {
        ProfileRecord {
            id: id.into(),
            name: name.into(),
            last_name: "Diaz".into(),
            email: format!("{id}@x.com"),
            phone: phone.into(),
            photo_url: None,
        }
    }

    async fn service_with_users() -> (ProfileService, Arc<MemoryProfileStore>, Arc<MemoryPhotoStorage>) {
        let store = Arc::new(MemoryProfileStore::new());
        store.put_profile(&profile("u1", "Ana", "3001111111")).await.unwrap();
        store.put_profile(&profile("u2", "Luis", "3002222222")).await.unwrap();
        let photos = Arc::new(MemoryPhotoStorage::new("https://cdn.example.com/photos"));
        let service = ProfileService::new(store.clone(), store.clone(), photos.clone());
        (service, store, photos)
    }

    #[tokio::test]
    async fn update_user_name_patches_profile() {
        let (service, _store, _photos) = service_with_users().await;
        service.update_user_name("u1", "Ana Maria", "Ruiz").await.unwrap();

        let profile = service.profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.name, "Ana Maria");
        assert_eq!(profile.last_name, "Ruiz");
    }

    #[tokio::test]
    async fn upload_profile_photo_stores_and_links() {
        let (service, _store, photos) = service_with_users().await;
        let url = service
            .upload_profile_photo("u1", "data:image/jpeg;base64,AQID")
            .await
            .unwrap();

        assert!(url.starts_with("https://cdn.example.com/photos/u1_profile_"));
        assert!(url.ends_with(".jpeg"));
        let object_name = url.rsplit('/').next().unwrap();
        assert_eq!(
            photos.object(object_name),
            Some(("image/jpeg".to_string(), vec![1, 2, 3]))
        );

        let profile = service.profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.photo_url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn upload_rejects_non_image_data() {
        let (service, _store, _photos) = service_with_users().await;
        for bad in [
            "AQID",
            "data:text/plain;base64,AQID",
            "data:image/jpeg,AQID",
            "data:image/jpeg;base64,%%%",
            "data:image/jpeg;base64,",
        ] {
            let err = service.upload_profile_photo("u1", bad).await.unwrap_err();
            assert!(matches!(err, ProfileError::InvalidPhoto(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn add_contact_by_phone_stores_contact() {
        let (service, _store, _photos) = service_with_users().await;
        let contact = service.add_contact_by_phone("u1", " 3002222222 ").await.unwrap();
        assert_eq!(contact.id, "u2");
        assert_eq!(contact.name, "Luis");
        assert_eq!(service.contacts("u1").await.unwrap(), vec![contact]);
        assert!(service.contacts("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_contact_error_cases() {
        let (service, _store, _photos) = service_with_users().await;

        let err = service.add_contact_by_phone("u1", "12345").await.unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPhone(_)));

        let err = service.add_contact_by_phone("u1", "3009999999").await.unwrap_err();
        assert!(matches!(err, ProfileError::ContactNotFound(_)));

        let err = service.add_contact_by_phone("u1", "3001111111").await.unwrap_err();
        assert!(matches!(err, ProfileError::SelfContact));

        service.add_contact_by_phone("u1", "3002222222").await.unwrap();
        let err = service.add_contact_by_phone("u1", "3002222222").await.unwrap_err();
        assert!(matches!(err, ProfileError::AlreadyAdded(name) if name == "Luis"));
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = Arc::new(MemoryProfileStore::new());
        let service = ProfileService::new(
            Arc::new(BrokenProfileStore),
            store,
            Arc::new(MemoryPhotoStorage::default()),
        );
        let err = service.update_user_name("u1", "a", "b").await.unwrap_err();
        assert!(matches!(err, ProfileError::Unavailable(_)));
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(file_extension("image/jpeg"), "jpeg");
        assert_eq!(file_extension("image/jpg"), "jpeg");
        assert_eq!(file_extension("image/png"), "png");
    }
}
