//! In-memory session store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::store::{AssetEntry, SessionStore, StoreError};
use super::types::{AssetState, ConversionSession};

/// Process-local store used when no Redis backend is configured. Nothing
/// expires; the janitor only reclaims files, not records.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, ConversionSession>,
    url_to_id: HashMap<String, String>,
    variants: HashMap<String, String>,
    assets: HashMap<String, AssetEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &ConversionSession) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists(session.id.clone()));
        }
        let mut stored = session.clone();
        stored.created_at = Utc::now();
        stored.updated_at = stored.created_at;
        inner.sessions.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn update_session(&self, session: &ConversionSession) -> Result<(), StoreError> {
        let mut inner = self.write();
        if !inner.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound(session.id.clone()));
        }
        let mut stored = session.clone();
        stored.updated_at = Utc::now();
        inner.sessions.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<ConversionSession, StoreError> {
        self.read()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.sessions.remove(id);
        inner.url_to_id.retain(|_, sid| sid != id);
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read().url_to_id.get(url).cloned())
    }

    async fn set_url_map(&self, url: &str, id: &str) -> Result<(), StoreError> {
        self.write().url_to_id.insert(url.to_string(), id.to_string());
        Ok(())
    }

    async fn set_variant(&self, variant_hash: &str, output_path: &str) -> Result<(), StoreError> {
        self.write()
            .variants
            .insert(variant_hash.to_string(), output_path.to_string());
        Ok(())
    }

    async fn get_variant(&self, variant_hash: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read().variants.get(variant_hash).cloned())
    }

    async fn set_asset(
        &self,
        asset_hash: &str,
        source_path: &str,
        state: AssetState,
    ) -> Result<(), StoreError> {
        self.write().assets.insert(
            asset_hash.to_string(),
            AssetEntry {
                source_path: source_path.to_string(),
                state,
            },
        );
        Ok(())
    }

    async fn get_asset(&self, asset_hash: &str) -> Result<Option<AssetEntry>, StoreError> {
        Ok(self.read().assets.get(asset_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let s = ConversionSession::new("https://youtu.be/a");
        store.create_session(&s).await.unwrap();
        let err = store.create_session(&s).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_missing_session_fails() {
        let store = MemoryStore::new();
        let s = ConversionSession::new("https://youtu.be/a");
        let err = store.update_session(&s).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_returns_a_copy() {
        let store = MemoryStore::new();
        let mut s = ConversionSession::new("https://youtu.be/a");
        store.create_session(&s).await.unwrap();

        let mut copy = store.get_session(&s.id).await.unwrap();
        copy.download_progress = 99;

        let fresh = store.get_session(&s.id).await.unwrap();
        assert_eq!(fresh.download_progress, 0);

        s.download_progress = 50;
        store.update_session(&s).await.unwrap();
        let fresh = store.get_session(&s.id).await.unwrap();
        assert_eq!(fresh.download_progress, 50);
    }

    #[tokio::test]
    async fn test_delete_removes_url_mapping() {
        let store = MemoryStore::new();
        let s = ConversionSession::new("https://youtu.be/a");
        store.create_session(&s).await.unwrap();
        store.set_url_map(&s.url, &s.id).await.unwrap();
        assert_eq!(store.find_by_url(&s.url).await.unwrap(), Some(s.id.clone()));

        store.delete_session(&s.id).await.unwrap();
        assert!(store.get_session(&s.id).await.is_err());
        assert_eq!(store.find_by_url(&s.url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_variant_and_asset_caches() {
        let store = MemoryStore::new();
        assert_eq!(store.get_variant("v1").await.unwrap(), None);
        store.set_variant("v1", "/out/v1.mp3").await.unwrap();
        assert_eq!(
            store.get_variant("v1").await.unwrap(),
            Some("/out/v1.mp3".to_string())
        );

        assert_eq!(store.get_asset("a1").await.unwrap(), None);
        store.set_asset("a1", "", AssetState::Preparing).await.unwrap();
        let entry = store.get_asset("a1").await.unwrap().unwrap();
        assert_eq!(entry.state, AssetState::Preparing);
        assert!(entry.source_path.is_empty());

        store
            .set_asset("a1", "/streams/a1.source", AssetState::Downloaded)
            .await
            .unwrap();
        let entry = store.get_asset("a1").await.unwrap().unwrap();
        assert_eq!(entry.state, AssetState::Downloaded);
        assert_eq!(entry.source_path, "/streams/a1.source");
    }
}
