//! In-memory artifact store.
//!
//! Backs tests and local development. Signed URLs carry their expiry and a
//! random token; [`MemoryArtifactStore::resolve_signed_url`] is the read
//! side that enforces the TTL.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::RwLock;

use crate::{ArtifactStore, StorageError};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Clone)]
struct SignedGrant {
    key: String,
    expires_at: DateTime<Utc>,
}

/// Process-local artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    grants: RwLock<HashMap<String, SignedGrant>>,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for a key, if present.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Read through a signed URL, honoring its TTL. Expired or unknown
    /// grants return `None`.
    pub async fn resolve_signed_url(&self, url: &str) -> Option<Vec<u8>> {
        let token = url.rsplit('/').next()?;
        let grants = self.grants.read().await;
        let grant = grants.get(token)?;
        if grant.expires_at <= Utc::now() {
            return None;
        }
        let key = grant.key.clone();
        drop(grants);
        self.objects.read().await.get(&key).map(|o| o.bytes.clone())
    }
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.read().await.get(key).map(|o| o.bytes.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String, StorageError> {
        if !self.objects.read().await.contains_key(key) {
            return Err(StorageError::Backend(format!("no such key: {key}")));
        }
        let mut token_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);
        self.grants.write().await.insert(
            token.clone(),
            SignedGrant {
                key: key.to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs as i64),
            },
        );
        Ok(format!("memory://signed/{token}"))
    }
}
