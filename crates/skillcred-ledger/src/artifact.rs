use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ArtifactError;
use crate::traits::ArtifactStore;

/// Default upper bound for a single artifact.
pub const DEFAULT_MAX_ARTIFACT_BYTES: usize = 16 * 1024 * 1024;

/// Content hash used as an artifact reference (BLAKE3, hex).
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// In-process content-addressed artifact store.
pub struct MemoryArtifactStore {
    blobs: DashMap<String, Vec<u8>>,
    max_bytes: usize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_ARTIFACT_BYTES)
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            blobs: DashMap::new(),
            max_bytes,
        }
    }

    /// Fetch stored bytes by content hash.
    pub fn get(&self, hash: &str) -> Option<Vec<u8>> {
        self.blobs.get(hash).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ArtifactError> {
        if bytes.len() > self.max_bytes {
            return Err(ArtifactError::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }
        let hash = content_hash(&bytes);
        self.blobs.entry(hash.clone()).or_insert(bytes);
        tracing::debug!(content_hash = %hash, "artifact stored");
        Ok(hash)
    }
}
