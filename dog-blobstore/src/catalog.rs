use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{BlobError, BlobIdentity, BlobResult, ObjectEntry, StorageBackend};

/// Content type reported when the backend has none on record
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Listing record for a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub key: String,
    pub content_length: u64,
    pub content_type: String,
    pub location_hint: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<ObjectEntry> for BlobMetadata {
    fn from(entry: ObjectEntry) -> Self {
        Self {
            key: entry.key,
            content_length: entry.size_bytes,
            content_type: entry
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            location_hint: entry.location_hint,
            etag: entry.etag,
            last_modified: entry.last_modified,
        }
    }
}

/// Enumerates a bucket from the backend's metadata-only listing
pub struct Lister {
    backend: Arc<dyn StorageBackend>,
}

impl Lister {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn list(&self, bucket: &str) -> BlobResult<Vec<BlobMetadata>> {
        if bucket.trim().is_empty() {
            return Err(BlobError::invalid_input("bucket must not be empty"));
        }

        let entries = self.backend.list_objects(bucket).await?;
        debug!(
            backend = self.backend.name(),
            bucket,
            count = entries.len(),
            "listed bucket"
        );
        Ok(entries.into_iter().map(BlobMetadata::from).collect())
    }
}

/// Removes blobs. Deleting a key that does not exist is not an error.
pub struct Deleter {
    backend: Arc<dyn StorageBackend>,
}

impl Deleter {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()> {
        let identity = BlobIdentity::new(bucket, key)?;

        match self
            .backend
            .delete_object(&identity.bucket, &identity.key)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(blob = %identity, "delete of missing blob treated as success");
            }
            Err(err) => return Err(err),
        }

        info!(backend = self.backend.name(), blob = %identity, "blob deleted");
        Ok(())
    }
}
