use std::sync::Arc;

use tracing::debug;

use crate::{BlobIdentity, BlobResult, ByteRange, GetResult, StorageBackend};

/// Turns `start:end` range text into a full or ranged backend read
pub struct RangeReader {
    backend: Arc<dyn StorageBackend>,
}

impl RangeReader {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Read `bucket/key`, restricted to `range_text` when it is present and
    /// non-empty. Malformed range text fails before the backend is called.
    pub async fn get(
        &self,
        bucket: &str,
        key: &str,
        range_text: Option<&str>,
    ) -> BlobResult<GetResult> {
        let identity = BlobIdentity::new(bucket, key)?;
        let range = ByteRange::parse_optional(range_text)?;
        self.get_range(&identity, range).await
    }

    /// Read with an already parsed range
    pub async fn get_range(
        &self,
        identity: &BlobIdentity,
        range: Option<ByteRange>,
    ) -> BlobResult<GetResult> {
        debug!(
            backend = self.backend.name(),
            blob = %identity,
            range = ?range,
            "reading blob"
        );
        self.backend
            .get_object(&identity.bucket, &identity.key, range)
            .await
    }
}
