use std::sync::Arc;

use crate::{
    BlobConfig, BlobMetadata, BlobResult, ByteStream, Deleter, GetResult, Lister, PutReceipt,
    RangeReader, StorageBackend, UploadCoordinator,
};

/// The blob facade services embed: streaming put, ranged get, list and delete
/// over a single storage backend.
pub struct BlobAdapter {
    backend: Arc<dyn StorageBackend>,
    uploads: UploadCoordinator,
    reader: RangeReader,
    lister: Lister,
    deleter: Deleter,
    config: BlobConfig,
}

impl BlobAdapter {
    /// Create a new blob adapter
    pub fn new<S: StorageBackend + 'static>(store: S, config: BlobConfig) -> BlobResult<Self> {
        Self::with_backend(Arc::new(store), config)
    }

    /// Create from a backend that is already shared
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: BlobConfig) -> BlobResult<Self> {
        Ok(Self {
            uploads: UploadCoordinator::new(Arc::clone(&backend), config.upload_rules.clone())?,
            reader: RangeReader::new(Arc::clone(&backend)),
            lister: Lister::new(Arc::clone(&backend)),
            deleter: Deleter::new(Arc::clone(&backend)),
            backend,
            config,
        })
    }

    /// Store a blob from a stream, choosing single put or multipart from the
    /// number of bytes the stream actually yields
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Option<ByteStream>,
        content_type: Option<&str>,
    ) -> BlobResult<PutReceipt> {
        self.uploads.put(bucket, key, body, content_type).await
    }

    /// Open a blob for reading; `range` is `start:end` text, inclusive
    pub async fn get(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&str>,
    ) -> BlobResult<GetResult> {
        self.reader.get(bucket, key, range).await
    }

    /// List every blob in a bucket
    pub async fn list(&self, bucket: &str) -> BlobResult<Vec<BlobMetadata>> {
        self.lister.list(bucket).await
    }

    /// Delete a blob
    pub async fn delete(&self, bucket: &str, key: &str) -> BlobResult<()> {
        self.deleter.delete(bucket, key).await
    }

    /// Get configuration
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
