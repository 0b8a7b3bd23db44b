use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{BlobResult, ByteRange, ByteStream, PartDescriptor, UploadId};

/// Object store primitives consumed by the upload and retrieval engine.
///
/// Every backend (S3-compatible, filesystem, in-memory) implements this one
/// contract; the orchestration in [`crate::UploadCoordinator`] and
/// [`crate::RangeReader`] never depends on which one it is talking to.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in log events
    fn name(&self) -> &'static str;

    /// Open a multipart upload session for `bucket/key`
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> BlobResult<UploadId>;

    /// Upload one part and return the tag the backend assigned to it
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String>;

    /// Commit the session from its parts, in ascending part-number order
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartDescriptor],
    ) -> BlobResult<PutResult>;

    /// Discard the session and any parts uploaded so far
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &UploadId)
        -> BlobResult<()>;

    /// Store a whole object in one request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        content_length: u64,
    ) -> BlobResult<PutResult>;

    /// Read an object, optionally restricted to an inclusive byte range
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BlobResult<GetResult>;

    /// Metadata-only listing of every object in the bucket
    async fn list_objects(&self, bucket: &str) -> BlobResult<Vec<ObjectEntry>>;

    /// Delete an object; deleting a missing key succeeds
    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()>;
}

/// Result of a successful put or multipart commit
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Result of a get operation
pub struct GetResult {
    pub stream: ByteStream,
    /// Length of the returned content (the range length for ranged reads)
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub range: Option<ByteRange>,
}

impl std::fmt::Debug for GetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetResult")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// One entry of a metadata-only listing
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub location_hint: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}
