use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BlobIdentity, UploadId};

/// Receipt returned after successfully storing a blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutReceipt {
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub upload: UploadInfo,
}

/// How the blob reached the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum UploadInfo {
    /// One put request (the multipart session was opened and aborted)
    Single,
    /// Multipart upload committed from `parts` parts
    Multipart {
        upload_id: UploadId,
        part_size: u64,
        parts: u32,
    },
}

impl PutReceipt {
    pub fn new(identity: BlobIdentity, size_bytes: u64, upload: UploadInfo) -> Self {
        Self {
            bucket: identity.bucket,
            key: identity.key,
            size_bytes,
            content_type: None,
            etag: None,
            created_at: Utc::now(),
            upload,
        }
    }

    /// Set content type
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set etag
    pub fn with_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.upload, UploadInfo::Multipart { .. })
    }
}
