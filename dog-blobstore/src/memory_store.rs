use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    BlobError, BlobResult, ByteRange, GetResult, ObjectEntry, PartDescriptor, PutResult,
    StorageBackend, UploadId, MIN_MULTIPART_SIZE,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    content_type: Option<String>,
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
}

/// In-process object store with S3-like multipart rules.
///
/// Non-final parts smaller than the configured minimum are rejected on
/// complete, as S3 does, so the single-put fallback is exercised for real.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    min_part_size: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            min_part_size: MIN_MULTIPART_SIZE,
        }
    }

    /// Override the minimum size of a non-final part
    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = bytes;
        self
    }

    /// Multipart sessions that were neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map_or(0, |objects| objects.len())
    }

    fn new_etag() -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn no_such_upload(operation: &'static str, upload_id: &UploadId) -> BlobError {
        BlobError::backend(operation, format!("NoSuchUpload: {upload_id}"))
    }

    fn store(&self, bucket: &str, key: &str, object: StoredObject) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> BlobResult<UploadId> {
        let upload_id = UploadId::new();
        self.state.lock().uploads.insert(
            upload_id.as_str().to_string(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.map(str::to_string),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String> {
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(upload_id.as_str())
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| Self::no_such_upload("upload_part", upload_id))?;

        let etag = Self::new_etag();
        upload.parts.insert(part_number, (data, etag.clone()));
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartDescriptor],
    ) -> BlobResult<PutResult> {
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get(upload_id.as_str())
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| Self::no_such_upload("complete_multipart", upload_id))?;

        if parts.is_empty() {
            return Err(BlobError::backend(
                "complete_multipart",
                "MalformedXML: at least one part is required",
            ));
        }

        let mut body = BytesMut::new();
        let mut previous = 0;
        for (index, part) in parts.iter().enumerate() {
            if part.part_number <= previous {
                return Err(BlobError::backend(
                    "complete_multipart",
                    format!("InvalidPartOrder: part {} out of order", part.part_number),
                ));
            }
            previous = part.part_number;

            let (data, etag) = upload.parts.get(&part.part_number).ok_or_else(|| {
                BlobError::backend(
                    "complete_multipart",
                    format!("InvalidPart: part {} was not uploaded", part.part_number),
                )
            })?;
            if *etag != part.tag {
                return Err(BlobError::backend(
                    "complete_multipart",
                    format!("InvalidPart: tag mismatch for part {}", part.part_number),
                ));
            }
            let is_last = index + 1 == parts.len();
            if !is_last && (data.len() as u64) < self.min_part_size {
                return Err(BlobError::backend(
                    "complete_multipart",
                    format!(
                        "EntityTooSmall: part {} is {} bytes, minimum is {}",
                        part.part_number,
                        data.len(),
                        self.min_part_size
                    ),
                ));
            }
            body.extend_from_slice(data);
        }

        let content_type = upload.content_type.clone();
        state.uploads.remove(upload_id.as_str());

        let data = body.freeze();
        let size_bytes = data.len() as u64;
        let etag = format!("{}-{}", Self::new_etag(), parts.len());
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data,
                    content_type,
                    etag: etag.clone(),
                    last_modified: Utc::now(),
                },
            );

        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn abort_multipart(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &UploadId,
    ) -> BlobResult<()> {
        self.state
            .lock()
            .uploads
            .remove(upload_id.as_str())
            .map(|_| ())
            .ok_or_else(|| Self::no_such_upload("abort_multipart", upload_id))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        content_length: u64,
    ) -> BlobResult<PutResult> {
        if data.len() as u64 != content_length {
            return Err(BlobError::backend(
                "put_object",
                format!(
                    "content length {} does not match body of {} bytes",
                    content_length,
                    data.len()
                ),
            ));
        }

        let etag = Self::new_etag();
        self.store(
            bucket,
            key,
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );

        Ok(PutResult {
            etag: Some(etag),
            size_bytes: content_length,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BlobResult<GetResult> {
        let object = self
            .state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| BlobError::not_found(bucket, key))?;

        let size = object.data.len() as u64;
        let data = match range {
            None => object.data,
            Some(r) => {
                if r.start >= size || r.end < r.start {
                    return Err(BlobError::RangeNotSatisfiable {
                        key: key.to_string(),
                        start: r.start,
                        end: r.end,
                    });
                }
                let end = r.end.min(size - 1);
                object.data.slice(r.start as usize..=end as usize)
            }
        };

        let content_length = data.len() as u64;
        let stream = futures_util::stream::iter(std::iter::once(Ok::<_, std::io::Error>(data)));

        Ok(GetResult {
            stream: Box::pin(stream),
            content_length: Some(content_length),
            content_type: object.content_type,
            etag: Some(object.etag),
            range,
        })
    }

    async fn list_objects(&self, bucket: &str) -> BlobResult<Vec<ObjectEntry>> {
        let state = self.state.lock();
        let Some(objects) = state.buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        Ok(objects
            .iter()
            .map(|(key, object)| ObjectEntry {
                key: key.clone(),
                size_bytes: object.data.len() as u64,
                content_type: object.content_type.clone(),
                location_hint: format!("memory://{bucket}/{key}"),
                etag: Some(object.etag.clone()),
                last_modified: Some(object.last_modified),
            })
            .collect())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        if let Some(objects) = self.state.lock().buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use futures_util::StreamExt;

    async fn read_all(result: GetResult) -> Vec<u8> {
        let mut stream = result.stream;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn multipart_commit_concatenates_parts_in_order() {
        let store = MemoryStore::new().with_min_part_size(2);
        let id = store.initiate_multipart("b", "k", Some("text/plain")).await.unwrap();

        let tag2 = store.upload_part("b", "k", &id, 2, Bytes::from_static(b"cd")).await.unwrap();
        let tag1 = store.upload_part("b", "k", &id, 1, Bytes::from_static(b"ab")).await.unwrap();

        let parts = vec![
            PartDescriptor { part_number: 1, length: 2, tag: tag1 },
            PartDescriptor { part_number: 2, length: 2, tag: tag2 },
        ];
        let result = store.complete_multipart("b", "k", &id, &parts).await.unwrap();
        assert_eq!(result.size_bytes, 4);
        assert_eq!(store.pending_uploads(), 0);

        let got = store.get_object("b", "k", None).await.unwrap();
        assert_eq!(got.content_type.as_deref(), Some("text/plain"));
        assert_eq!(read_all(got).await, b"abcd");
    }

    #[tokio::test]
    async fn rejects_small_non_final_parts() {
        let store = MemoryStore::new().with_min_part_size(4);
        let id = store.initiate_multipart("b", "k", None).await.unwrap();
        let tag1 = store.upload_part("b", "k", &id, 1, Bytes::from_static(b"ab")).await.unwrap();
        let tag2 = store.upload_part("b", "k", &id, 2, Bytes::from_static(b"cd")).await.unwrap();

        let parts = vec![
            PartDescriptor { part_number: 1, length: 2, tag: tag1 },
            PartDescriptor { part_number: 2, length: 2, tag: tag2 },
        ];
        let err = store.complete_multipart("b", "k", &id, &parts).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("EntityTooSmall"));
    }

    #[tokio::test]
    async fn ranged_reads_are_inclusive_and_clamped() {
        let store = MemoryStore::new();
        store
            .put_object("b", "k", Bytes::from_static(b"0123456789"), None, 10)
            .await
            .unwrap();

        let got = store.get_object("b", "k", Some(ByteRange::new(2, 4))).await.unwrap();
        assert_eq!(got.content_length, Some(3));
        assert_eq!(read_all(got).await, b"234");

        let tail = store.get_object("b", "k", Some(ByteRange::new(8, 100))).await.unwrap();
        assert_eq!(read_all(tail).await, b"89");

        let err = store
            .get_object("b", "k", Some(ByteRange::new(10, 12)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RangeNotSatisfiable);
    }

    #[tokio::test]
    async fn abort_discards_session() {
        let store = MemoryStore::new();
        let id = store.initiate_multipart("b", "k", None).await.unwrap();
        store.upload_part("b", "k", &id, 1, Bytes::from_static(b"x")).await.unwrap();
        store.abort_multipart("b", "k", &id).await.unwrap();

        assert_eq!(store.pending_uploads(), 0);
        assert_eq!(store.object_count("b"), 0);
        assert!(store.abort_multipart("b", "k", &id).await.is_err());
    }

    #[tokio::test]
    async fn missing_objects() {
        let store = MemoryStore::new();
        let err = store.get_object("b", "nope", None).await.unwrap_err();
        assert!(err.is_not_found());
        store.delete_object("b", "nope").await.unwrap();
        assert!(store.list_objects("b").await.unwrap().is_empty());
    }
}
