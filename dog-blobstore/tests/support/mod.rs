#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use dog_blobstore::{
    BlobError, BlobResult, ByteRange, ByteStream, GetResult, MemoryStore, ObjectEntry,
    PartDescriptor, PutResult, StorageBackend, UploadId,
};

/// One backend call, as seen by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initiate,
    UploadPart { part_number: u32, length: usize },
    Complete { part_numbers: Vec<u32> },
    Abort,
    Put { length: u64 },
    Get { range: Option<ByteRange> },
    List,
    Delete,
}

#[derive(Debug, Default)]
pub struct Failures {
    pub upload_part_at: Option<u32>,
    pub complete: bool,
    pub abort: bool,
    pub put: bool,
    /// Report NotFound from delete, as some backends do for missing keys
    pub delete_not_found: bool,
}

/// Wraps a [`MemoryStore`], recording every call and failing on request
#[derive(Clone)]
pub struct RecordingBackend {
    pub inner: MemoryStore,
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<Failures>>,
}

impl RecordingBackend {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Failures::default())),
        }
    }

    pub fn fail(&self, configure: impl FnOnce(&mut Failures)) {
        configure(&mut self.failures.lock());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn aborts(&self) -> usize {
        self.count(|c| matches!(c, Call::Abort))
    }

    pub fn completes(&self) -> usize {
        self.count(|c| matches!(c, Call::Complete { .. }))
    }

    pub fn puts(&self) -> usize {
        self.count(|c| matches!(c, Call::Put { .. }))
    }

    pub fn uploaded_parts(&self) -> Vec<(u32, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::UploadPart { part_number, length } => Some((*part_number, *length)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

fn injected(operation: &'static str) -> BlobError {
    BlobError::backend(operation, format!("injected {operation} failure"))
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> BlobResult<UploadId> {
        self.record(Call::Initiate);
        self.inner.initiate_multipart(bucket, key, content_type).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String> {
        self.record(Call::UploadPart {
            part_number,
            length: data.len(),
        });
        if self.failures.lock().upload_part_at == Some(part_number) {
            return Err(injected("upload_part"));
        }
        self.inner
            .upload_part(bucket, key, upload_id, part_number, data)
            .await
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartDescriptor],
    ) -> BlobResult<PutResult> {
        self.record(Call::Complete {
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.failures.lock().complete {
            return Err(injected("complete_multipart"));
        }
        self.inner
            .complete_multipart(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
    ) -> BlobResult<()> {
        self.record(Call::Abort);
        if self.failures.lock().abort {
            return Err(injected("abort_multipart"));
        }
        self.inner.abort_multipart(bucket, key, upload_id).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        content_length: u64,
    ) -> BlobResult<PutResult> {
        self.record(Call::Put {
            length: content_length,
        });
        if self.failures.lock().put {
            return Err(injected("put_object"));
        }
        self.inner
            .put_object(bucket, key, data, content_type, content_length)
            .await
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BlobResult<GetResult> {
        self.record(Call::Get { range });
        self.inner.get_object(bucket, key, range).await
    }

    async fn list_objects(&self, bucket: &str) -> BlobResult<Vec<ObjectEntry>> {
        self.record(Call::List);
        self.inner.list_objects(bucket).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        self.record(Call::Delete);
        if self.failures.lock().delete_not_found {
            return Err(BlobError::not_found(bucket, key));
        }
        self.inner.delete_object(bucket, key).await
    }
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Stream `data` in items of `item_size` bytes
pub fn stream_of(data: &[u8], item_size: usize) -> ByteStream {
    let items: Vec<std::io::Result<Bytes>> = data
        .chunks(item_size.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures_util::stream::iter(items))
}

/// Stream `data`, then fail with an I/O error
pub fn failing_stream_after(data: &[u8]) -> ByteStream {
    let items: Vec<std::io::Result<Bytes>> = vec![
        Ok(Bytes::copy_from_slice(data)),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        )),
    ];
    Box::pin(futures_util::stream::iter(items))
}

/// Read a ranged or full result to the end
pub async fn read_all(result: GetResult) -> Vec<u8> {
    use futures_util::StreamExt;

    let mut stream = result.stream;
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}
