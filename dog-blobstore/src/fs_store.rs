//! Local filesystem backend.
//!
//! Layout under the root directory:
//! ```text
//! {root}/
//!   objects/{bucket}/{key}          object bodies
//!   meta/{bucket}/{key}.json        content type and etag sidecars
//!   uploads/{upload_id}/            in-flight multipart sessions
//!     session.json
//!     part-000001
//!     part-000001.etag
//!   tmp/                            staging for atomic writes
//! ```
//! Multipart uploads are staged as one file per part and assembled in part
//! order on complete; abort removes the session directory.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    BlobError, BlobResult, ByteRange, GetResult, ObjectEntry, PartDescriptor, PutResult,
    StorageBackend, UploadId,
};

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: Option<String>,
    etag: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionManifest {
    bucket: String,
    key: String,
    content_type: Option<String>,
}

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> BlobResult<PathBuf> {
        Ok(self
            .root
            .join("objects")
            .join(safe_segment(bucket)?)
            .join(safe_relative(key)?))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> BlobResult<PathBuf> {
        Ok(self
            .root
            .join("meta")
            .join(safe_segment(bucket)?)
            .join(format!("{}.json", safe_relative(key)?.display())))
    }

    fn session_dir(&self, upload_id: &UploadId) -> BlobResult<PathBuf> {
        Ok(self.root.join("uploads").join(safe_segment(upload_id.as_str())?))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{part_number:06}"))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join("tmp").join(Uuid::new_v4().simple().to_string())
    }

    async fn load_session(
        &self,
        operation: &'static str,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
    ) -> BlobResult<(PathBuf, SessionManifest)> {
        let dir = self.session_dir(upload_id)?;
        let raw = match fs::read(dir.join("session.json")).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(no_such_upload(operation, upload_id));
            }
            Err(e) => return Err(BlobError::backend(operation, e)),
        };
        let manifest: SessionManifest =
            serde_json::from_slice(&raw).map_err(|e| BlobError::backend(operation, e))?;
        if manifest.bucket != bucket || manifest.key != key {
            return Err(no_such_upload(operation, upload_id));
        }
        Ok((dir, manifest))
    }

    async fn write_meta(
        &self,
        operation: &'static str,
        bucket: &str,
        key: &str,
        meta: &ObjectMeta,
    ) -> BlobResult<()> {
        let path = self.meta_path(bucket, key)?;
        ensure_parent(operation, &path).await?;
        let raw = serde_json::to_vec(meta).map_err(|e| BlobError::backend(operation, e))?;
        fs::write(&path, raw)
            .await
            .map_err(|e| BlobError::backend(operation, e))
    }

    async fn read_meta(&self, bucket: &str, key: &str) -> Option<ObjectMeta> {
        let path = self.meta_path(bucket, key).ok()?;
        let raw = fs::read(path).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Move a fully written temp file into place. The temp file is removed
    /// when the move fails.
    async fn publish(
        &self,
        operation: &'static str,
        temp: &Path,
        bucket: &str,
        key: &str,
    ) -> BlobResult<()> {
        let result = self.place(operation, temp, bucket, key).await;
        if result.is_err() {
            let _ = fs::remove_file(temp).await;
        }
        result
    }

    async fn place(
        &self,
        operation: &'static str,
        temp: &Path,
        bucket: &str,
        key: &str,
    ) -> BlobResult<()> {
        let target = self.object_path(bucket, key)?;
        if let Err(e) = ensure_parent(operation, &target).await {
            if self.nested_under_object(&target).await {
                return Err(BlobError::invalid_input(format!(
                    "key '{key}' is nested under an existing object"
                )));
            }
            return Err(e);
        }
        if is_dir(&target).await {
            return Err(BlobError::invalid_input(format!(
                "key '{key}' is a prefix of existing keys"
            )));
        }
        fs::rename(temp, &target)
            .await
            .map_err(|e| BlobError::backend(operation, e))
    }

    /// True when some parent of `target` inside the store is a regular file
    async fn nested_under_object(&self, target: &Path) -> bool {
        for ancestor in target.ancestors().skip(1) {
            if !ancestor.starts_with(&self.root) {
                break;
            }
            if let Ok(meta) = fs::metadata(ancestor).await {
                if meta.is_file() {
                    return true;
                }
            }
        }
        false
    }

    /// Concatenate the staged parts into `temp` in order, checking each
    /// part's tag and length. Returns the assembled size.
    async fn assemble(
        &self,
        dir: &Path,
        parts: &[PartDescriptor],
        temp: &Path,
    ) -> BlobResult<u64> {
        const OP: &str = "complete_multipart";

        let mut assembled = fs::File::create(temp)
            .await
            .map_err(|e| BlobError::backend(OP, e))?;

        let mut size_bytes = 0u64;
        let mut previous = 0;
        for part in parts {
            if part.part_number <= previous {
                return Err(BlobError::backend(
                    OP,
                    format!("InvalidPartOrder: part {} out of order", part.part_number),
                ));
            }
            previous = part.part_number;

            let path = Self::part_path(dir, part.part_number);
            let stored_tag = fs::read_to_string(tag_path(&path)).await.map_err(|e| {
                BlobError::backend(
                    OP,
                    format!("InvalidPart: part {} unavailable: {e}", part.part_number),
                )
            })?;
            if stored_tag != part.tag {
                return Err(BlobError::backend(
                    OP,
                    format!("InvalidPart: tag mismatch for part {}", part.part_number),
                ));
            }

            let mut source = fs::File::open(&path).await.map_err(|e| {
                BlobError::backend(
                    OP,
                    format!("InvalidPart: part {} unavailable: {e}", part.part_number),
                )
            })?;
            let copied = tokio::io::copy(&mut source, &mut assembled)
                .await
                .map_err(|e| BlobError::backend(OP, e))?;
            if copied != part.length {
                return Err(BlobError::backend(
                    OP,
                    format!(
                        "part {} holds {copied} bytes, expected {}",
                        part.part_number, part.length
                    ),
                ));
            }
            size_bytes += copied;
        }
        assembled
            .flush()
            .await
            .map_err(|e| BlobError::backend(OP, e))?;
        Ok(size_bytes)
    }
}

/// A single path segment with no separators or relative components
fn safe_segment(name: &str) -> BlobResult<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(BlobError::invalid_input(format!(
            "'{name}' is not a valid name for this store"
        )));
    }
    Ok(name)
}

/// A relative path made only of normal components
fn safe_relative(key: &str) -> BlobResult<PathBuf> {
    let path = Path::new(key);
    let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    if key.is_empty() || !normal || key.ends_with('/') || key.contains('\\') {
        return Err(BlobError::invalid_input(format!(
            "key '{key}' is not a valid path for this store"
        )));
    }
    Ok(path.to_path_buf())
}

fn no_such_upload(operation: &'static str, upload_id: &UploadId) -> BlobError {
    BlobError::backend(operation, format!("NoSuchUpload: {upload_id}"))
}

async fn ensure_parent(operation: &'static str, path: &Path) -> BlobResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BlobError::backend(operation, e))?;
    }
    Ok(())
}

/// Sidecar holding the tag returned for a staged part
fn tag_path(part: &Path) -> PathBuf {
    part.with_extension("etag")
}

async fn is_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn new_etag() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl StorageBackend for FsStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> BlobResult<UploadId> {
        // Validate before anything touches the disk
        self.object_path(bucket, key)?;

        let upload_id = UploadId::new();
        let dir = self.session_dir(&upload_id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| BlobError::backend("initiate_multipart", e))?;

        let manifest = SessionManifest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.map(str::to_string),
        };
        let raw = serde_json::to_vec(&manifest)
            .map_err(|e| BlobError::backend("initiate_multipart", e))?;
        fs::write(dir.join("session.json"), raw)
            .await
            .map_err(|e| BlobError::backend("initiate_multipart", e))?;

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
        let (dir, _) = self
            .load_session("upload_part", bucket, key, upload_id)
            .await?;
        let path = Self::part_path(&dir, part_number);
        fs::write(&path, &data)
            .await
            .map_err(|e| BlobError::backend("upload_part", e))?;

        let tag = new_etag();
        fs::write(tag_path(&path), &tag)
            .await
            .map_err(|e| BlobError::backend("upload_part", e))?;
        Ok(tag)
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartDescriptor],
    ) -> BlobResult<PutResult> {
        const OP: &str = "complete_multipart";

        let (dir, manifest) = self.load_session(OP, bucket, key, upload_id).await?;
        if parts.is_empty() {
            return Err(BlobError::backend(OP, "at least one part is required"));
        }

        let temp = self.temp_path();
        ensure_parent(OP, &temp).await?;
        let size_bytes = match self.assemble(&dir, parts, &temp).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                return Err(e);
            }
        };

        self.publish(OP, &temp, bucket, key).await?;

        let etag = format!("{}-{}", new_etag(), parts.len());
        self.write_meta(
            OP,
            bucket,
            key,
            &ObjectMeta {
                content_type: manifest.content_type,
                etag: etag.clone(),
            },
        )
        .await?;

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| BlobError::backend(OP, e))?;

        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
    ) -> BlobResult<()> {
        let (dir, _) = self
            .load_session("abort_multipart", bucket, key, upload_id)
            .await?;
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| BlobError::backend("abort_multipart", e))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        content_length: u64,
    ) -> BlobResult<PutResult> {
        const OP: &str = "put_object";

        self.object_path(bucket, key)?;
        if data.len() as u64 != content_length {
            return Err(BlobError::backend(
                OP,
                format!(
                    "content length {content_length} does not match body of {} bytes",
                    data.len()
                ),
            ));
        }

        let temp = self.temp_path();
        ensure_parent(OP, &temp).await?;
        if let Err(e) = fs::write(&temp, &data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(BlobError::backend(OP, e));
        }
        self.publish(OP, &temp, bucket, key).await?;

        let etag = new_etag();
        self.write_meta(
            OP,
            bucket,
            key,
            &ObjectMeta {
                content_type: content_type.map(str::to_string),
                etag: etag.clone(),
            },
        )
        .await?;

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
        const OP: &str = "get_object";

        let path = self.object_path(bucket, key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::not_found(bucket, key));
            }
            Err(e) => return Err(BlobError::backend(OP, e)),
        };
        let info = file
            .metadata()
            .await
            .map_err(|e| BlobError::backend(OP, e))?;
        // A directory here is a key prefix, not an object
        if !info.is_file() {
            return Err(BlobError::not_found(bucket, key));
        }
        let size = info.len();

        let length = match range {
            None => size,
            Some(r) => {
                if r.start >= size || r.end < r.start {
                    return Err(BlobError::RangeNotSatisfiable {
                        key: key.to_string(),
                        start: r.start,
                        end: r.end,
                    });
                }
                file.seek(SeekFrom::Start(r.start))
                    .await
                    .map_err(|e| BlobError::backend(OP, e))?;
                r.end.min(size - 1) - r.start + 1
            }
        };

        let meta = self.read_meta(bucket, key).await;
        let stream = ReaderStream::new(file.take(length));

        Ok(GetResult {
            stream: Box::pin(stream),
            content_length: Some(length),
            content_type: meta.as_ref().and_then(|m| m.content_type.clone()),
            etag: meta.map(|m| m.etag),
            range,
        })
    }

    async fn list_objects(&self, bucket: &str) -> BlobResult<Vec<ObjectEntry>> {
        const OP: &str = "list_objects";

        let base = self.root.join("objects").join(safe_segment(bucket)?);
        let mut entries = Vec::new();
        let mut pending = vec![(base.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BlobError::backend(OP, e)),
            };

            while let Some(item) = reader
                .next_entry()
                .await
                .map_err(|e| BlobError::backend(OP, e))?
            {
                let name = item.file_name().to_string_lossy().into_owned();
                let key = format!("{prefix}{name}");
                let file_type = item
                    .file_type()
                    .await
                    .map_err(|e| BlobError::backend(OP, e))?;

                if file_type.is_dir() {
                    pending.push((item.path(), format!("{key}/")));
                    continue;
                }

                let info = item
                    .metadata()
                    .await
                    .map_err(|e| BlobError::backend(OP, e))?;
                let meta = self.read_meta(bucket, &key).await;
                entries.push(ObjectEntry {
                    location_hint: format!("file://{}", item.path().display()),
                    size_bytes: info.len(),
                    content_type: meta.as_ref().and_then(|m| m.content_type.clone()),
                    etag: meta.map(|m| m.etag),
                    last_modified: info.modified().ok().map(DateTime::<Utc>::from),
                    key,
                });
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        const OP: &str = "delete_object";

        for path in [self.object_path(bucket, key)?, self.meta_path(bucket, key)?] {
            if is_dir(&path).await {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BlobError::backend(OP, e)),
            }
        }
        Ok(())
    }
}
