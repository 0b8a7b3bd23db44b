use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    chunker::StreamChunker, BlobError, BlobIdentity, BlobResult, ByteStream, PartDescriptor,
    PutReceipt, StorageBackend, UploadInfo, UploadRules, UploadSession,
};

/// What was left once the source stream ran dry
enum Staged {
    /// No full part was uploaded and the whole object is below the multipart
    /// minimum; it has to go through a single put instead.
    Small(Bytes),
    /// Every byte is in an uploaded part and the session can be committed
    Parts,
}

/// Decides between single put and multipart, and drives the multipart session
/// from open to exactly one of complete or abort.
pub struct UploadCoordinator {
    backend: Arc<dyn StorageBackend>,
    rules: UploadRules,
}

impl UploadCoordinator {
    pub fn new(backend: Arc<dyn StorageBackend>, rules: UploadRules) -> BlobResult<Self> {
        rules.validate()?;
        Ok(Self { backend, rules })
    }

    /// Store `source` under `bucket/key`.
    ///
    /// The source is consumed part by part and is dropped before this returns,
    /// whatever the outcome. On failure after the session was opened the
    /// session is aborted and the original error is returned.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        source: Option<ByteStream>,
        content_type: Option<&str>,
    ) -> BlobResult<PutReceipt> {
        let identity = BlobIdentity::new(bucket, key)?;
        let source =
            source.ok_or_else(|| BlobError::invalid_input("no content stream provided"))?;
        let mut chunker = StreamChunker::new(source);

        let upload_id = self
            .backend
            .initiate_multipart(&identity.bucket, &identity.key, content_type)
            .await?;
        debug!(
            backend = self.backend.name(),
            blob = %identity,
            upload_id = %upload_id,
            "multipart session opened"
        );
        let mut session = UploadSession::new(identity, upload_id);

        let staged = self.stage_parts(&mut session, &mut chunker).await;
        drop(chunker);
        let staged = match staged {
            Ok(staged) => staged,
            Err(err) => return Err(self.abort_after_failure(&mut session, err).await),
        };

        let receipt = match staged {
            Staged::Small(data) => self.put_single(&mut session, data, content_type).await?,
            Staged::Parts => match self.commit(&mut session).await {
                Ok(receipt) => receipt,
                Err(err) => return Err(self.abort_after_failure(&mut session, err).await),
            },
        };

        let receipt = match content_type {
            Some(ct) => receipt.with_content_type(ct),
            None => receipt,
        };

        info!(
            backend = self.backend.name(),
            blob = %session.identity(),
            size_bytes = receipt.size_bytes,
            multipart = receipt.is_multipart(),
            "blob stored"
        );
        Ok(receipt)
    }

    /// Pull parts from the chunker and upload every full part, keeping at most
    /// `part_concurrency` uploads in flight. Dropping the in-flight set on an
    /// error cancels the uploads that have not finished.
    async fn stage_parts(
        &self,
        session: &mut UploadSession,
        chunker: &mut StreamChunker,
    ) -> BlobResult<Staged> {
        let part_size = self.rules.part_size as usize;
        let limit = self.rules.part_concurrency;
        let mut in_flight = FuturesUnordered::new();

        loop {
            let part = chunker.next_part(part_size).await?;

            if part.is_final {
                let remainder = part.len() as u64;
                if session.allocated_parts() == 0 && remainder < self.rules.min_multipart_size {
                    debug!(
                        blob = %session.identity(),
                        size_bytes = remainder,
                        "object below multipart minimum, falling back to single put"
                    );
                    return Ok(Staged::Small(part.data));
                }
                if !part.is_empty() {
                    let number = session.allocate_part_number();
                    in_flight.push(self.upload_part(session, number, part.data));
                }
                break;
            }

            let number = session.allocate_part_number();
            in_flight.push(self.upload_part(session, number, part.data));

            while in_flight.len() >= limit {
                if let Some(done) = in_flight.next().await {
                    session.record(done?)?;
                }
            }
        }

        while let Some(done) = in_flight.next().await {
            session.record(done?)?;
        }

        Ok(Staged::Parts)
    }

    fn upload_part(
        &self,
        session: &UploadSession,
        part_number: u32,
        data: Bytes,
    ) -> impl Future<Output = BlobResult<PartDescriptor>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let identity = session.identity().clone();
        let upload_id = session.upload_id().clone();

        async move {
            let length = data.len() as u64;
            let tag = backend
                .upload_part(&identity.bucket, &identity.key, &upload_id, part_number, data)
                .await?;
            debug!(blob = %identity, part_number, length, "part uploaded");
            Ok(PartDescriptor {
                part_number,
                length,
                tag,
            })
        }
    }

    async fn commit(&self, session: &mut UploadSession) -> BlobResult<PutReceipt> {
        let parts = session.ordered_parts()?;
        let identity = session.identity().clone();

        let result = self
            .backend
            .complete_multipart(&identity.bucket, &identity.key, session.upload_id(), &parts)
            .await?;
        session.mark_completed()?;

        let upload = UploadInfo::Multipart {
            upload_id: session.upload_id().clone(),
            part_size: self.rules.part_size,
            parts: parts.len() as u32,
        };
        let receipt = PutReceipt::new(identity, session.bytes_recorded(), upload);
        Ok(match result.etag {
            Some(etag) => receipt.with_etag(etag),
            None => receipt,
        })
    }

    /// Abort the session, then store `data` in one request. The put runs even
    /// when the abort fails: no part was uploaded, so nothing is left behind.
    async fn put_single(
        &self,
        session: &mut UploadSession,
        data: Bytes,
        content_type: Option<&str>,
    ) -> BlobResult<PutReceipt> {
        if let Err(err) = self.abort(session).await {
            warn!(
                blob = %session.identity(),
                upload_id = %session.upload_id(),
                error = %err,
                "failed to abort empty multipart session"
            );
        }

        let identity = session.identity().clone();
        let length = data.len() as u64;
        let result = self
            .backend
            .put_object(&identity.bucket, &identity.key, data, content_type, length)
            .await?;

        let receipt = PutReceipt::new(identity, length, UploadInfo::Single);
        Ok(match result.etag {
            Some(etag) => receipt.with_etag(etag),
            None => receipt,
        })
    }

    async fn abort(&self, session: &mut UploadSession) -> BlobResult<()> {
        session.mark_aborted()?;
        let identity = session.identity();
        self.backend
            .abort_multipart(&identity.bucket, &identity.key, session.upload_id())
            .await
    }

    /// Best-effort abort after `err`; returns `err` untouched
    async fn abort_after_failure(&self, session: &mut UploadSession, err: BlobError) -> BlobError {
        warn!(
            blob = %session.identity(),
            upload_id = %session.upload_id(),
            error = %err,
            "upload failed, aborting multipart session"
        );
        if let Err(abort_err) = self.abort(session).await {
            warn!(
                blob = %session.identity(),
                upload_id = %session.upload_id(),
                error = %abort_err,
                "abort after failed upload also failed"
            );
        }
        err
    }
}
