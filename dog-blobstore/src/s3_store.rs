//! S3-compatible backend built on `aws-sdk-s3`.
//!
//! Works against AWS S3 and self-hosted services (MinIO, RustFS, R2) through a
//! custom endpoint with path-style addressing.

use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
    BlobError, BlobResult, ByteRange, GetResult, ObjectEntry, PartDescriptor, PutResult,
    StorageBackend, UploadId,
};

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible service
#[derive(Clone)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint; `None` targets AWS
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

impl S3Config {
    /// Config for AWS S3 in `region`
    pub fn aws<S: Into<String>>(region: S) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// Config for a self-hosted service at `endpoint`
    pub fn compatible<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint_url: Some(endpoint.into()),
            force_path_style: true,
            ..Self::default()
        }
    }

    pub fn with_credentials<A: Into<String>, S: Into<String>>(mut self, access_key_id: A, secret_access_key: S) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Read `BLOBSTORE_REGION`, `BLOBSTORE_URL`, `BLOBSTORE_ACCESS_KEY`,
    /// `BLOBSTORE_SECRET_KEY` and `BLOBSTORE_PATH_STYLE`.
    ///
    /// Keys must be given together or not at all. Without them the default
    /// AWS provider chain supplies credentials.
    pub fn from_env() -> BlobResult<Self> {
        fn optional(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        let endpoint_url = optional("BLOBSTORE_URL");
        let access_key_id = optional("BLOBSTORE_ACCESS_KEY");
        let secret_access_key = optional("BLOBSTORE_SECRET_KEY");

        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(BlobError::invalid_input(
                "BLOBSTORE_ACCESS_KEY and BLOBSTORE_SECRET_KEY must be set together",
            ));
        }

        let force_path_style = match optional("BLOBSTORE_PATH_STYLE") {
            Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            None => endpoint_url.is_some(),
        };

        Ok(Self {
            region: optional("BLOBSTORE_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url,
            access_key_id,
            secret_access_key,
            force_path_style,
        })
    }

    /// Base URL used in location hints
    pub fn public_base(&self) -> String {
        match &self.endpoint_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Object store backed by an S3-compatible service
#[derive(Clone)]
pub struct S3CompatibleStore {
    client: Client,
    base_url: String,
}

impl S3CompatibleStore {
    /// Build a client from `config`
    pub async fn new(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                access.clone(),
                secret.clone(),
                None,
                None,
                "blobstore",
            ));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(config.force_path_style)
                .build(),
        );

        Self {
            client,
            base_url: config.public_base(),
        }
    }

    /// Build from `BLOBSTORE_*` environment variables
    pub async fn from_env() -> BlobResult<Self> {
        Ok(Self::new(S3Config::from_env()?).await)
    }

    fn location_hint(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, key)
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

fn part_number_i32(part_number: u32) -> BlobResult<i32> {
    i32::try_from(part_number)
        .map_err(|_| BlobError::invalid_input(format!("part number {part_number} out of range")))
}

#[async_trait]
impl StorageBackend for S3CompatibleStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
    ) -> BlobResult<UploadId> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| BlobError::backend("initiate_multipart", e))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| BlobError::backend("initiate_multipart", "service returned no upload id"))?;
        Ok(UploadId::from_string(upload_id.to_string()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String> {
        let length = data.len() as i64;
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .part_number(part_number_i32(part_number)?)
            .content_length(length)
            .body(AwsByteStream::from(data))
            .send()
            .await
            .map_err(|e| BlobError::backend("upload_part", e))?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| BlobError::backend("upload_part", format!("no etag for part {part_number}")))
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartDescriptor],
    ) -> BlobResult<PutResult> {
        let completed = parts
            .iter()
            .map(|part| {
                Ok(CompletedPart::builder()
                    .part_number(part_number_i32(part.part_number)?)
                    .e_tag(part.tag.clone())
                    .build())
            })
            .collect::<BlobResult<Vec<_>>>()?;

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| BlobError::backend("complete_multipart", e))?;

        Ok(PutResult {
            etag: output.e_tag().map(str::to_string),
            size_bytes: parts.iter().map(|p| p.length).sum(),
        })
    }

    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
    ) -> BlobResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(|e| BlobError::backend("abort_multipart", e))?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        content_length: u64,
    ) -> BlobResult<PutResult> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(content_length as i64)
            .set_content_type(content_type.map(str::to_string))
            .body(AwsByteStream::from(data))
            .send()
            .await
            .map_err(|e| BlobError::backend("put_object", e))?;

        Ok(PutResult {
            etag: output.e_tag().map(str::to_string),
            size_bytes: content_length,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BlobResult<GetResult> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.as_ref().map(ByteRange::to_http_header))
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    return BlobError::not_found(bucket, key);
                }
                match (service.code(), range) {
                    (Some("InvalidRange"), Some(r)) => BlobError::RangeNotSatisfiable {
                        key: key.to_string(),
                        start: r.start,
                        end: r.end,
                    },
                    _ => BlobError::backend("get_object", service),
                }
            })?;

        let content_length = output.content_length().and_then(|n| u64::try_from(n).ok());
        let content_type = output.content_type().map(str::to_string);
        let etag = output.e_tag().map(str::to_string);

        let mut body = output.body;
        let stream = async_stream::stream! {
            loop {
                match body.try_next().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(std::io::Error::other(e));
                        break;
                    }
                }
            }
        };

        Ok(GetResult {
            stream: Box::pin(stream),
            content_length,
            content_type,
            etag,
            range,
        })
    }

    async fn list_objects(&self, bucket: &str) -> BlobResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| BlobError::backend("list_objects", e))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                entries.push(ObjectEntry {
                    key: key.to_string(),
                    size_bytes: object.size().and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
                    content_type: None,
                    location_hint: self.location_hint(bucket, key),
                    etag: object.e_tag().map(str::to_string),
                    last_modified: object.last_modified().and_then(to_chrono),
                });
            }

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BlobError::backend("delete_object", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_hint_uses_custom_endpoint() {
        let config = S3Config::compatible("http://localhost:9000/");
        assert_eq!(config.public_base(), "http://localhost:9000");
        assert!(config.force_path_style);
    }

    #[test]
    fn location_hint_defaults_to_aws() {
        let config = S3Config::aws("eu-west-1");
        assert_eq!(config.public_base(), "https://s3.eu-west-1.amazonaws.com");
        assert!(!config.force_path_style);
    }

    #[test]
    fn debug_hides_secret() {
        let config = S3Config::compatible("http://minio:9000").with_credentials("id", "hunter2");
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
    }
}
