use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use futures::{channel::mpsc, SinkExt, TryStreamExt};
use serde::Deserialize;

use dog_blobstore::{
    BlobAdapter, BlobError, BlobMetadata, ByteStream, PutReceipt, DEFAULT_CONTENT_TYPE,
};

use crate::BlobApiError;

/// Form field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// Multipart chunks buffered between the form reader and the uploader
const FORM_CHANNEL_DEPTH: usize = 8;

#[derive(Clone)]
pub struct AppState {
    pub blobs: Arc<BlobAdapter>,
    pub bucket: String,
}

impl AppState {
    pub fn new<S: Into<String>>(blobs: BlobAdapter, bucket: S) -> Self {
        Self {
            blobs: Arc::new(blobs),
            bucket: bucket.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub range: Option<String>,
}

/// `POST /v1/blob`: store the `file` field of a multipart form under its
/// filename
pub async fn upload_form(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PutReceipt>, BlobApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| BlobError::invalid_input(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let key = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| BlobError::invalid_input("file field has no filename"))?;
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        // The field borrows the form, so its chunks are forwarded through a
        // channel to give the uploader an owned stream.
        let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(FORM_CHANNEL_DEPTH);
        let forward = async move {
            loop {
                let item = match field.chunk().await {
                    Ok(Some(chunk)) => Ok(chunk),
                    Ok(None) => break,
                    Err(e) => Err(io::Error::other(e.body_text())),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        };

        let body: ByteStream = Box::pin(rx);
        let upload = state
            .blobs
            .put(&state.bucket, &key, Some(body), Some(&content_type));
        let ((), receipt) = futures::join!(forward, upload);

        return Ok(Json(receipt?));
    }

    Err(BlobError::invalid_input(format!("form has no '{FILE_FIELD}' field")).into())
}

/// `PUT /v1/blob/{*key}`: store the raw request body
pub async fn upload_raw(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<PutReceipt>, BlobApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let stream: ByteStream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    let receipt = state
        .blobs
        .put(&state.bucket, &key, Some(stream), content_type.as_deref())
        .await?;
    Ok(Json(receipt))
}

/// `GET /v1/blob/{*key}?range=start:end`
pub async fn download(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Response, BlobApiError> {
    let opened = state
        .blobs
        .get(&state.bucket, &key, query.range.as_deref())
        .await?;

    let status = if opened.range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(
            header::CONTENT_TYPE,
            opened.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
        )
        .header(header::CONTENT_DISPOSITION, attachment(&key))
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(length) = opened.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
        if let (Some(range), true) = (opened.range, length > 0) {
            builder = builder.header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/*", range.start, range.start + length - 1),
            );
        }
    }
    if let Some(etag) = &opened.etag {
        builder = builder.header(header::ETAG, etag);
    }

    builder
        .body(Body::from_stream(opened.stream))
        .map_err(|e| BlobError::from(io::Error::other(e)).into())
}

/// `GET /v1/blob`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<BlobMetadata>>, BlobApiError> {
    Ok(Json(state.blobs.list(&state.bucket).await?))
}

/// `DELETE /v1/blob/{*key}`
pub async fn remove(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, BlobApiError> {
    state.blobs.delete(&state.bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> &'static str {
    "ok"
}

/// `Content-Disposition` value naming the last path segment of `key`
fn attachment(key: &str) -> String {
    let name: String = key
        .rsplit('/')
        .next()
        .unwrap_or(key)
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{name}\"")
}
